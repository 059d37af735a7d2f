//! Background tag polling.
//!
//! Spawns a thread that owns the `TagReader`, polls it for presence and turns
//! every detected token into a `StationEvent::TagPresented` on the station
//! queue. After a detection the thread waits one poll interval before polling
//! again, so a tag resting on the reader is not reported in a tight loop.
//!
//! Safety: Each `TagPoller` spawns exactly one thread that is shut down and
//! joined when the `TagPoller` is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use refill_traits::TagReader;

use crate::config::TagAccess;
use crate::events::{EventSender, StationEvent};
use crate::hw_error::{ReaderFault, classify_reader_error};
use crate::tag::{Tag, read_content};

const SHUTDOWN_CHECK: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub access: TagAccess,
    /// Read the tag's data blocks for every detection
    pub read_content: bool,
}

pub struct TagPoller {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TagPoller {
    pub fn spawn<R: TagReader + Send + 'static>(
        mut reader: R,
        events: EventSender,
        settings: PollSettings,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();

        let join_handle = std::thread::Builder::new()
            .name("tag-poller".into())
            .spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    match reader.poll_for_tag(settings.interval) {
                        Ok(Some(raw)) => {
                            let content = if settings.read_content {
                                read_content(&mut reader, &raw.uid, &settings.access)
                            } else {
                                String::new()
                            };
                            let tag = Tag {
                                identifier: raw.uid,
                                content,
                            };
                            tracing::debug!(tag = %tag.uid_hex(), content = %tag.content, "tag detected");
                            if !events.send(StationEvent::TagPresented {
                                tag,
                                at: Instant::now(),
                            }) {
                                tracing::debug!("station queue closed, poller exiting");
                                break;
                            }
                            pause(&stop, settings.interval);
                        }
                        Ok(None) => {}
                        Err(e) => match classify_reader_error(&*e) {
                            ReaderFault::Closed => {
                                tracing::info!("tag reader closed");
                                events.send(StationEvent::ReaderClosed);
                                break;
                            }
                            ReaderFault::Transient(msg) => {
                                tracing::warn!(error = %msg, "tag poll failed");
                                pause(&stop, settings.interval);
                            }
                        },
                    }
                }
                tracing::trace!("tag poller exiting cleanly");
            })?;

        Ok(Self {
            shutdown,
            join_handle: Some(join_handle),
        })
    }
}

/// Sleep for `d`, returning early once `stop` is set.
fn pause(stop: &AtomicBool, d: Duration) {
    let deadline = Instant::now() + d;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_CHECK));
    }
}

impl Drop for TagPoller {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // An in-flight poll finishes within one poll timeout.
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("tag poller thread panicked during shutdown");
            }
        }
    }
}
