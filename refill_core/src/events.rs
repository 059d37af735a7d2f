//! The station's single ordered event queue.

use std::time::Instant;

use crossbeam_channel as xch;

use crate::tag::Tag;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationEvent {
    TagPresented { tag: Tag, at: Instant },
    ButtonPressed { channel: String, at: Instant },
    ButtonReleased { channel: String, at: Instant },
    /// The tag source is gone and will not produce further tags.
    ReaderClosed,
    Panic,
    Shutdown,
}

/// Producer handle for edge callbacks, the tag poller and signal handlers.
#[derive(Debug, Clone)]
pub struct EventSender(xch::Sender<StationEvent>);

impl EventSender {
    /// Enqueue `event`. Returns `false` once the station has stopped listening.
    pub fn send(&self, event: StationEvent) -> bool {
        self.0.send(event).is_ok()
    }

    pub fn pressed(&self, channel: &str) -> bool {
        self.send(StationEvent::ButtonPressed {
            channel: channel.to_string(),
            at: Instant::now(),
        })
    }

    pub fn released(&self, channel: &str) -> bool {
        self.send(StationEvent::ButtonReleased {
            channel: channel.to_string(),
            at: Instant::now(),
        })
    }

    pub fn shutdown(&self) -> bool {
        self.send(StationEvent::Shutdown)
    }
}

pub fn queue() -> (EventSender, xch::Receiver<StationEvent>) {
    let (tx, rx) = xch::unbounded();
    (EventSender(tx), rx)
}
