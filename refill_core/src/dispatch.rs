//! Network worker.
//!
//! All backend traffic runs on one worker thread so the station thread can
//! keep servicing buttons and panic while a request is in flight. Jobs are
//! handled strictly in submission order. Reports and telemetry are
//! fire-and-forget: their failures are logged here and go nowhere else.

use std::thread::JoinHandle;

use crossbeam_channel as xch;

use crate::error::{Result, StationError};
use crate::gateway::{BackendGateway, Preference, RecordId, TransactionReport};

enum Job {
    Lookup {
        key: String,
        reply: xch::Sender<Result<Preference>>,
    },
    Report(TransactionReport),
    Telemetry {
        user_id: RecordId,
        duration_s: f64,
    },
}

pub struct Dispatcher {
    jobs: Option<xch::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queued", &self.jobs.as_ref().map_or(0, xch::Sender::len))
            .finish()
    }
}

impl Dispatcher {
    pub fn spawn(gateway: BackendGateway) -> std::io::Result<Self> {
        let (jobs, queue) = xch::unbounded::<Job>();
        let worker = std::thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || {
                for job in queue {
                    run_job(&gateway, job);
                }
                tracing::trace!("dispatcher drained");
            })?;
        Ok(Self {
            jobs: Some(jobs),
            worker: Some(worker),
        })
    }

    fn submit(&self, job: Job) -> std::result::Result<(), Job> {
        match &self.jobs {
            Some(tx) => tx.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    /// Queue a preference lookup. The answer arrives on the returned receiver.
    pub fn lookup(&self, key: &str) -> xch::Receiver<Result<Preference>> {
        let (reply, answer) = xch::bounded(1);
        let job = Job::Lookup {
            key: key.to_string(),
            reply,
        };
        if let Err(Job::Lookup { reply, .. }) = self.submit(job) {
            let _ = reply.send(Err(StationError::LookupFailed("dispatcher stopped".into())));
        }
        answer
    }

    pub fn report(&self, report: TransactionReport) {
        if self.submit(Job::Report(report)).is_err() {
            tracing::error!("dispatcher stopped; transaction report dropped");
        }
    }

    pub fn telemetry(&self, user_id: RecordId, duration_s: f64) {
        if self
            .submit(Job::Telemetry {
                user_id,
                duration_s,
            })
            .is_err()
        {
            tracing::warn!("dispatcher stopped; telemetry dropped");
        }
    }

    /// Stop accepting jobs and let the worker finish in the background.
    pub fn detach(mut self) {
        self.jobs = None;
        self.worker = None;
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain what is queued, then exit.
        self.jobs = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::warn!("dispatcher thread panicked");
            }
        }
    }
}

fn run_job(gateway: &BackendGateway, job: Job) {
    match job {
        Job::Lookup { key, reply } => {
            let result = gateway.fetch_preferences(&key);
            // The station may have stopped waiting (panic or shutdown).
            let _ = reply.send(result);
        }
        Job::Report(report) => match gateway.report_transaction(&report) {
            Ok(volume_ml) => tracing::info!(
                channel = %report.channel,
                volume_ml,
                guest = report.owner.is_none(),
                "transaction reported"
            ),
            Err(e) => tracing::error!(
                channel = %report.channel,
                volume_ml = report.volume_ml(),
                error = %e,
                "transaction report failed"
            ),
        },
        Job::Telemetry {
            user_id,
            duration_s,
        } => {
            if let Err(e) = gateway.publish_telemetry(&user_id, duration_s) {
                tracing::warn!(user = %user_id, error = %e, "telemetry publish failed");
            }
        }
    }
}
