//! Blink tasks for indicator outputs.
//!
//! Each blinking output gets one dedicated thread holding the receiving end
//! of a cancel channel. Cancelling drops the sender, which wakes the thread
//! out of its half-period wait immediately; the caller then joins it, so once
//! `stop_blink` returns nothing else is toggling the line.
//!
//! Safety: dropping the last `IndicatorManager` handle cancels and joins every
//! running task, so blink threads never outlive the manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;

use crate::error::{Result, StationError};
use crate::output::{Output, PanicLatch, Steady};

/// Default toggle half-period.
pub const DEFAULT_HALF_PERIOD: Duration = Duration::from_millis(200);

struct BlinkTask {
    cancel: xch::Sender<()>,
    handle: JoinHandle<()>,
}

impl BlinkTask {
    fn cancel_and_join(self, name: &str) {
        drop(self.cancel);
        if self.handle.join().is_err() {
            tracing::warn!(output = name, "blink thread panicked");
        }
    }
}

struct Inner {
    outputs: HashMap<String, Output>,
    tasks: Mutex<HashMap<String, BlinkTask>>,
    half_period: Duration,
    latch: PanicLatch,
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, HashMap<String, BlinkTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let tasks: Vec<_> = self.tasks().drain().collect();
        for (name, task) in tasks {
            task.cancel_and_join(&name);
        }
    }
}

/// Registry of blink tasks keyed by output name. Clones share the registry.
#[derive(Clone)]
pub struct IndicatorManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for IndicatorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut blinking: Vec<String> = self.inner.tasks().keys().cloned().collect();
        blinking.sort();
        f.debug_struct("IndicatorManager")
            .field("half_period", &self.inner.half_period)
            .field("blinking", &blinking)
            .finish()
    }
}

impl IndicatorManager {
    pub fn new(outputs: impl IntoIterator<Item = Output>, half_period: Duration, latch: PanicLatch) -> Self {
        let outputs = outputs
            .into_iter()
            .map(|o| (o.name().to_string(), o))
            .collect();
        Self {
            inner: Arc::new(Inner {
                outputs,
                tasks: Mutex::new(HashMap::new()),
                half_period,
                latch,
            }),
        }
    }

    pub fn half_period(&self) -> Duration {
        self.inner.half_period
    }

    fn output(&self, name: &str) -> Result<&Output> {
        self.inner
            .outputs
            .get(name)
            .ok_or_else(|| StationError::UnknownChannel(name.to_string()))
    }

    /// Start blinking `name`. A no-op when a task is already running on it.
    pub fn start_blink(&self, name: &str) -> Result<()> {
        if self.inner.latch.is_tripped() {
            return Err(StationError::PanicTriggered);
        }
        let out = self.output(name)?.clone();
        let mut tasks = self.inner.tasks();
        if let Some(task) = tasks.get(name) {
            if !task.handle.is_finished() {
                return Ok(());
            }
            // Previous task ended on its own (output failure or panic latch).
            if let Some(done) = tasks.remove(name) {
                done.cancel_and_join(name);
            }
        }

        let (cancel, cancelled) = xch::bounded::<()>(0);
        let half = self.inner.half_period;
        let handle = std::thread::Builder::new()
            .name(format!("blink-{name}"))
            .spawn(move || blink_loop(&out, &cancelled, half))
            .map_err(|e| StationError::Hardware(format!("spawn blink thread for {name}: {e}")))?;
        tasks.insert(name.to_string(), BlinkTask { cancel, handle });
        tracing::debug!(output = name, "blink started");
        Ok(())
    }

    /// Stop any blink on `name`, wait for its thread to exit, then drive the
    /// output to `level`.
    pub fn stop_blink(&self, name: &str, level: Steady) -> Result<()> {
        let out = self.output(name)?;
        let task = self.inner.tasks().remove(name);
        if let Some(task) = task {
            task.cancel_and_join(name);
            tracing::debug!(output = name, ?level, "blink stopped");
        }
        out.set(level)
    }

    /// Pulse `name` `n` times (on, half-period, off, half-period), blocking the caller.
    pub fn blink_n_times(&self, n: u32, name: &str) -> Result<()> {
        self.stop_blink(name, Steady::Off)?;
        let out = self.output(name)?;
        let half = self.inner.half_period;
        for _ in 0..n {
            out.on()?;
            std::thread::sleep(half);
            out.off()?;
            std::thread::sleep(half);
        }
        Ok(())
    }

    /// Stop every running blink, leaving each output at `level`.
    pub fn stop_all(&self, level: Steady) {
        let tasks: Vec<_> = self.inner.tasks().drain().collect();
        for (name, task) in tasks {
            task.cancel_and_join(&name);
            let Some(out) = self.inner.outputs.get(&name) else {
                continue;
            };
            if let Err(e) = out.set(level) {
                tracing::warn!(output = %name, error = %e, "failed to settle output after blink");
            }
        }
    }

    pub fn is_blinking(&self, name: &str) -> bool {
        self.inner
            .tasks()
            .get(name)
            .is_some_and(|t| !t.handle.is_finished())
    }
}

fn blink_loop(out: &Output, cancelled: &xch::Receiver<()>, half: Duration) {
    let wait = || matches!(cancelled.recv_timeout(half), Err(xch::RecvTimeoutError::Timeout));
    loop {
        if let Err(e) = out.on() {
            tracing::debug!(output = out.name(), error = %e, "blink ended");
            break;
        }
        if !wait() {
            break;
        }
        out.force_off();
        if !wait() {
            break;
        }
    }
}
