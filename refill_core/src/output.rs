//! Shared handles to physical output lines and the panic latch.
//!
//! Every pump and indicator is wrapped in an [`Output`]: a cheap, clonable
//! handle that serializes access to the underlying driver. Once the
//! [`PanicLatch`] is tripped an output refuses to turn on; the check happens
//! under the line lock, so a concurrent `on()` either completes before the
//! panic path forces the line off or observes the latch and fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use refill_traits::DigitalOutput;

use crate::error::{Result, StationError};
use crate::hw_error::map_output_error;

/// Process-wide, one-way panic flag.
#[derive(Debug, Clone, Default)]
pub struct PanicLatch(Arc<AtomicBool>);

impl PanicLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch. Returns `true` for the first caller only.
    pub fn trip(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    #[inline]
    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type Line = Box<dyn DigitalOutput + Send>;

/// Level an output is left at after a blink is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Steady {
    On,
    Off,
}

#[derive(Clone)]
pub struct Output {
    name: Arc<str>,
    line: Arc<Mutex<Line>>,
    latch: PanicLatch,
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("name", &self.name)
            .field("on", &self.is_on())
            .finish()
    }
}

impl Output {
    pub fn new<D>(name: &str, line: D, latch: PanicLatch) -> Self
    where
        D: DigitalOutput + Send + 'static,
    {
        Self {
            name: Arc::from(name),
            line: Arc::new(Mutex::new(Box::new(line))),
            latch,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Line> {
        self.line.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on(&self) -> Result<()> {
        let mut line = self.lock();
        if self.latch.is_tripped() {
            return Err(StationError::PanicTriggered);
        }
        line.on().map_err(|e| map_output_error(&*e, &self.name))
    }

    pub fn off(&self) -> Result<()> {
        self.lock()
            .off()
            .map_err(|e| map_output_error(&*e, &self.name))
    }

    pub fn set(&self, level: Steady) -> Result<()> {
        match level {
            Steady::On => self.on(),
            Steady::Off => self.off(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.lock().is_on()
    }

    /// Turn the line off, logging instead of failing. Used on every exit path.
    pub fn force_off(&self) {
        if let Err(e) = self.off() {
            tracing::error!(output = %self.name, error = %e, "failed to force output off");
        }
    }
}

/// Force every line in `outputs` off.
pub fn force_all_off(outputs: &[Output]) {
    for out in outputs {
        out.force_off();
    }
}
