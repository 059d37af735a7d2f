//! Output lines and input watches: GPIO with the `hardware` feature on
//! Linux, simulated lines otherwise.

use std::time::{Duration, Instant};

use refill_hardware::Edge;
use refill_traits::DigitalOutput;

pub type Line = Box<dyn DigitalOutput + Send>;

pub struct Rig {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    gpio: refill_hardware::gpio::Gpio,
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    watches: Vec<refill_hardware::gpio::InputWatch>,
}

impl Rig {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    pub fn open() -> eyre::Result<Self> {
        Ok(Self {
            gpio: refill_hardware::gpio::open()?,
            watches: Vec::new(),
        })
    }

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    pub fn open() -> eyre::Result<Self> {
        tracing::info!("hardware feature disabled; using simulated outputs");
        Ok(Self {})
    }

    pub fn simulated(&self) -> bool {
        !cfg!(all(feature = "hardware", target_os = "linux"))
    }

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    pub fn output(&self, name: &str, pin: u8, active_low: bool) -> eyre::Result<Line> {
        let line = refill_hardware::gpio::GpioOutput::open(&self.gpio, pin, active_low)
            .map_err(|e| eyre::eyre!("open output {name}: {e}"))?;
        Ok(Box::new(line))
    }

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    pub fn output(&self, name: &str, pin: u8, _active_low: bool) -> eyre::Result<Line> {
        tracing::debug!(output = name, pin, "simulated output");
        Ok(Box::new(refill_hardware::SimulatedOutput::new(name)))
    }

    /// Arm a debounced input; the watch lives as long as the rig.
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    pub fn watch<F>(&mut self, what: &str, pin: u8, active_low: bool, debounce: Duration, on_edge: F) -> eyre::Result<()>
    where
        F: FnMut(Edge, Instant) + Send + 'static,
    {
        let w = refill_hardware::gpio::watch_input(&self.gpio, pin, active_low, debounce, on_edge)
            .map_err(|e| eyre::eyre!("watch {what}: {e}"))?;
        tracing::info!(input = what, pin, active_low, "input armed");
        self.watches.push(w);
        Ok(())
    }

    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    pub fn watch<F>(&mut self, what: &str, pin: u8, _active_low: bool, _debounce: Duration, _on_edge: F) -> eyre::Result<()>
    where
        F: FnMut(Edge, Instant) + Send + 'static,
    {
        tracing::debug!(input = what, pin, "input not armed (simulated)");
        Ok(())
    }
}
