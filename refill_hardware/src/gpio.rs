//! Raspberry Pi GPIO collaborators backed by rppal.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use refill_traits::{BoxError, DigitalOutput};
use rppal::gpio::{InputPin, Level, OutputPin, Trigger};

pub use rppal::gpio::Gpio;

use crate::debounce::{Edge, EdgeDebouncer};
use crate::error::{HwError, Result};

/// Output pin with configurable polarity. Relay boards are commonly active-low.
pub struct GpioOutput {
    pin: OutputPin,
    active_low: bool,
    on: bool,
}

impl GpioOutput {
    pub fn open(gpio: &Gpio, bcm: u8, active_low: bool) -> Result<Self> {
        let pin = gpio
            .get(bcm)
            .map_err(|e| HwError::Gpio(format!("open output pin {bcm}: {e}")))?
            .into_output();
        let mut out = Self {
            pin,
            active_low,
            on: false,
        };
        out.write(false);
        Ok(out)
    }

    fn write(&mut self, on: bool) {
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        self.on = on;
    }
}

impl DigitalOutput for GpioOutput {
    fn on(&mut self) -> std::result::Result<(), BoxError> {
        self.write(true);
        Ok(())
    }
    fn off(&mut self) -> std::result::Result<(), BoxError> {
        self.write(false);
        Ok(())
    }
    fn is_on(&self) -> bool {
        self.on
    }
}

/// Keeps an edge-triggered input armed; dropping it clears the interrupt and
/// joins the watch thread.
pub struct InputWatch {
    pin: InputPin,
    handle: Option<JoinHandle<()>>,
}

impl Drop for InputWatch {
    fn drop(&mut self) {
        if let Err(e) = self.pin.clear_async_interrupt() {
            tracing::warn!(error = %e, "clear input interrupt");
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("input watch thread panicked");
            }
        }
    }
}

/// Arm an interrupt on `bcm` that reports debounced edges to `on_edge`.
///
/// Active-low inputs get the internal pull-up (button to ground), active-high
/// ones the pull-down; `Edge::Pressed` is the active level. Raw levels go to a
/// watch thread, which re-checks a held change once the debounce interval has
/// passed so a short tap still ends in `Edge::Released`.
pub fn watch_input<F>(
    gpio: &Gpio,
    bcm: u8,
    active_low: bool,
    debounce: Duration,
    mut on_edge: F,
) -> Result<InputWatch>
where
    F: FnMut(Edge, Instant) + Send + 'static,
{
    let pin = gpio
        .get(bcm)
        .map_err(|e| HwError::Gpio(format!("open input pin {bcm}: {e}")))?;
    let mut pin = if active_low {
        pin.into_input_pullup()
    } else {
        pin.into_input_pulldown()
    };
    let (tx, rx) = crossbeam_channel::unbounded::<(bool, Instant)>();
    pin.set_async_interrupt(Trigger::Both, move |level: Level| {
        let pressed = (level == Level::Low) == active_low;
        let _ = tx.send((pressed, Instant::now()));
    })
    .map_err(|e| HwError::Gpio(format!("arm interrupt on pin {bcm}: {e}")))?;

    let mut debouncer = EdgeDebouncer::new(debounce);
    let handle = std::thread::Builder::new()
        .name(format!("input-{bcm}"))
        .spawn(move || {
            loop {
                let next = match debouncer.pending_until() {
                    Some(deadline) => rx.recv_deadline(deadline),
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                let accepted = match next {
                    Ok((pressed, at)) => debouncer.accept(pressed, at).map(|e| (e, at)),
                    Err(RecvTimeoutError::Timeout) => {
                        let now = Instant::now();
                        debouncer.settle(now).map(|e| (e, now))
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                if let Some((edge, at)) = accepted {
                    tracing::trace!(pin = bcm, ?edge, "input edge");
                    on_edge(edge, at);
                }
            }
        })
        .map_err(HwError::Io)?;
    Ok(InputWatch {
        pin,
        handle: Some(handle),
    })
}

/// Open the GPIO peripheral.
pub fn open() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))
}
