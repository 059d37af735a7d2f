//! Pump channels and the per-channel busy guard.
//!
//! A dispense is represented by an [`ActiveDispense`] guard: creating one
//! claims the channel's busy flag and turns indicator and pump on; dropping it
//! turns both off and releases the flag. Every exit path (normal completion,
//! error, panic unwinding through the station loop) therefore ends with the
//! channel's outputs off.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Result, StationError};
use crate::gateway::{Owner, WaterType};
use crate::indicator::IndicatorManager;
use crate::output::{Output, PanicLatch, Steady};
use crate::util::clamp_secs;

/// Seconds needed to dispense `volume_ml` at `flow_ml_per_s`. Not rounded.
#[inline]
pub fn compute_duration(volume_ml: f64, flow_ml_per_s: f64) -> f64 {
    volume_ml / flow_ml_per_s
}

/// One physical water line.
#[derive(Debug, Clone)]
pub struct DispenseChannel {
    pub name: String,
    pub water_type: WaterType,
    pub pump: Output,
    pub indicator: Output,
    pub flow_ml_per_s: f64,
}

/// How much to dispense.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    /// A fixed volume; duration comes from the channel flow rate.
    VolumeMl(u32),
    /// As long as a button is held.
    Hold,
}

/// One actuation request.
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseRequest {
    pub channel: String,
    pub amount: Amount,
    /// `None` for guest dispenses.
    pub owner: Option<Owner>,
}

impl DispenseRequest {
    pub fn attributed(channel: &str, volume_ml: u32, owner: Owner) -> Self {
        Self {
            channel: channel.to_string(),
            amount: Amount::VolumeMl(volume_ml),
            owner: Some(owner),
        }
    }

    pub fn guest_hold(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            amount: Amount::Hold,
            owner: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.owner.is_none()
    }
}

#[derive(Debug)]
struct Slot {
    channel: DispenseChannel,
    busy: Arc<AtomicBool>,
}

/// Guard for a running dispense. Dropping it stops the pump.
#[must_use = "dropping the guard stops the pump immediately"]
#[derive(Debug)]
pub struct ActiveDispense {
    channel: String,
    water_type: WaterType,
    flow_ml_per_s: f64,
    pump: Output,
    indicator: Output,
    busy: Arc<AtomicBool>,
    started: Instant,
}

impl ActiveDispense {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn water_type(&self) -> &WaterType {
        &self.water_type
    }

    pub fn flow_ml_per_s(&self) -> f64 {
        self.flow_ml_per_s
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the pump and return how long it ran.
    pub fn finish(self) -> Duration {
        let ran = self.elapsed();
        drop(self);
        ran
    }
}

impl Drop for ActiveDispense {
    fn drop(&mut self) {
        self.pump.force_off();
        self.indicator.force_off();
        self.busy.store(false, Ordering::Release);
        tracing::info!(
            channel = %self.channel,
            duration_s = self.started.elapsed().as_secs_f64(),
            "dispense finished"
        );
    }
}

#[derive(Debug)]
pub struct DispenseController {
    slots: HashMap<String, Slot>,
    indicators: IndicatorManager,
    latch: PanicLatch,
}

impl DispenseController {
    pub fn new(
        channels: impl IntoIterator<Item = DispenseChannel>,
        indicators: IndicatorManager,
        latch: PanicLatch,
    ) -> Self {
        let slots = channels
            .into_iter()
            .map(|channel| {
                (
                    channel.name.clone(),
                    Slot {
                        channel,
                        busy: Arc::new(AtomicBool::new(false)),
                    },
                )
            })
            .collect();
        Self {
            slots,
            indicators,
            latch,
        }
    }

    pub fn channel(&self, name: &str) -> Option<&DispenseChannel> {
        self.slots.get(name).map(|s| &s.channel)
    }

    /// The channel dispensing `water_type`, if any.
    pub fn channel_for(&self, water_type: &WaterType) -> Option<&DispenseChannel> {
        self.slots
            .values()
            .map(|s| &s.channel)
            .find(|c| &c.water_type == water_type)
    }

    pub fn channels(&self) -> impl Iterator<Item = &DispenseChannel> {
        self.slots.values().map(|s| &s.channel)
    }

    pub fn is_busy(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .is_some_and(|s| s.busy.load(Ordering::Acquire))
    }

    /// Planned duration for a volume request, `None` for hold requests.
    pub fn duration_for(&self, request: &DispenseRequest) -> Result<Option<f64>> {
        let ch = self
            .channel(&request.channel)
            .ok_or_else(|| StationError::UnknownChannel(request.channel.clone()))?;
        Ok(match request.amount {
            Amount::VolumeMl(v) => Some(compute_duration(f64::from(v), ch.flow_ml_per_s)),
            Amount::Hold => None,
        })
    }

    /// Claim `name` and turn its indicator and pump on.
    ///
    /// Fails with `ChannelBusy` while another dispense holds the channel; the
    /// running dispense is left untouched.
    pub fn begin(&self, name: &str) -> Result<ActiveDispense> {
        if self.latch.is_tripped() {
            return Err(StationError::PanicTriggered);
        }
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| StationError::UnknownChannel(name.to_string()))?;
        if slot
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StationError::ChannelBusy(name.to_string()));
        }
        let ch = &slot.channel;
        let mut active = ActiveDispense {
            channel: ch.name.clone(),
            water_type: ch.water_type.clone(),
            flow_ml_per_s: ch.flow_ml_per_s,
            pump: ch.pump.clone(),
            indicator: ch.indicator.clone(),
            busy: Arc::clone(&slot.busy),
            started: Instant::now(),
        };
        self.indicators.stop_blink(ch.indicator.name(), Steady::On)?;
        ch.pump.on()?;
        tracing::info!(channel = name, "dispense started");
        active.started = Instant::now();
        Ok(active)
    }

    /// Run `name` for `duration_s` seconds (negative clamps to zero).
    ///
    /// `suspend` performs the wait and may cut it short with an error; the
    /// outputs are off again before this returns either way. Returns how long
    /// the pump actually ran.
    pub fn activate<F>(&self, name: &str, duration_s: f64, suspend: F) -> Result<Duration>
    where
        F: FnOnce(Duration) -> Result<()>,
    {
        let active = self.begin(name)?;
        let waited = suspend(clamp_secs(duration_s));
        let ran = active.finish();
        waited.map(|()| ran)
    }

    /// [`activate`](Self::activate) with a sleep that aborts once the panic
    /// latch trips.
    pub fn activate_for(&self, name: &str, duration_s: f64) -> Result<Duration> {
        let latch = self.latch.clone();
        self.activate(name, duration_s, |d| sleep_unless_tripped(&latch, d))
    }
}

const LATCH_POLL: Duration = Duration::from_millis(10);

fn sleep_unless_tripped(latch: &PanicLatch, d: Duration) -> Result<()> {
    let deadline = Instant::now() + d;
    loop {
        if latch.is_tripped() {
            return Err(StationError::PanicTriggered);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep((deadline - now).min(LATCH_POLL));
    }
}
