//! `StationContext`: every piece of station state in one owned struct.
//!
//! The builder takes raw output lines and a gateway, names the outputs
//! consistently (`status`, `<channel>.pump`, `<channel>.led`), wires the
//! indicator manager and dispense controller to the shared panic latch, and
//! starts the network dispatcher.

use std::collections::HashSet;

use refill_traits::DigitalOutput;

use crate::config::{ChannelSpec, STATUS_OUTPUT, StationConfig};
use crate::dispatch::Dispatcher;
use crate::dispense::{DispenseChannel, DispenseController};
use crate::error::{BuildError, Result};
use crate::events::EventSender;
use crate::gateway::BackendGateway;
use crate::indicator::IndicatorManager;
use crate::output::{Output, PanicLatch, force_all_off};
use crate::panic::PanicMonitor;

type Line = Box<dyn DigitalOutput + Send>;

#[derive(Debug)]
pub struct StationContext {
    pub(crate) config: StationConfig,
    pub(crate) latch: PanicLatch,
    pub(crate) status: Output,
    pub(crate) indicators: IndicatorManager,
    pub(crate) dispenser: DispenseController,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) outputs: Vec<Output>,
}

impl StationContext {
    pub fn builder(config: StationConfig) -> StationContextBuilder {
        StationContextBuilder {
            config,
            status: None,
            channels: Vec::new(),
            gateway: None,
        }
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn latch(&self) -> &PanicLatch {
        &self.latch
    }

    pub fn indicators(&self) -> &IndicatorManager {
        &self.indicators
    }

    pub fn dispenser(&self) -> &DispenseController {
        &self.dispenser
    }

    /// Every output line, status first.
    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Startup state: everything off, then the status indicator steady on.
    pub fn boot(&self) -> Result<()> {
        force_all_off(&self.outputs);
        self.status.on()
    }

    pub fn all_off(&self) {
        force_all_off(&self.outputs);
    }

    /// A panic handler for this station's outputs, posting to `events`.
    pub fn panic_monitor(&self, events: EventSender) -> PanicMonitor {
        PanicMonitor::new(
            self.latch.clone(),
            self.indicators.clone(),
            self.outputs.clone(),
            events,
        )
    }
}

pub struct StationContextBuilder {
    config: StationConfig,
    status: Option<Line>,
    channels: Vec<(ChannelSpec, Line, Line)>,
    gateway: Option<BackendGateway>,
}

impl StationContextBuilder {
    #[must_use]
    pub fn status<D: DigitalOutput + Send + 'static>(mut self, line: D) -> Self {
        self.status = Some(Box::new(line));
        self
    }

    #[must_use]
    pub fn channel<P, I>(mut self, spec: ChannelSpec, pump: P, indicator: I) -> Self
    where
        P: DigitalOutput + Send + 'static,
        I: DigitalOutput + Send + 'static,
    {
        self.channels.push((spec, Box::new(pump), Box::new(indicator)));
        self
    }

    #[must_use]
    pub fn gateway(mut self, gateway: BackendGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn build(self) -> std::result::Result<StationContext, BuildError> {
        let status = self.status.ok_or(BuildError::MissingStatus)?;
        let gateway = self.gateway.ok_or(BuildError::MissingGateway)?;
        if self.channels.is_empty() {
            return Err(BuildError::NoChannels);
        }
        if self.config.blink_half_period.is_zero() {
            return Err(BuildError::InvalidConfig("blink half-period must be > 0".into()));
        }

        let latch = PanicLatch::new();
        let status = Output::new(STATUS_OUTPUT, status, latch.clone());
        let mut names: HashSet<String> = HashSet::from([STATUS_OUTPUT.to_string()]);
        let mut outputs = vec![status.clone()];
        let mut channels = Vec::with_capacity(self.channels.len());
        for (spec, pump, indicator) in self.channels {
            if !(spec.flow_ml_per_s.is_finite() && spec.flow_ml_per_s > 0.0) {
                return Err(BuildError::InvalidConfig(format!(
                    "channel {:?}: flow rate must be > 0",
                    spec.name
                )));
            }
            if channels
                .iter()
                .any(|c: &DispenseChannel| c.water_type == spec.water_type)
            {
                return Err(BuildError::InvalidConfig(format!(
                    "two channels dispense {}",
                    spec.water_type
                )));
            }
            for name in [spec.pump_output(), spec.indicator_output()] {
                if !names.insert(name.clone()) {
                    return Err(BuildError::DuplicateOutput(name));
                }
            }
            let pump = Output::new(&spec.pump_output(), pump, latch.clone());
            let indicator = Output::new(&spec.indicator_output(), indicator, latch.clone());
            outputs.push(pump.clone());
            outputs.push(indicator.clone());
            channels.push(DispenseChannel {
                name: spec.name,
                water_type: spec.water_type,
                pump,
                indicator,
                flow_ml_per_s: spec.flow_ml_per_s,
            });
        }

        let blinkable = std::iter::once(status.clone()).chain(channels.iter().map(|c| c.indicator.clone()));
        let indicators =
            IndicatorManager::new(blinkable, self.config.blink_half_period, latch.clone());
        let dispenser = DispenseController::new(channels, indicators.clone(), latch.clone());
        let dispatcher =
            Dispatcher::spawn(gateway).map_err(|e| BuildError::Thread(e.to_string()))?;

        Ok(StationContext {
            config: self.config,
            latch,
            status,
            indicators,
            dispenser,
            dispatcher,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::WaterType;
    use crate::mocks::{MemoryOutput, MockHttp};
    use std::sync::Arc;

    fn gateway() -> BackendGateway {
        BackendGateway::new("http://b", 1, Arc::new(MockHttp::new()))
    }

    fn spec(name: &str, water: &str, flow: f64) -> ChannelSpec {
        ChannelSpec {
            name: name.into(),
            water_type: WaterType::parse(water),
            flow_ml_per_s: flow,
        }
    }

    #[test]
    fn missing_parts_are_reported() {
        let b = StationContext::builder(StationConfig::default());
        assert_eq!(b.build().unwrap_err(), BuildError::MissingStatus);
        let b = StationContext::builder(StationConfig::default()).status(MemoryOutput::new());
        assert_eq!(b.build().unwrap_err(), BuildError::MissingGateway);
        let b = StationContext::builder(StationConfig::default())
            .status(MemoryOutput::new())
            .gateway(gateway());
        assert_eq!(b.build().unwrap_err(), BuildError::NoChannels);
    }

    #[test]
    fn duplicate_channel_names_collide() {
        let err = StationContext::builder(StationConfig::default())
            .status(MemoryOutput::new())
            .gateway(gateway())
            .channel(spec("tap", "tap", 38.0), MemoryOutput::new(), MemoryOutput::new())
            .channel(spec("tap", "mineral", 38.0), MemoryOutput::new(), MemoryOutput::new())
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicateOutput("tap.pump".into()));
    }

    #[test]
    fn zero_flow_is_rejected() {
        let err = StationContext::builder(StationConfig::default())
            .status(MemoryOutput::new())
            .gateway(gateway())
            .channel(spec("tap", "tap", 0.0), MemoryOutput::new(), MemoryOutput::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfig(_)));
    }

    #[test]
    fn boot_turns_status_on_and_everything_else_off() {
        let status = MemoryOutput::new();
        let pump = MemoryOutput::new();
        let led = MemoryOutput::new();
        let ctx = StationContext::builder(StationConfig::default())
            .status(status.clone())
            .gateway(gateway())
            .channel(spec("tap", "tap", 38.0), pump.clone(), led.clone())
            .build()
            .unwrap();
        ctx.boot().unwrap();
        assert!(status.is_on());
        assert_eq!(pump.history(), vec![false]);
        assert_eq!(led.history(), vec![false]);
        let names: Vec<_> = ctx.outputs().iter().map(|o| o.name().to_string()).collect();
        assert_eq!(names, ["status", "tap.pump", "tap.led"]);
    }
}
