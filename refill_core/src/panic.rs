//! Emergency stop.
//!
//! `PanicMonitor::trigger` is called from the panic input's edge callback, on
//! whatever thread delivers it. It does not wait for the station thread: the
//! outputs are forced off right there, and the station learns about it from
//! the queued `StationEvent::Panic`.

use crate::events::{EventSender, StationEvent};
use crate::indicator::IndicatorManager;
use crate::output::{Output, PanicLatch, Steady, force_all_off};

#[derive(Debug, Clone)]
pub struct PanicMonitor {
    latch: PanicLatch,
    indicators: IndicatorManager,
    outputs: Vec<Output>,
    events: EventSender,
}

impl PanicMonitor {
    pub fn new(
        latch: PanicLatch,
        indicators: IndicatorManager,
        outputs: Vec<Output>,
        events: EventSender,
    ) -> Self {
        Self {
            latch,
            indicators,
            outputs,
            events,
        }
    }

    /// Trip the latch, force every output off, stop all blinks, then notify
    /// the station. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.latch.trip() {
            return;
        }
        tracing::error!("panic input triggered; forcing all outputs off");
        force_all_off(&self.outputs);
        self.indicators.stop_all(Steady::Off);
        self.events.send(StationEvent::Panic);
    }

    pub fn is_tripped(&self) -> bool {
        self.latch.is_tripped()
    }
}
