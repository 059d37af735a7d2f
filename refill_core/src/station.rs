//! The station state machine.
//!
//! One thread runs [`StationStateMachine::run`]. It owns the
//! [`StationContext`] and consumes the station event queue; everything else
//! (tag poller, button and panic edge callbacks, signal handlers) only
//! produces events. Tag cycles go
//!
//! ```text
//! Idle -> AwaitingPreferences -> AwaitingBottlePlacement -> Dispensing -> Reporting -> Idle
//! ```
//!
//! and every wait inside a cycle (lookup, settle delay, dispense hold) keeps
//! draining the queue, so buttons work independently of the tag cycle and a
//! panic or shutdown cuts the wait short.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use refill_traits::TagReader;

use crate::config::{AckStyle, STATUS_OUTPUT, TagKeySource};
use crate::context::StationContext;
use crate::dispense::{ActiveDispense, DispenseRequest};
use crate::error::{Result, StationError};
use crate::events::{self, EventSender, StationEvent};
use crate::gateway::{Preference, TransactionReport};
use crate::output::Steady;
use crate::panic::PanicMonitor;
use crate::poller::{PollSettings, TagPoller};
use crate::tag::Tag;
use crate::util::{clamp_secs, round_centis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StationState {
    Idle = 0,
    AwaitingPreferences = 1,
    AwaitingBottlePlacement = 2,
    Dispensing = 3,
    Reporting = 4,
}

impl StationState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::AwaitingPreferences,
            2 => Self::AwaitingBottlePlacement,
            3 => Self::Dispensing,
            4 => Self::Reporting,
            _ => Self::Idle,
        }
    }
}

/// Read-only view of the tag cycle state from other threads.
#[derive(Debug, Clone, Default)]
pub struct StateProbe(Arc<AtomicU8>);

impl StateProbe {
    pub fn get(&self) -> StationState {
        StationState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: StationState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Why the station loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Panic,
    Shutdown,
}

struct Held {
    request: DispenseRequest,
    since: Instant,
    /// `None` when the press was rejected (channel busy).
    dispense: Option<ActiveDispense>,
}

pub struct StationStateMachine<R> {
    reader: R,
    station: Station,
}

struct Station {
    ctx: StationContext,
    sender: EventSender,
    events: xch::Receiver<StationEvent>,
    state: StateProbe,
    buttons: HashMap<String, Held>,
    idle_since: Instant,
    reader_closed: bool,
    exit_on_reader_close: bool,
}

impl<R: TagReader + Send + 'static> StationStateMachine<R> {
    pub fn new(ctx: StationContext, reader: R) -> Self {
        let (sender, events) = events::queue();
        Self {
            reader,
            station: Station {
                ctx,
                sender,
                events,
                state: StateProbe::default(),
                buttons: HashMap::new(),
                idle_since: Instant::now(),
                reader_closed: false,
                exit_on_reader_close: false,
            },
        }
    }

    /// Stop (as a shutdown) once the tag source closes and the station is idle
    /// with no button held.
    #[must_use]
    pub fn exit_on_reader_close(mut self, exit: bool) -> Self {
        self.station.exit_on_reader_close = exit;
        self
    }

    pub fn sender(&self) -> EventSender {
        self.station.sender.clone()
    }

    pub fn probe(&self) -> StateProbe {
        self.station.state.clone()
    }

    pub fn panic_monitor(&self) -> PanicMonitor {
        self.station.ctx.panic_monitor(self.station.sender.clone())
    }

    pub fn context(&self) -> &StationContext {
        &self.station.ctx
    }

    /// Run until shutdown (`Ok`) or panic (`Err(PanicTriggered)`).
    /// All outputs are off when this returns.
    pub fn run(self) -> Result<()> {
        let Self {
            reader,
            mut station,
        } = self;
        station.ctx.boot()?;
        let cfg = &station.ctx.config;
        let settings = PollSettings {
            interval: cfg.poll_interval,
            access: cfg.tag_access.clone(),
            read_content: cfg.tag_key == TagKeySource::Content
                || tracing::enabled!(tracing::Level::DEBUG),
        };
        let poller = match TagPoller::spawn(reader, station.sender.clone(), settings) {
            Ok(p) => p,
            Err(e) => {
                station.ctx.all_off();
                return Err(StationError::Hardware(format!("spawn tag poller: {e}")));
            }
        };
        tracing::info!(station = station.ctx.config.station_id, "station ready");
        let halt = station.serve();
        station.power_down(halt, poller)
    }
}

impl Station {
    fn set_state(&self, state: StationState) {
        if self.state.get() != state {
            tracing::debug!(?state, "state");
            self.state.set(state);
        }
    }

    fn serve(&mut self) -> Halt {
        loop {
            self.set_state(StationState::Idle);
            if self.reader_closed && self.exit_on_reader_close && self.buttons.is_empty() {
                return Halt::Shutdown;
            }
            let Ok(event) = self.events.recv() else {
                return Halt::Shutdown;
            };
            let tag = match event {
                StationEvent::TagPresented { tag, at } if at >= self.idle_since => tag,
                StationEvent::TagPresented { tag, .. } => {
                    tracing::debug!(tag = %tag.uid_hex(), "stale tag ignored");
                    continue;
                }
                other => {
                    if let Err(halt) = self.service(other) {
                        return halt;
                    }
                    continue;
                }
            };
            let outcome = self.tag_cycle(&tag);
            self.idle_since = Instant::now();
            if let Err(halt) = outcome {
                return halt;
            }
        }
    }

    /// Handle an event that arrives while a tag cycle is waiting.
    fn service(&mut self, event: StationEvent) -> std::result::Result<(), Halt> {
        match event {
            StationEvent::TagPresented { tag, .. } => {
                tracing::debug!(tag = %tag.uid_hex(), state = ?self.state.get(), "tag ignored; cycle in progress");
            }
            StationEvent::ButtonPressed { channel, at } => self.press(&channel, at),
            StationEvent::ButtonReleased { channel, at } => self.release(&channel, at),
            StationEvent::ReaderClosed => {
                self.reader_closed = true;
                tracing::warn!("tag reader closed; no further tag cycles");
            }
            StationEvent::Panic => return Err(Halt::Panic),
            StationEvent::Shutdown => return Err(Halt::Shutdown),
        }
        Ok(())
    }

    /// Wait for `d` while servicing the queue.
    fn suspend(&mut self, d: Duration) -> std::result::Result<(), Halt> {
        let deadline = Instant::now() + d;
        loop {
            if self.ctx.latch.is_tripped() {
                return Err(Halt::Panic);
            }
            match self.events.recv_deadline(deadline) {
                Ok(event) => self.service(event)?,
                Err(xch::RecvTimeoutError::Timeout) => return Ok(()),
                Err(xch::RecvTimeoutError::Disconnected) => return Err(Halt::Shutdown),
            }
        }
    }

    fn await_lookup(
        &mut self,
        reply: &xch::Receiver<Result<Preference>>,
    ) -> std::result::Result<Result<Preference>, Halt> {
        let events = self.events.clone();
        loop {
            xch::select! {
                recv(reply) -> answer => {
                    return Ok(answer.unwrap_or_else(|_| {
                        Err(StationError::LookupFailed("dispatcher stopped".into()))
                    }));
                }
                recv(events) -> event => match event {
                    Ok(event) => self.service(event)?,
                    Err(_) => return Err(Halt::Shutdown),
                },
            }
        }
    }

    fn acknowledge(&self) {
        let result = match self.ctx.config.ack {
            AckStyle::Pulse(n) => self.ctx.indicators.blink_n_times(n, STATUS_OUTPUT),
            AckStyle::Blink => self.ctx.indicators.start_blink(STATUS_OUTPUT),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "status acknowledgement failed");
        }
    }

    fn restore_status(&self) {
        if let Err(e) = self.ctx.indicators.stop_blink(STATUS_OUTPUT, Steady::On) {
            if !self.ctx.latch.is_tripped() {
                tracing::warn!(error = %e, "failed to restore status indicator");
            }
        }
    }

    fn cancel_placement_blink(&self, indicator: &str) {
        if self.ctx.indicators.is_blinking(indicator) {
            if let Err(e) = self.ctx.indicators.stop_blink(indicator, Steady::Off) {
                tracing::warn!(output = indicator, error = %e, "failed to stop placement blink");
            }
        }
    }

    fn tag_cycle(&mut self, tag: &Tag) -> std::result::Result<(), Halt> {
        self.set_state(StationState::AwaitingPreferences);
        let key = tag.lookup_key(self.ctx.config.tag_key);
        if key.is_empty() {
            tracing::warn!(tag = %tag.uid_hex(), "tag carries no lookup key; ignored");
            return Ok(());
        }
        tracing::info!(tag = %key, "tag presented");

        self.acknowledge();
        let reply = self.ctx.dispatcher.lookup(&key);
        let answer = self.await_lookup(&reply);
        self.restore_status();
        let pref = match answer? {
            Ok(pref) => pref,
            Err(e) => {
                tracing::warn!(tag = %key, error = %e, "lookup failed; back to idle");
                return Ok(());
            }
        };

        let Some(channel) = self.ctx.dispenser.channel_for(&pref.water_type) else {
            let e = StationError::UnknownWaterType(pref.water_type.to_string());
            tracing::warn!(tag = %key, error = %e, "back to idle");
            return Ok(());
        };
        let name = channel.name.clone();
        let indicator = channel.indicator.name().to_string();
        let flow = channel.flow_ml_per_s;
        let request = DispenseRequest::attributed(&name, pref.fill_volume_ml, pref.owner());
        let exact = self.ctx.dispenser.duration_for(&request).ok().flatten().unwrap_or(0.0);
        let planned = round_centis(exact);

        if self.ctx.dispenser.is_busy(&name) {
            let e = StationError::ChannelBusy(name.clone());
            tracing::warn!(tag = %key, error = %e, "back to idle");
            return Ok(());
        }

        self.set_state(StationState::AwaitingBottlePlacement);
        tracing::info!(channel = %name, volume_ml = pref.fill_volume_ml, duration_s = planned, "waiting for bottle placement");
        if let Err(e) = self.ctx.indicators.start_blink(&indicator) {
            tracing::warn!(output = %indicator, error = %e, "placement blink failed");
        }
        if let Err(halt) = self.suspend(self.ctx.config.settle) {
            self.cancel_placement_blink(&indicator);
            return Err(halt);
        }

        self.ctx.dispatcher.telemetry(pref.user_id.clone(), planned);

        self.set_state(StationState::Dispensing);
        let active = match self.ctx.dispenser.begin(&name) {
            Ok(active) => active,
            Err(e) => {
                if !matches!(e, StationError::ChannelBusy(_)) {
                    self.cancel_placement_blink(&indicator);
                }
                tracing::warn!(channel = %name, error = %e, "dispense not started; back to idle");
                return if e == StationError::PanicTriggered {
                    Err(Halt::Panic)
                } else {
                    Ok(())
                };
            }
        };
        let held = self.suspend(clamp_secs(planned));
        let ran = active.finish();

        self.set_state(StationState::Reporting);
        let duration_s = match held {
            Ok(()) => planned,
            Err(Halt::Shutdown) => ran.as_secs_f64(),
            Err(Halt::Panic) => return Err(Halt::Panic),
        };
        self.ctx.dispatcher.report(TransactionReport {
            channel: name,
            water_type: pref.water_type,
            flow_ml_per_s: flow,
            duration_s,
            owner: request.owner,
        });
        held
    }

    fn press(&mut self, channel: &str, at: Instant) {
        if self.buttons.contains_key(channel) {
            tracing::debug!(channel, "repeated press ignored");
            return;
        }
        let request = DispenseRequest::guest_hold(channel);
        let dispense = match self.ctx.dispenser.begin(&request.channel) {
            Ok(active) => {
                tracing::info!(channel, "button dispense started");
                Some(active)
            }
            Err(StationError::UnknownChannel(_)) => {
                tracing::warn!(channel, "press on unknown channel ignored");
                return;
            }
            Err(e) => {
                tracing::warn!(channel, error = %e, "button press rejected");
                None
            }
        };
        self.buttons.insert(
            channel.to_string(),
            Held {
                request,
                since: at,
                dispense,
            },
        );
    }

    fn release(&mut self, channel: &str, at: Instant) {
        let Some(held) = self.buttons.remove(channel) else {
            tracing::debug!(channel, "release without press ignored");
            return;
        };
        let Some(active) = held.dispense else {
            return;
        };
        let hold = at.saturating_duration_since(held.since);
        let report = TransactionReport {
            channel: active.channel().to_string(),
            water_type: active.water_type().clone(),
            flow_ml_per_s: active.flow_ml_per_s(),
            duration_s: hold.as_secs_f64(),
            owner: held.request.owner,
        };
        drop(active);
        tracing::info!(channel, duration_s = report.duration_s, "button released");
        self.ctx.dispatcher.report(report);
    }

    fn power_down(mut self, halt: Halt, poller: TagPoller) -> Result<()> {
        match halt {
            Halt::Shutdown => {
                let now = Instant::now();
                let held: Vec<String> = self.buttons.keys().cloned().collect();
                for channel in held {
                    self.release(&channel, now);
                }
            }
            Halt::Panic => self.buttons.clear(),
        }
        self.ctx.indicators.stop_all(Steady::Off);
        self.ctx.all_off();
        self.set_state(StationState::Idle);
        drop(poller);

        let Station { ctx, .. } = self;
        match halt {
            Halt::Panic => {
                ctx.dispatcher.detach();
                tracing::error!("station stopped by panic input");
                Err(StationError::PanicTriggered)
            }
            Halt::Shutdown => {
                drop(ctx);
                tracing::info!("station shut down");
                Ok(())
            }
        }
    }
}
