#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Refill station control core (hardware-agnostic).
//!
//! All hardware and network access goes through the `refill_traits`
//! collaborators (`DigitalOutput`, `TagReader`, `HttpClient`,
//! `MessagePublisher`).
//!
//! ## Architecture
//!
//! - **Codec**: tag memory to text (`codec`)
//! - **Outputs**: shared output handles and the panic latch (`output`)
//! - **Indicators**: per-output blink threads (`indicator`)
//! - **Dispensing**: channels, busy flags and the dispense guard (`dispense`)
//! - **Backend**: lookups, reports, telemetry (`gateway`) on a worker thread (`dispatch`)
//! - **Orchestration**: the event-driven state machine (`station`) and the
//!   emergency stop (`panic`)

pub mod codec;
pub mod config;
pub mod context;
pub mod conversions;
pub mod dispatch;
pub mod dispense;
pub mod error;
pub mod events;
pub mod gateway;
pub mod hw_error;
pub mod indicator;
pub mod mocks;
pub mod output;
pub mod panic;
pub mod poller;
pub mod station;
pub mod tag;
pub mod util;

pub use config::{AckStyle, BlockRange, ChannelSpec, StationConfig, TagAccess, TagKeySource};
pub use context::{StationContext, StationContextBuilder};
pub use dispense::{ActiveDispense, DispenseController, DispenseRequest, compute_duration};
pub use error::{BuildError, Result, StationError};
pub use events::{EventSender, StationEvent};
pub use gateway::{BackendGateway, Preference, RecordId, TransactionReport, WaterType};
pub use indicator::IndicatorManager;
pub use output::{Output, PanicLatch, Steady};
pub use panic::PanicMonitor;
pub use station::{StateProbe, StationState, StationStateMachine};
pub use tag::Tag;
