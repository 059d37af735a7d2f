#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Network collaborators: blocking HTTP over reqwest and MQTT over rumqttc.

pub mod error;
pub mod http;
pub mod mqtt;

pub use error::NetError;
pub use http::ReqwestHttp;
pub use mqtt::{MqttPublisher, MqttSettings};
