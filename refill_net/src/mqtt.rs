//! `MessagePublisher` over the rumqttc synchronous client.
//!
//! The client only enqueues; a background thread drives the connection and
//! reconnects after network errors.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use refill_traits::{BoxError, MessagePublisher, Qos};
use rumqttc::{Client, ConnectionError, Event, MqttOptions, Packet, QoS, Transport};

use crate::error::NetError;

const REQUEST_CAPACITY: usize = 16;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
    pub tls: bool,
    pub keep_alive: Duration,
}

impl MqttSettings {
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            host: host.into(),
            port,
            credentials: None,
            tls: true,
            keep_alive: Duration::from_secs(30),
        }
    }

    fn options(&self) -> Result<MqttOptions, NetError> {
        if self.host.trim().is_empty() {
            return Err(NetError::Invalid("mqtt host must not be empty".into()));
        }
        let mut opts = MqttOptions::new(&self.client_id, &self.host, self.port);
        opts.set_keep_alive(self.keep_alive);
        if let Some((user, pass)) = &self.credentials {
            opts.set_credentials(user, pass);
        }
        if self.tls {
            opts.set_transport(Transport::tls_with_default_config());
        }
        Ok(opts)
    }
}

pub struct MqttPublisher {
    client: Client,
    handle: Option<JoinHandle<()>>,
}

impl MqttPublisher {
    pub fn connect(settings: &MqttSettings) -> Result<Self, NetError> {
        let (client, mut connection) = Client::new(settings.options()?, REQUEST_CAPACITY);
        let host = settings.host.clone();
        let handle = thread::Builder::new()
            .name("mqtt-connection".into())
            .spawn(move || {
                for notification in connection.iter() {
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!(host = %host, "mqtt connected");
                        }
                        Ok(_) => {}
                        Err(ConnectionError::RequestsDone) => break,
                        Err(e) => {
                            tracing::warn!(host = %host, error = %e, "mqtt connection error");
                            thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
                tracing::debug!("mqtt connection loop exited");
            })
            .map_err(|e| NetError::Invalid(format!("spawn mqtt thread: {e}")))?;
        Ok(Self {
            client,
            handle: Some(handle),
        })
    }
}

fn qos(q: Qos) -> QoS {
    match q {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

impl MessagePublisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8], q: Qos) -> Result<(), BoxError> {
        self.client
            .try_publish(topic, qos(q), false, payload.to_vec())
            .map_err(NetError::from)?;
        Ok(())
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.client.disconnect() {
            tracing::debug!(error = %e, "mqtt disconnect");
        }
        // Joining blocks while the broker is unreachable.
        if let Some(h) = self.handle.take() {
            if h.is_finished() {
                reap(h);
            }
        }
    }
}

/// Join a finished connection thread; `false` when it panicked.
fn reap(handle: JoinHandle<()>) -> bool {
    let clean = handle.join().is_ok();
    if !clean {
        tracing::warn!("mqtt connection thread panicked");
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Qos::AtMostOnce, QoS::AtMostOnce)]
    #[case(Qos::AtLeastOnce, QoS::AtLeastOnce)]
    fn qos_maps_to_broker_levels(#[case] ours: Qos, #[case] theirs: QoS) {
        assert_eq!(qos(ours), theirs);
    }

    #[test]
    fn panicked_connection_thread_is_reported() {
        let h = thread::spawn(|| panic!("connection loop died"));
        while !h.is_finished() {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!reap(h));
        assert!(reap(thread::spawn(|| {})));
    }

    #[test]
    fn empty_host_is_rejected() {
        let s = MqttSettings::new("station-1", "  ", 1883);
        assert!(matches!(s.options(), Err(NetError::Invalid(_))));
    }

    #[test]
    fn options_carry_broker_and_keep_alive() {
        let mut s = MqttSettings::new("station-1", "broker.local", 1883);
        s.tls = false;
        s.credentials = Some(("user".into(), "secret".into()));
        let opts = s.options().unwrap();
        assert_eq!(opts.keep_alive(), Duration::from_secs(30));
        assert_eq!(opts.broker_address(), ("broker.local".to_string(), 1883));
    }
}
