use crate::BoxError;

/// Status and body of a completed HTTP exchange.
///
/// Transport failures are reported as `Err`; any status code the server
/// answered with is an `Ok` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP collaborator.
pub trait HttpClient {
    fn get(&self, url: &str) -> Result<HttpResponse, BoxError>;
    /// POST `body` with `Content-Type: application/json`.
    fn post_json(&self, url: &str, body: &str) -> Result<HttpResponse, BoxError>;
}

/// Broker delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qos {
    #[default]
    AtMostOnce,
    AtLeastOnce,
}

/// Message-broker collaborator.
pub trait MessagePublisher {
    fn publish(&self, topic: &str, payload: &[u8], qos: Qos) -> Result<(), BoxError>;
}
