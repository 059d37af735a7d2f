//! `HttpClient` over `reqwest::blocking`.

use std::time::Duration;

use refill_traits::{BoxError, HttpClient, HttpResponse};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use crate::error::NetError;

/// Blocking client with a per-request timeout covering connect and body.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self, NetError> {
        if timeout.is_zero() {
            return Err(NetError::Invalid("http timeout must be > 0".into()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("refill-station/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    fn finish(resp: reqwest::blocking::Response) -> Result<HttpResponse, BoxError> {
        let status = resp.status().as_u16();
        let body = resp.text()?;
        Ok(HttpResponse { status, body })
    }
}

impl HttpClient for ReqwestHttp {
    fn get(&self, url: &str) -> Result<HttpResponse, BoxError> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()?;
        Self::finish(resp)
    }

    fn post_json(&self, url: &str, body: &str) -> Result<HttpResponse, BoxError> {
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()?;
        Self::finish(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(matches!(
            ReqwestHttp::new(Duration::ZERO),
            Err(NetError::Invalid(_))
        ));
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let http = ReqwestHttp::new(Duration::from_millis(300)).unwrap();
        // Port 9 on localhost (discard) is closed on CI hosts.
        assert!(http.get("http://127.0.0.1:9/bottles/preferences/x").is_err());
    }
}
