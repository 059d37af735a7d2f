//! In-memory collaborators for tests and dry runs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use refill_traits::{
    BoxError, DigitalOutput, HttpClient, HttpResponse, KeyType, MessagePublisher, Qos, RawTag,
    TagReader,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Output line that records every level it was driven to.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    levels: Arc<Mutex<Vec<bool>>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        lock(&self.levels).last().copied().unwrap_or(false)
    }

    /// Every level written so far, oldest first.
    pub fn history(&self) -> Vec<bool> {
        lock(&self.levels).clone()
    }

    /// Number of off→on transitions.
    pub fn rising_edges(&self) -> usize {
        let h = self.history();
        let mut prev = false;
        let mut n = 0;
        for level in h {
            if level && !prev {
                n += 1;
            }
            prev = level;
        }
        n
    }
}

impl DigitalOutput for MemoryOutput {
    fn on(&mut self) -> Result<(), BoxError> {
        lock(&self.levels).push(true);
        Ok(())
    }
    fn off(&mut self) -> Result<(), BoxError> {
        lock(&self.levels).push(false);
        Ok(())
    }
    fn is_on(&self) -> bool {
        MemoryOutput::is_on(self)
    }
}

/// A request seen by [`MockHttp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum PostMode {
    Status(u16),
    Fail,
}

impl Default for PostMode {
    fn default() -> Self {
        Self::Status(201)
    }
}

/// HTTP collaborator answering GETs from a table and recording everything.
#[derive(Debug, Clone, Default)]
pub struct MockHttp {
    get_routes: Arc<Mutex<HashMap<String, HttpResponse>>>,
    post_status: Arc<Mutex<PostMode>>,
    get_delay: Arc<Mutex<Duration>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer GET `url` with `status` and `body`. Unrouted GETs fail at transport level.
    pub fn route_get(&self, url: &str, status: u16, body: &str) {
        lock(&self.get_routes).insert(
            url.to_string(),
            HttpResponse {
                status,
                body: body.to_string(),
            },
        );
    }

    /// Hold every GET for `d` before answering, like a slow backend.
    pub fn delay_gets(&self, d: Duration) {
        *lock(&self.get_delay) = d;
    }

    /// Status for every POST (default 201).
    pub fn post_status(&self, status: u16) {
        *lock(&self.post_status) = PostMode::Status(status);
    }

    /// Make every POST fail at transport level.
    pub fn fail_posts(&self) {
        *lock(&self.post_status) = PostMode::Fail;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Bodies of every POST, parsed as JSON.
    pub fn posted_json(&self) -> Vec<serde_json::Value> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .filter_map(|r| r.body.and_then(|b| serde_json::from_str(&b).ok()))
            .collect()
    }
}

impl HttpClient for MockHttp {
    fn get(&self, url: &str) -> Result<HttpResponse, BoxError> {
        lock(&self.requests).push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            body: None,
        });
        let delay = *lock(&self.get_delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        lock(&self.get_routes)
            .get(url)
            .cloned()
            .ok_or_else(|| format!("connection refused: {url}").into())
    }

    fn post_json(&self, url: &str, body: &str) -> Result<HttpResponse, BoxError> {
        lock(&self.requests).push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            body: Some(body.to_string()),
        });
        match *lock(&self.post_status) {
            PostMode::Status(status) => Ok(HttpResponse {
                status,
                body: String::new(),
            }),
            PostMode::Fail => Err(format!("connection reset: {url}").into()),
        }
    }
}

/// Broker collaborator that records publishes.
#[derive(Debug, Clone, Default)]
pub struct MockPublisher {
    published: Arc<Mutex<Vec<(String, Vec<u8>, Qos)>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publishes(&self, fail: bool) {
        *lock(&self.fail) = fail;
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>, Qos)> {
        lock(&self.published).clone()
    }
}

impl MessagePublisher for MockPublisher {
    fn publish(&self, topic: &str, payload: &[u8], qos: Qos) -> Result<(), BoxError> {
        if *lock(&self.fail) {
            return Err("broker unreachable".into());
        }
        lock(&self.published).push((topic.to_string(), payload.to_vec(), qos));
        Ok(())
    }
}

/// Tag reader fed from a queue; block contents come from a table.
///
/// Polls return queued tags in order, then `Ok(None)` after sleeping for the
/// poll timeout (capped at 20 ms to keep tests fast).
#[derive(Debug, Clone, Default)]
pub struct ScriptedTagReader {
    queue: Arc<Mutex<VecDeque<RawTag>>>,
    blocks: Arc<Mutex<HashMap<u8, Vec<u8>>>>,
    auth_fail: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedTagReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn present(&self, uid: &[u8]) {
        lock(&self.queue).push_back(RawTag { uid: uid.to_vec() });
    }

    pub fn set_block(&self, block: u8, data: &[u8]) {
        lock(&self.blocks).insert(block, data.to_vec());
    }

    pub fn fail_auth(&self, block: u8) {
        lock(&self.auth_fail).push(block);
    }
}

impl TagReader for ScriptedTagReader {
    fn poll_for_tag(&mut self, timeout: Duration) -> Result<Option<RawTag>, BoxError> {
        if let Some(tag) = lock(&self.queue).pop_front() {
            return Ok(Some(tag));
        }
        std::thread::sleep(timeout.min(Duration::from_millis(20)));
        Ok(None)
    }

    fn authenticate_and_read_block(
        &mut self,
        _uid: &[u8],
        block: u8,
        _key_type: KeyType,
        _key: &[u8; 6],
    ) -> Result<Vec<u8>, BoxError> {
        if lock(&self.auth_fail).contains(&block) {
            return Err(format!("authentication failed for block {block}").into());
        }
        lock(&self.blocks)
            .get(&block)
            .cloned()
            .ok_or_else(|| format!("read failed for block {block}").into())
    }
}
