//! Backend lookups, transaction reports and telemetry.
//!
//! The gateway is a thin, clonable adapter over the [`HttpClient`] and
//! [`MessagePublisher`] collaborators. Every method is a single attempt; the
//! caller decides what a failure means (a failed lookup aborts the tag cycle,
//! a failed report or publish is only logged).

use std::fmt;
use std::sync::Arc;

use refill_traits::{HttpClient, MessagePublisher, Qos};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StationError};
use crate::util::{encode_path_segment, reported_volume, round_centis};

/// Water dispensed by a channel. Matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WaterType {
    Tap,
    Mineral,
    Other(String),
}

impl WaterType {
    pub fn parse(s: &str) -> Self {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "tap" => Self::Tap,
            "mineral" => Self::Mineral,
            _ => Self::Other(s),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Tap => "tap",
            Self::Mineral => "mineral",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for WaterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend record identifier, echoed back in reports exactly as received.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Attribution of a dispense to a bottle and its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub bottle_id: RecordId,
    pub user_id: RecordId,
}

/// Dispense preferences registered for a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preference {
    pub bottle_id: RecordId,
    pub user_id: RecordId,
    pub fill_volume_ml: u32,
    pub water_type: WaterType,
}

impl Preference {
    pub fn owner(&self) -> Owner {
        Owner {
            bottle_id: self.bottle_id.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

#[derive(Deserialize)]
struct PreferenceWire {
    id: Option<RecordId>,
    user_id: Option<RecordId>,
    fill_volume: Option<serde_json::Value>,
    water_type: Option<String>,
}

impl TryFrom<PreferenceWire> for Preference {
    type Error = StationError;

    fn try_from(w: PreferenceWire) -> Result<Self> {
        let missing = |field: &str| StationError::LookupFailed(format!("response missing {field}"));
        let bottle_id = w.id.ok_or_else(|| missing("id"))?;
        let user_id = w.user_id.ok_or_else(|| missing("user_id"))?;
        let fill = w.fill_volume.ok_or_else(|| missing("fill_volume"))?;
        let water_type = w.water_type.ok_or_else(|| missing("water_type"))?;
        Ok(Self {
            bottle_id,
            user_id,
            fill_volume_ml: parse_fill_volume(&fill)?,
            water_type: WaterType::parse(&water_type),
        })
    }
}

/// Accept a non-negative number, or a string holding an integer.
/// Fractional numbers are truncated toward zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_fill_volume(v: &serde_json::Value) -> Result<u32> {
    let n = match v {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && *f <= f64::from(u32::MAX))
                .map(|f| f.trunc() as u64)
        }),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    n.and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| StationError::LookupFailed(format!("fill_volume is not a volume: {v}")))
}

/// A completed dispense, ready to be reported.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReport {
    pub channel: String,
    pub water_type: WaterType,
    pub flow_ml_per_s: f64,
    pub duration_s: f64,
    /// `None` reports a guest transaction.
    pub owner: Option<Owner>,
}

impl TransactionReport {
    pub fn volume_ml(&self) -> u64 {
        reported_volume(self.duration_s, self.flow_ml_per_s)
    }
}

#[derive(Serialize)]
struct TransactionBody<'a> {
    station_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    bottle_id: Option<&'a RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a RecordId>,
    volume: u64,
    water_type: &'a str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    guest: bool,
}

#[derive(Serialize)]
struct TelemetryBody {
    duration: f64,
}

#[derive(Clone)]
struct Telemetry {
    publisher: Arc<dyn MessagePublisher + Send + Sync>,
    base_topic: String,
    qos: Qos,
}

#[derive(Clone)]
pub struct BackendGateway {
    base_url: String,
    station_id: u32,
    http: Arc<dyn HttpClient + Send + Sync>,
    telemetry: Option<Telemetry>,
}

impl fmt::Debug for BackendGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendGateway")
            .field("base_url", &self.base_url)
            .field("station_id", &self.station_id)
            .field("telemetry", &self.telemetry.as_ref().map(|t| &t.base_topic))
            .finish_non_exhaustive()
    }
}

impl BackendGateway {
    pub fn new(base_url: &str, station_id: u32, http: Arc<dyn HttpClient + Send + Sync>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            station_id,
            http,
            telemetry: None,
        }
    }

    /// Publish dispense telemetry to `{base_topic}User-{user_id}`.
    #[must_use]
    pub fn with_telemetry(
        mut self,
        publisher: Arc<dyn MessagePublisher + Send + Sync>,
        base_topic: &str,
        qos: Qos,
    ) -> Self {
        self.telemetry = Some(Telemetry {
            publisher,
            base_topic: base_topic.to_string(),
            qos,
        });
        self
    }

    pub fn station_id(&self) -> u32 {
        self.station_id
    }

    pub fn preferences_url(&self, key: &str) -> String {
        format!("{}/bottles/preferences/{}", self.base_url, encode_path_segment(key))
    }

    pub fn transactions_url(&self) -> String {
        format!("{}/water_transactions", self.base_url)
    }

    pub fn fetch_preferences(&self, key: &str) -> Result<Preference> {
        let url = self.preferences_url(key);
        let resp = self
            .http
            .get(&url)
            .map_err(|e| StationError::LookupFailed(format!("GET {url}: {e}")))?;
        if !resp.is_success() {
            return Err(StationError::LookupFailed(format!(
                "GET {url}: status {}",
                resp.status
            )));
        }
        let wire: PreferenceWire = serde_json::from_str(&resp.body)
            .map_err(|e| StationError::LookupFailed(format!("malformed preferences: {e}")))?;
        Preference::try_from(wire)
    }

    /// POST the transaction. Returns the reported volume.
    pub fn report_transaction(&self, report: &TransactionReport) -> Result<u64> {
        let volume = report.volume_ml();
        let body = TransactionBody {
            station_id: self.station_id,
            bottle_id: report.owner.as_ref().map(|o| &o.bottle_id),
            user_id: report.owner.as_ref().map(|o| &o.user_id),
            volume,
            water_type: report.water_type.as_str(),
            guest: report.owner.is_none(),
        };
        let json = serde_json::to_string(&body)
            .map_err(|e| StationError::ReportFailed(e.to_string()))?;
        let url = self.transactions_url();
        let resp = self
            .http
            .post_json(&url, &json)
            .map_err(|e| StationError::ReportFailed(format!("POST {url}: {e}")))?;
        if !resp.is_success() {
            return Err(StationError::ReportFailed(format!(
                "POST {url}: status {}",
                resp.status
            )));
        }
        Ok(volume)
    }

    /// Publish the planned dispense duration for `user_id`. A no-op without a broker.
    pub fn publish_telemetry(&self, user_id: &RecordId, duration_s: f64) -> Result<()> {
        let Some(t) = &self.telemetry else {
            return Ok(());
        };
        let topic = format!("{}User-{}", t.base_topic, user_id);
        let payload = serde_json::to_vec(&TelemetryBody {
            duration: round_centis(duration_s),
        })
        .map_err(|e| StationError::TelemetryFailed(e.to_string()))?;
        t.publisher
            .publish(&topic, &payload, t.qos)
            .map_err(|e| StationError::TelemetryFailed(format!("{topic}: {e}")))
    }
}
