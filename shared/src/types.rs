use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Last known reachability of a monitored service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    /// Never probed since creation or since the last full update
    #[default]
    Unknown,
    /// The endpoint answered the last probe, whatever the HTTP status code
    Ok,
    /// The last probe got no response at all
    Fail,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "UNKNOWN",
            ServiceStatus::Ok => "OK",
            ServiceStatus::Fail => "FAIL",
        }
    }

    /// Parse a stored status column. Anything unrecognised reads back as `Unknown`.
    pub fn parse_or_unknown(value: &str) -> Self {
        match value {
            "OK" => ServiceStatus::Ok,
            "FAIL" => ServiceStatus::Fail,
            _ => ServiceStatus::Unknown,
        }
    }

    /// Probes may move any state to `Ok` or `Fail`. Only a full update
    /// resets a record to `Unknown`, so it is never a valid probe target.
    pub fn can_transition_to(self, next: ServiceStatus) -> bool {
        next != ServiceStatus::Unknown
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored service as stored in the registry.
/// This is the canonical data model used by the daemon and its API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Client-chosen unique name, e.g. "billing"
    pub name: String,

    /// Absolute http(s) URL probed by the poller, kept exactly as submitted
    pub url: String,

    /// Creation time, serialized as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Outcome of the most recent probe
    #[serde(default)]
    pub status: ServiceStatus,
}

/// Body accepted by create and update. Both fields are optional on the wire
/// so that missing ones can be reported as a validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePayload {
    pub name: Option<String>,
    pub url: Option<String>,
}

impl ServicePayload {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            url: Some(url.into()),
        }
    }
}

/// A payload that passed validation, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub name: String,
    pub url: String,
}
