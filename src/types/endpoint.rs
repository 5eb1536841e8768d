use serde::{Deserialize, Serialize};

/// Entry of the persisted endpoint registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    pub url: String,
    /// Unix seconds of the most recent probe, `None` if never tested.
    pub last_test_time: Option<i64>,
    /// Latency in ms of the most recent probe, `None` if it failed or never ran.
    pub last_test_speed: Option<u64>,
}

impl EndpointRecord {
    pub fn untested(url: &str) -> Self {
        Self {
            url: url.to_string(),
            last_test_time: None,
            last_test_speed: None,
        }
    }
}

/// Outcome of probing one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLatency {
    pub url: String,
    pub latency: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndpointLatency {
    pub fn success(url: &str, latency: u64, status: u16) -> Self {
        Self {
            url: url.to_string(),
            latency: Some(latency),
            status: Some(status),
            error: None,
        }
    }

    pub fn failure(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            latency: None,
            status: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
