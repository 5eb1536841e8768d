use serde::{Deserialize, Serialize};

/// One row of the failure store: the current state of a provider's breaker
/// plus the last blacklist window, kept as history after recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderFailureRecord {
    pub platform: String,
    pub provider_name: String,
    pub failure_count: u32,
    pub last_failure_at: Option<i64>,
    pub blacklisted_at: Option<i64>,
    pub blacklisted_until: Option<i64>,
    pub auto_recovered: bool,
}

impl ProviderFailureRecord {
    pub fn new(platform: &str, provider_name: &str) -> Self {
        Self {
            platform: platform.to_string(),
            provider_name: provider_name.to_string(),
            failure_count: 0,
            last_failure_at: None,
            blacklisted_at: None,
            blacklisted_until: None,
            auto_recovered: false,
        }
    }

    /// Blacklisted at `now` iff the window end lies strictly in the future.
    pub fn blacklisted_at_time(&self, now: i64) -> Option<i64> {
        self.blacklisted_until.filter(|until| *until > now)
    }
}

/// Read-only view of a provider's breaker for the settings UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistStatus {
    pub platform: String,
    pub provider_name: String,
    pub failure_count: u32,
    pub blacklisted_at: Option<i64>,
    pub blacklisted_until: Option<i64>,
    pub last_failure_at: Option<i64>,
    pub is_blacklisted: bool,
    pub remaining_seconds: i64,
}

impl BlacklistStatus {
    pub fn from_record(record: ProviderFailureRecord, now: i64) -> Self {
        let active_until = record.blacklisted_at_time(now);
        Self {
            platform: record.platform,
            provider_name: record.provider_name,
            failure_count: record.failure_count,
            blacklisted_at: record.blacklisted_at,
            blacklisted_until: record.blacklisted_until,
            last_failure_at: record.last_failure_at,
            is_blacklisted: active_until.is_some(),
            remaining_seconds: active_until.map_or(0, |until| until - now),
        }
    }
}

/// What a single failure report did to the provider's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureOutcome {
    /// Count increased but stayed below the threshold.
    Counted { failure_count: u32, threshold: u32 },
    /// Count reached the threshold and a new blacklist window started.
    Blacklisted { failure_count: u32, until: i64 },
    /// Provider was already blacklisted; nothing changed.
    Debounced { until: i64 },
}
