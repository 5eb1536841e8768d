//! Failure-counting circuit breaker per `(platform, provider)`.
//!
//! A provider is blacklisted once its consecutive failure count reaches the
//! configured threshold, stays blacklisted until the window ends, and is
//! flagged as auto-recovered by the periodic sweep afterwards. Rows are never
//! deleted; the last window stays in the store as history.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{HealthError, Result};
use crate::failure_store::FailureStore;
use crate::settings::{BlacklistSettings, SettingsProvider};
use crate::types::blacklist::{BlacklistStatus, FailureOutcome, ProviderFailureRecord};

pub struct BlacklistTracker {
    store: Arc<dyn FailureStore>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
}

impl BlacklistTracker {
    pub fn new(
        store: Arc<dyn FailureStore>,
        settings: Arc<dyn SettingsProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            settings,
            clock,
        }
    }

    fn current_settings(&self) -> BlacklistSettings {
        match self.settings.blacklist_settings() {
            Ok(settings) => settings,
            Err(e) => {
                let fallback = BlacklistSettings::default();
                warn!(
                    error = %e,
                    threshold = fallback.failure_threshold,
                    duration_minutes = fallback.duration_minutes,
                    "Failed to load blacklist settings, using defaults"
                );
                fallback
            }
        }
    }

    /// Count one failure for a provider, blacklisting it when the threshold is
    /// reached. Failures reported while a window is active are dropped and do
    /// not extend the window.
    pub fn record_failure(&self, platform: &str, provider_name: &str) -> Result<FailureOutcome> {
        let settings = self.current_settings();
        let threshold = settings.failure_threshold.max(1);
        let window_secs = i64::from(settings.duration_minutes) * 60;
        let now = self.clock.now();

        let mut outcome = None;
        self.store.update_with(platform, provider_name, &mut |current| {
            let mut record = match current {
                Some(existing) => {
                    if let Some(until) = existing.blacklisted_at_time(now) {
                        outcome = Some(FailureOutcome::Debounced { until });
                        return None;
                    }
                    existing
                }
                None => ProviderFailureRecord::new(platform, provider_name),
            };

            record.failure_count += 1;
            record.last_failure_at = Some(now);

            if record.failure_count >= threshold {
                let until = now + window_secs;
                record.blacklisted_at = Some(now);
                record.blacklisted_until = Some(until);
                record.auto_recovered = false;
                outcome = Some(FailureOutcome::Blacklisted {
                    failure_count: record.failure_count,
                    until,
                });
            } else {
                outcome = Some(FailureOutcome::Counted {
                    failure_count: record.failure_count,
                    threshold,
                });
            }
            Some(record)
        })?;

        let outcome = outcome.ok_or_else(|| {
            HealthError::Persistence("failure store did not run the update".to_string())
        })?;

        match outcome {
            FailureOutcome::Counted {
                failure_count,
                threshold,
            } => info!(
                platform,
                provider = provider_name,
                failure_count,
                threshold,
                "Provider failure recorded"
            ),
            FailureOutcome::Blacklisted {
                failure_count,
                until,
            } => warn!(
                platform,
                provider = provider_name,
                failure_count,
                duration_minutes = settings.duration_minutes,
                until,
                "Provider blacklisted"
            ),
            FailureOutcome::Debounced { until } => info!(
                platform,
                provider = provider_name,
                until,
                "Provider already blacklisted, failure ignored"
            ),
        }

        Ok(outcome)
    }

    /// Whether the provider is inside an active blacklist window, with the
    /// window end. Missing rows and lookup errors read as not blacklisted.
    pub fn is_blacklisted(&self, platform: &str, provider_name: &str) -> (bool, Option<i64>) {
        let record = match self.store.get(platform, provider_name) {
            Ok(record) => record,
            Err(e) => {
                warn!(platform, provider = provider_name, error = %e, "Blacklist lookup failed");
                return (false, None);
            }
        };

        let now = self.clock.now();
        match record.and_then(|r| r.blacklisted_at_time(now)) {
            Some(until) => (true, Some(until)),
            None => (false, None),
        }
    }

    pub fn manual_unblock(&self, platform: &str, provider_name: &str) -> Result<()> {
        if !self.store.clear_blacklist(platform, provider_name)? {
            return Err(HealthError::NotFound(format!(
                "provider {}/{} has no blacklist record",
                platform, provider_name
            )));
        }
        info!(platform, provider = provider_name, "Provider manually unblocked");
        Ok(())
    }

    /// Flag every expired, not yet recovered window as auto-recovered and
    /// return how many rows changed. Safe to run repeatedly.
    pub fn auto_recover_expired(&self) -> Result<usize> {
        let pending = self.store.pending_recovery()?;
        let now = self.clock.now();

        let mut recovered = Vec::new();
        for record in pending {
            match record.blacklisted_until {
                Some(until) if until <= now => {}
                _ => continue,
            }

            if let Err(e) = self
                .store
                .mark_recovered(&record.platform, &record.provider_name)
            {
                warn!(
                    platform = %record.platform,
                    provider = %record.provider_name,
                    error = %e,
                    "Failed to mark provider recovered"
                );
                continue;
            }
            recovered.push(format!("{}/{}", record.platform, record.provider_name));
        }

        if !recovered.is_empty() {
            info!(
                count = recovered.len(),
                providers = ?recovered,
                "Auto-recovered expired blacklist entries"
            );
        }
        Ok(recovered.len())
    }

    pub fn blacklist_status(&self, platform: &str) -> Result<Vec<BlacklistStatus>> {
        let records = self.store.list_by_platform(platform)?;
        let now = self.clock.now();
        Ok(records
            .into_iter()
            .map(|record| BlacklistStatus::from_record(record, now))
            .collect())
    }
}
