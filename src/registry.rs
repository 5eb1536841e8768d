//! Persisted list of endpoint URLs with their latest probe result.
//!
//! The registry is one JSON file rewritten as a whole on every change. All
//! reads and writes go through the `EndpointRegistry` mutex, so concurrent
//! callers never interleave their load-mutate-save cycles, and every save
//! replaces the file atomically through a temporary sibling.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{HealthError, Result};
use crate::extractor::ConfigExtractor;
use crate::types::endpoint::EndpointRecord;

pub const ENDPOINTS_FILE_NAME: &str = "speedtest-endpoints.json";

pub const DEFAULT_ENDPOINTS: [&str; 2] = ["https://api.anthropic.com", "https://api.openai.com"];

pub fn default_records() -> Vec<EndpointRecord> {
    DEFAULT_ENDPOINTS
        .iter()
        .map(|url| EndpointRecord::untested(url))
        .collect()
}

/// Reject empty, padded and unparseable URLs before touching the file.
/// `Url::parse` tolerates surrounding whitespace, so padding is checked first.
pub fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(HealthError::Validation("URL must not be empty".to_string()));
    }
    if url != url.trim() {
        return Err(HealthError::Validation(format!(
            "URL must not have surrounding whitespace: {:?}",
            url
        )));
    }
    url::Url::parse(url)
        .map_err(|e| HealthError::Validation(format!("invalid URL: {}", e)))?;
    Ok(())
}

pub struct EndpointRegistry {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl EndpointRegistry {
    pub fn new(path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            path,
            clock,
            lock: Mutex::new(()),
        }
    }

    /// Registry stored under the shared per-user data directory.
    pub fn in_data_dir(data_dir: &Path, clock: Arc<dyn Clock>) -> Self {
        Self::new(data_dir.join(ENDPOINTS_FILE_NAME), clock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded state is the file itself, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current records. A missing or unreadable file is replaced by the
    /// default endpoint set.
    pub fn load(&self) -> Result<Vec<EndpointRecord>> {
        let _guard = self.guard();
        self.load_unlocked()
    }

    pub fn save(&self, records: &[EndpointRecord]) -> Result<()> {
        let _guard = self.guard();
        self.save_unlocked(records)
    }

    fn load_unlocked(&self) -> Result<Vec<EndpointRecord>> {
        let parsed = match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str::<Vec<EndpointRecord>>(&content).map_err(|e| {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Endpoint registry is corrupt, restoring defaults"
                );
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Endpoint registry missing, creating defaults");
                Err(())
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Endpoint registry unreadable, restoring defaults"
                );
                Err(())
            }
        };

        match parsed {
            Ok(records) => Ok(records),
            Err(()) => {
                let defaults = default_records();
                self.save_unlocked(&defaults).map_err(|e| {
                    HealthError::Persistence(format!(
                        "failed to create default endpoint registry: {}",
                        e
                    ))
                })?;
                Ok(defaults)
            }
        }
    }

    fn save_unlocked(&self, records: &[EndpointRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(records)?;
        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<EndpointRecord>) -> Result<T>) -> Result<T> {
        let _guard = self.guard();
        let mut records = self.load_unlocked()?;
        let value = f(&mut records)?;
        self.save_unlocked(&records)?;
        Ok(value)
    }

    pub fn add_endpoint(&self, url: &str) -> Result<()> {
        validate_url(url)?;
        self.mutate(|records| {
            if records.iter().any(|r| r.url == url) {
                return Err(HealthError::Validation(format!("endpoint already exists: {}", url)));
            }
            records.push(EndpointRecord::untested(url));
            Ok(())
        })?;
        info!(url, "Endpoint added");
        Ok(())
    }

    pub fn remove_endpoint(&self, url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(HealthError::Validation("URL must not be empty".to_string()));
        }
        self.mutate(|records| {
            let before = records.len();
            records.retain(|r| r.url != url);
            if records.len() == before {
                return Err(HealthError::NotFound(format!("endpoint does not exist: {}", url)));
            }
            Ok(())
        })?;
        info!(url, "Endpoint removed");
        Ok(())
    }

    /// Record a probe: stamps the test time and stores `latency`, where `None`
    /// marks a failed probe.
    pub fn update_endpoint_test_result(&self, url: &str, latency: Option<u64>) -> Result<()> {
        if url.is_empty() {
            return Err(HealthError::Validation("URL must not be empty".to_string()));
        }
        let now = self.clock.now();
        self.mutate(|records| {
            let record = records
                .iter_mut()
                .find(|r| r.url == url)
                .ok_or_else(|| HealthError::NotFound(format!("endpoint does not exist: {}", url)))?;
            record.last_test_time = Some(now);
            record.last_test_speed = latency;
            Ok(())
        })
    }

    /// Append every URL not yet present, keeping existing entries and their
    /// history untouched. Returns how many were added.
    pub fn merge_urls(&self, urls: &[String]) -> Result<usize> {
        self.mutate(|records| {
            let mut known: HashSet<String> = records.iter().map(|r| r.url.clone()).collect();
            let mut added = 0;
            for url in urls {
                if known.insert(url.clone()) {
                    records.push(EndpointRecord::untested(url));
                    added += 1;
                }
            }
            Ok(added)
        })
    }

    pub fn refresh_from_configs(
        &self,
        extractor: &ConfigExtractor,
        relay_addr: Option<&str>,
    ) -> Result<usize> {
        let urls = extractor.extract_endpoints(relay_addr);
        let added = self.merge_urls(&urls)?;
        if added > 0 {
            info!(
                added,
                discovered = urls.len(),
                "Endpoint registry refreshed from provider configs"
            );
        }
        Ok(added)
    }

    /// Read path for the UI: refresh from configs on a best-effort basis,
    /// then return the registry.
    pub fn records_with_refresh(
        &self,
        extractor: &ConfigExtractor,
        relay_addr: Option<&str>,
    ) -> Result<Vec<EndpointRecord>> {
        if let Err(e) = self.refresh_from_configs(extractor, relay_addr) {
            warn!(error = %e, "Failed to refresh endpoints from provider configs");
        }
        self.load()
    }

    pub fn urls(&self) -> Result<Vec<String>> {
        Ok(self.load()?.into_iter().map(|r| r.url).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const NOW: i64 = 1_700_000_000;

    fn registry(dir: &tempfile::TempDir) -> EndpointRegistry {
        EndpointRegistry::in_data_dir(dir.path(), Arc::new(ManualClock::new(NOW)))
    }

    fn read_file(registry: &EndpointRegistry) -> Vec<EndpointRecord> {
        let content = fs::read_to_string(registry.path()).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn load_bootstraps_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EndpointRegistry::new(
            dir.path().join("nested").join(ENDPOINTS_FILE_NAME),
            Arc::new(ManualClock::new(NOW)),
        );
        let records = registry.load().unwrap();
        assert_eq!(records, default_records());
        assert_eq!(read_file(&registry), default_records());
    }

    #[test]
    fn load_restores_defaults_when_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        fs::write(registry.path(), "{ not json").unwrap();
        assert_eq!(registry.load().unwrap(), default_records());
        assert_eq!(read_file(&registry), default_records());
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        registry.save(&[EndpointRecord::untested("https://x")]).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![ENDPOINTS_FILE_NAME.to_string()]);
    }

    #[test]
    fn add_then_remove_restores_content() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let before = registry.load().unwrap();

        registry.add_endpoint("https://relay.example.com/v1").unwrap();
        let added = registry.load().unwrap();
        assert_eq!(added.len(), before.len() + 1);
        assert_eq!(added.last().unwrap().url, "https://relay.example.com/v1");

        registry.remove_endpoint("https://relay.example.com/v1").unwrap();
        assert_eq!(registry.load().unwrap(), before);
    }

    #[test]
    fn add_rejects_duplicates_without_change() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        registry.add_endpoint("https://relay.example.com").unwrap();
        let before = registry.load().unwrap();

        let err = registry.add_endpoint("https://relay.example.com").unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("already exists"));
        assert_eq!(registry.load().unwrap(), before);
    }

    #[test]
    fn add_rejects_invalid_urls() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        assert!(registry.add_endpoint("").unwrap_err().is_validation());
        assert!(registry.add_endpoint("not a url").unwrap_err().is_validation());
        assert_eq!(registry.load().unwrap(), default_records());
    }

    #[test]
    fn add_rejects_padded_urls() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        for padded in [" http://127.0.0.1:1/ ", "http://127.0.0.1:1/\n", "\thttps://relay"] {
            let err = registry.add_endpoint(padded).unwrap_err();
            assert!(err.is_validation());
            assert!(err.to_string().contains("whitespace"));
        }
        assert_eq!(registry.load().unwrap(), default_records());
    }

    #[test]
    fn remove_errors() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        assert!(registry.remove_endpoint("").unwrap_err().is_validation());
        assert!(registry
            .remove_endpoint("https://unknown")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn update_sets_time_and_speed() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        registry
            .update_endpoint_test_result("https://api.anthropic.com", Some(87))
            .unwrap();
        let records = registry.load().unwrap();
        assert_eq!(records[0].last_test_time, Some(NOW));
        assert_eq!(records[0].last_test_speed, Some(87));

        registry
            .update_endpoint_test_result("https://api.anthropic.com", None)
            .unwrap();
        let records = registry.load().unwrap();
        assert_eq!(records[0].last_test_time, Some(NOW));
        assert_eq!(records[0].last_test_speed, None);
    }

    #[test]
    fn update_unknown_url_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let err = registry
            .update_endpoint_test_result("https://unknown", Some(1))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn merge_keeps_history_and_appends_new() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let existing = EndpointRecord {
            url: "https://b".to_string(),
            last_test_time: Some(1_600_000_000),
            last_test_speed: Some(250),
        };
        registry.save(&[existing.clone()]).unwrap();

        let urls = vec!["https://a".to_string(), "https://b".to_string()];
        assert_eq!(registry.merge_urls(&urls).unwrap(), 1);
        assert_eq!(
            registry.load().unwrap(),
            vec![existing.clone(), EndpointRecord::untested("https://a")]
        );

        assert_eq!(registry.merge_urls(&urls).unwrap(), 0);
        assert_eq!(registry.load().unwrap().len(), 2);
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry(&dir));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry
                        .add_endpoint(&format!("https://relay-{}.example.com", i))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.load().unwrap().len(), DEFAULT_ENDPOINTS.len() + 8);
    }
}
