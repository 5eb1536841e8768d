use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::{HealthError, Result};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_BLACKLIST_MINUTES: u32 = 30;

const THRESHOLD_KEY: &str = "blacklistFailureThreshold";
const DURATION_KEY: &str = "blacklistDurationMinutes";

/// Read the main application config document. Returns `{}` when unset.
pub fn config_get_db(pool: &DbPool) -> Result<String> {
    let conn = pool.get()?;
    let result: Option<String> = match conn.query_row(
        "SELECT value FROM config WHERE key = 'main'",
        [],
        |row| row.get(0),
    ) {
        Ok(json) => Some(json),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e.into()),
    };
    Ok(result.unwrap_or_else(|| "{}".to_string()))
}

pub fn config_set_db(pool: &DbPool, json: &str) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO config (key, value) VALUES ('main', ?1)
         ON CONFLICT(key) DO UPDATE SET value = ?1, updated_at = datetime('now')",
        [json],
    )?;
    Ok(())
}

/// Deep-merge `patch_json` into the stored document and return the result.
pub fn config_update_db(pool: &DbPool, patch_json: &str) -> Result<String> {
    let current = config_get_db(pool)?;
    let mut current_val: serde_json::Value = serde_json::from_str(&current)?;
    let patch_val: serde_json::Value = serde_json::from_str(patch_json)
        .map_err(|e| HealthError::Validation(format!("invalid config patch: {}", e)))?;

    merge_json(&mut current_val, &patch_val);
    let merged = serde_json::to_string(&current_val)?;
    config_set_db(pool, &merged)?;
    Ok(merged)
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (serde_json::Value::Object(base_map), serde_json::Value::Object(patch_map)) =
        (base, patch)
    {
        for (key, value) in patch_map {
            match base_map.get_mut(key) {
                Some(existing) if value.is_object() && existing.is_object() => {
                    merge_json(existing, value);
                }
                _ => {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistSettings {
    pub failure_threshold: u32,
    pub duration_minutes: u32,
}

impl Default for BlacklistSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            duration_minutes: DEFAULT_BLACKLIST_MINUTES,
        }
    }
}

/// Supplies the blacklist threshold and cooldown on every failure report.
pub trait SettingsProvider: Send + Sync {
    fn blacklist_settings(&self) -> Result<BlacklistSettings>;
}

impl SettingsProvider for BlacklistSettings {
    fn blacklist_settings(&self) -> Result<BlacklistSettings> {
        Ok(*self)
    }
}

/// Settings backed by the `config` table.
pub struct DbSettings {
    pool: DbPool,
}

impl DbSettings {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn set_blacklist_settings(&self, settings: BlacklistSettings) -> Result<()> {
        if settings.failure_threshold == 0 || settings.duration_minutes == 0 {
            return Err(HealthError::Validation(
                "blacklist threshold and duration must be positive".to_string(),
            ));
        }
        let patch = serde_json::json!({
            THRESHOLD_KEY: settings.failure_threshold,
            DURATION_KEY: settings.duration_minutes,
        });
        config_update_db(&self.pool, &patch.to_string())?;
        Ok(())
    }
}

impl SettingsProvider for DbSettings {
    fn blacklist_settings(&self) -> Result<BlacklistSettings> {
        let raw = config_get_db(&self.pool)?;
        let doc: serde_json::Value = serde_json::from_str(&raw)?;
        Ok(BlacklistSettings {
            failure_threshold: positive_field(&doc, THRESHOLD_KEY, DEFAULT_FAILURE_THRESHOLD)?,
            duration_minutes: positive_field(&doc, DURATION_KEY, DEFAULT_BLACKLIST_MINUTES)?,
        })
    }
}

fn positive_field(doc: &serde_json::Value, key: &str, default: u32) -> Result<u32> {
    match doc.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .filter(|v| *v > 0 && *v <= u32::MAX as u64)
            .map(|v| v as u32)
            .ok_or_else(|| {
                HealthError::Validation(format!(
                    "{} must be a positive integer, got {}",
                    key, value
                ))
            }),
    }
}

/// Process-level settings read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub relay_addr: Option<String>,
    pub sweep_interval: Duration,
    /// `None` disables the periodic probe loop.
    pub probe_interval: Option<Duration>,
    pub probe_timeout_secs: Option<i64>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secs = |key: &str| non_empty(key).and_then(|v| v.parse::<u64>().ok());

        Self {
            data_dir: non_empty("RELAYWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(crate::db::relaywatch_data_dir),
            relay_addr: non_empty("RELAYWATCH_RELAY_ADDR"),
            sweep_interval: Duration::from_secs(
                secs("RELAYWATCH_SWEEP_INTERVAL_SECS").unwrap_or(60).max(1),
            ),
            probe_interval: secs("RELAYWATCH_PROBE_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            probe_timeout_secs: non_empty("RELAYWATCH_PROBE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok()),
        }
    }
}
