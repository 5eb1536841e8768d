use rusqlite::{OptionalExtension, Row, TransactionBehavior};
use tracing::warn;

use crate::db::DbPool;
use crate::error::Result;
use crate::types::blacklist::ProviderFailureRecord;

/// Row-per-provider storage behind the blacklist tracker.
///
/// `update_with` is atomic per `(platform, provider_name)`: concurrent calls
/// for the same key observe each other's writes, so failure increments are
/// never lost. Time values are opaque integers here; every comparison against
/// "now" happens in the caller.
pub trait FailureStore: Send + Sync {
    fn get(&self, platform: &str, provider_name: &str) -> Result<Option<ProviderFailureRecord>>;

    /// Read the current record (if any), hand it to `apply`, and persist the
    /// record it returns. Returning `None` leaves the store untouched.
    fn update_with(
        &self,
        platform: &str,
        provider_name: &str,
        apply: &mut dyn FnMut(Option<ProviderFailureRecord>) -> Option<ProviderFailureRecord>,
    ) -> Result<()>;

    /// Reset count and blacklist fields. Returns `false` when no row matched.
    fn clear_blacklist(&self, platform: &str, provider_name: &str) -> Result<bool>;

    /// Rows with a blacklist window that the recovery sweep has not handled yet.
    fn pending_recovery(&self) -> Result<Vec<ProviderFailureRecord>>;

    /// Flag a row as auto-recovered and reset its count, keeping the window as history.
    fn mark_recovered(&self, platform: &str, provider_name: &str) -> Result<()>;

    /// All rows of a platform, most recent failure first.
    fn list_by_platform(&self, platform: &str) -> Result<Vec<ProviderFailureRecord>>;
}

const SELECT_COLUMNS: &str = "platform, provider_name, failure_count, last_failure_at, \
     blacklisted_at, blacklisted_until, auto_recovered";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ProviderFailureRecord> {
    Ok(ProviderFailureRecord {
        platform: row.get(0)?,
        provider_name: row.get(1)?,
        failure_count: row.get(2)?,
        last_failure_at: row.get(3)?,
        blacklisted_at: row.get(4)?,
        blacklisted_until: row.get(5)?,
        auto_recovered: row.get(6)?,
    })
}

/// `FailureStore` over the `provider_blacklist` table.
///
/// Read-modify-write runs in a `BEGIN IMMEDIATE` transaction, which takes the
/// database write lock up front and serializes writers across pooled
/// connections.
#[derive(Clone)]
pub struct SqliteFailureStore {
    pool: DbPool,
}

impl SqliteFailureStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl FailureStore for SqliteFailureStore {
    fn get(&self, platform: &str, provider_name: &str) -> Result<Option<ProviderFailureRecord>> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM provider_blacklist WHERE platform = ?1 AND provider_name = ?2",
                    SELECT_COLUMNS
                ),
                [platform, provider_name],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn update_with(
        &self,
        platform: &str,
        provider_name: &str,
        apply: &mut dyn FnMut(Option<ProviderFailureRecord>) -> Option<ProviderFailureRecord>,
    ) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                &format!(
                    "SELECT {} FROM provider_blacklist WHERE platform = ?1 AND provider_name = ?2",
                    SELECT_COLUMNS
                ),
                [platform, provider_name],
                record_from_row,
            )
            .optional()?;

        if let Some(next) = apply(current) {
            tx.execute(
                "INSERT INTO provider_blacklist
                    (platform, provider_name, failure_count, last_failure_at,
                     blacklisted_at, blacklisted_until, auto_recovered)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(platform, provider_name) DO UPDATE SET
                    failure_count = ?3, last_failure_at = ?4, blacklisted_at = ?5,
                    blacklisted_until = ?6, auto_recovered = ?7",
                rusqlite::params![
                    platform,
                    provider_name,
                    next.failure_count,
                    next.last_failure_at,
                    next.blacklisted_at,
                    next.blacklisted_until,
                    next.auto_recovered,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn clear_blacklist(&self, platform: &str, provider_name: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE provider_blacklist
             SET blacklisted_at = NULL, blacklisted_until = NULL,
                 failure_count = 0, auto_recovered = 0
             WHERE platform = ?1 AND provider_name = ?2",
            [platform, provider_name],
        )?;
        Ok(changed > 0)
    }

    fn pending_recovery(&self) -> Result<Vec<ProviderFailureRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM provider_blacklist
             WHERE blacklisted_until IS NOT NULL AND auto_recovered = 0",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Skipping unreadable provider_blacklist row"),
            }
        }
        Ok(records)
    }

    fn mark_recovered(&self, platform: &str, provider_name: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE provider_blacklist SET auto_recovered = 1, failure_count = 0
             WHERE platform = ?1 AND provider_name = ?2",
            [platform, provider_name],
        )?;
        Ok(())
    }

    fn list_by_platform(&self, platform: &str) -> Result<Vec<ProviderFailureRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM provider_blacklist WHERE platform = ?1
             ORDER BY last_failure_at DESC, provider_name",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([platform], record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            match row {
                Ok(record) => records.push(record),
                Err(e) => warn!(platform, error = %e, "Skipping unreadable provider_blacklist row"),
            }
        }
        Ok(records)
    }
}
