use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Per-user directory shared with the rest of the switcher application.
pub fn relaywatch_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".code-switch")
}

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state").join("relaywatch.sqlite")
}

pub fn create_pool(db_path: &Path) -> Result<DbPool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Writers queue on the busy handler instead of failing with SQLITE_BUSY.
    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout=5000; PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    Ok(pool)
}

pub fn init_db(pool: &DbPool) -> Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    Ok(())
}

/// Open the pool, create the base tables and apply pending migrations.
pub fn open(db_path: &Path) -> Result<DbPool> {
    let pool = create_pool(db_path)?;
    init_db(&pool)?;
    let applied = crate::migrations::run_pending(&pool)?;
    if !applied.is_empty() {
        tracing::info!(migrations = ?applied, "Applied database migrations");
    }
    Ok(pool)
}

#[cfg(test)]
pub(crate) fn test_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = open(&dir.path().join("test.sqlite")).unwrap();
    (dir, pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_ends_with_code_switch() {
        let dir = relaywatch_data_dir();
        assert!(dir.ends_with(".code-switch"));
    }

    #[test]
    fn db_path_is_under_state() {
        let path = db_path(Path::new("/tmp/x"));
        assert_eq!(path, PathBuf::from("/tmp/x/state/relaywatch.sqlite"));
    }

    #[test]
    fn create_pool_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("deep").join("test.sqlite");
        let pool = create_pool(&db_path).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch("SELECT 1").unwrap();
    }

    #[test]
    fn init_db_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("test.sqlite")).unwrap();
        init_db(&pool).unwrap();

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"config".to_string()));
        assert!(tables.contains(&"migrations".to_string()));
    }

    #[test]
    fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        drop(open(&path).unwrap());
        let pool = open(&path).unwrap();
        let conn = pool.get().unwrap();
        conn.execute_batch("SELECT id FROM provider_blacklist LIMIT 0")
            .unwrap();
    }
}
