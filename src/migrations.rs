use crate::db::DbPool;
use crate::error::Result;

pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            name: "001_provider_blacklist",
            sql: "CREATE TABLE IF NOT EXISTS provider_blacklist (
                      id INTEGER PRIMARY KEY AUTOINCREMENT,
                      platform TEXT NOT NULL,
                      provider_name TEXT NOT NULL,
                      failure_count INTEGER NOT NULL DEFAULT 0,
                      last_failure_at INTEGER,
                      blacklisted_at INTEGER,
                      blacklisted_until INTEGER,
                      auto_recovered INTEGER NOT NULL DEFAULT 0,
                      UNIQUE(platform, provider_name)
                  );",
        },
        Migration {
            name: "002_provider_blacklist_indexes",
            sql: "CREATE INDEX IF NOT EXISTS idx_provider_blacklist_platform
                      ON provider_blacklist(platform, last_failure_at);
                  CREATE INDEX IF NOT EXISTS idx_provider_blacklist_pending
                      ON provider_blacklist(auto_recovered, blacklisted_until);",
        },
    ]
}

pub fn run_pending(pool: &DbPool) -> Result<Vec<String>> {
    let conn = pool.get()?;
    let applied_set: std::collections::HashSet<String> = conn
        .prepare("SELECT name FROM migrations ORDER BY id")?
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(|r| r.ok())
        .collect();

    let mut newly_applied = Vec::new();

    for migration in all_migrations() {
        if !applied_set.contains(migration.name) {
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO migrations (name) VALUES (?1)",
                [migration.name],
            )?;
            newly_applied.push(migration.name.to_string());
        }
    }

    Ok(newly_applied)
}

pub fn applied(pool: &DbPool) -> Result<Vec<String>> {
    let conn = pool.get()?;
    let names: Vec<String> = conn
        .prepare("SELECT name FROM migrations ORDER BY id")?
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(names)
}
