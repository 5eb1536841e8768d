pub mod blacklist;
pub mod clock;
pub mod db;
pub mod error;
pub mod extractor;
pub mod failure_store;
pub mod migrations;
pub mod prober;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod types;
pub mod watcher;

use std::path::Path;
use std::sync::{mpsc, Arc};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::blacklist::BlacklistTracker;
use crate::clock::{Clock, SystemClock};
use crate::db::DbPool;
use crate::extractor::ConfigExtractor;
use crate::failure_store::SqliteFailureStore;
use crate::prober::LatencyProber;
use crate::registry::EndpointRegistry;
use crate::settings::{DbSettings, RuntimeConfig};

/// Initialize structured logging with tracing.
/// Respects RUST_LOG env var; defaults to `info` level for the relaywatch crate.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relaywatch=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Everything the host application talks to, wired against one data directory.
pub struct HealthServices {
    pub pool: DbPool,
    pub settings: Arc<DbSettings>,
    pub tracker: Arc<BlacklistTracker>,
    pub registry: Arc<EndpointRegistry>,
    pub extractor: Arc<ConfigExtractor>,
    pub prober: Arc<LatencyProber>,
}

impl HealthServices {
    pub fn bootstrap(data_dir: &Path) -> error::Result<Self> {
        Self::bootstrap_with_clock(data_dir, Arc::new(SystemClock))
    }

    pub fn bootstrap_with_clock(data_dir: &Path, clock: Arc<dyn Clock>) -> error::Result<Self> {
        let pool = db::open(&db::db_path(data_dir))?;
        let settings = Arc::new(DbSettings::new(pool.clone()));
        let tracker = Arc::new(BlacklistTracker::new(
            Arc::new(SqliteFailureStore::new(pool.clone())),
            settings.clone(),
            clock.clone(),
        ));
        let registry = Arc::new(EndpointRegistry::in_data_dir(data_dir, clock));
        let extractor = Arc::new(ConfigExtractor::from_config_dir(data_dir));
        let prober = Arc::new(LatencyProber::new(registry.clone()));

        Ok(Self {
            pool,
            settings,
            tracker,
            registry,
            extractor,
            prober,
        })
    }

    pub fn refresh_endpoints(&self, relay_addr: Option<&str>) -> error::Result<usize> {
        self.registry.refresh_from_configs(&self.extractor, relay_addr)
    }
}

/// Refresh the registry whenever a provider config file in `data_dir` changes.
/// The returned watcher must be kept alive for events to flow.
fn start_config_watcher(
    services: &HealthServices,
    data_dir: &Path,
    relay_addr: Option<String>,
) -> Option<notify::RecommendedWatcher> {
    let config_dir = data_dir
        .canonicalize()
        .unwrap_or_else(|_| data_dir.to_path_buf());
    let (tx, rx) = mpsc::channel();
    let watcher = match watcher::create_watcher(tx, config_dir) {
        Ok(watcher) => watcher,
        Err(e) => {
            warn!(error = %e, "Provider config watcher unavailable");
            return None;
        }
    };

    let registry = services.registry.clone();
    let extractor = services.extractor.clone();
    std::thread::spawn(move || {
        for event in rx {
            let watcher::WatchEvent::ProviderConfigChanged { path } = event;
            info!(path = %path.display(), "Provider config changed");
            if let Err(e) = registry.refresh_from_configs(&extractor, relay_addr.as_deref()) {
                warn!(error = %e, "Failed to refresh endpoints after config change");
            }
        }
    });

    Some(watcher)
}

async fn serve(services: HealthServices, config: RuntimeConfig) {
    if let Err(e) = services.refresh_endpoints(config.relay_addr.as_deref()) {
        warn!(error = %e, "Initial endpoint refresh failed");
    }

    let mut tasks = vec![scheduler::spawn_recovery_sweep(
        services.tracker.clone(),
        config.sweep_interval,
    )];
    if let Some(interval) = config.probe_interval {
        tasks.push(scheduler::spawn_probe_loop(
            services.prober.clone(),
            interval,
            config.probe_timeout_secs,
        ));
    }

    let _watcher = start_config_watcher(&services, &config.data_dir, config.relay_addr.clone());

    info!(data_dir = %config.data_dir.display(), "relaywatch running");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutting down");
    for task in tasks {
        task.abort();
    }
}

pub fn run() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = RuntimeConfig::from_env();
    let services = HealthServices::bootstrap(&config.data_dir)
        .expect("Failed to initialize provider health services");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");
    runtime.block_on(serve(services, config));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::fs;

    #[test]
    fn bootstrap_creates_database_and_registry() {
        let dir = tempfile::tempdir().unwrap();
        let services = HealthServices::bootstrap(dir.path()).unwrap();

        assert!(db::db_path(dir.path()).exists());
        assert_eq!(services.registry.load().unwrap(), registry::default_records());
        assert_eq!(
            migrations::applied(&services.pool).unwrap().len(),
            migrations::all_migrations().len()
        );
    }

    #[test]
    fn refresh_merges_config_urls_into_registry() {
        let dir = tempfile::tempdir().unwrap();
        let services =
            HealthServices::bootstrap_with_clock(dir.path(), Arc::new(ManualClock::new(100)))
                .unwrap();

        let existing = types::endpoint::EndpointRecord {
            url: "https://b".to_string(),
            last_test_time: Some(50),
            last_test_speed: Some(321),
        };
        services.registry.save(&[existing.clone()]).unwrap();
        fs::write(
            dir.path().join(extractor::CLAUDE_CONFIG_FILE),
            r#"{"providers": [{"name": "a", "apiUrl": "https://a", "enabled": true}]}"#,
        )
        .unwrap();

        assert_eq!(services.refresh_endpoints(Some(":18100")).unwrap(), 1);
        let records = services.registry.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], existing);
        assert_eq!(records[1].url, "https://a");
        assert_eq!(records[1].last_test_time, None);

        assert_eq!(services.refresh_endpoints(Some(":18100")).unwrap(), 0);
        assert_eq!(services.registry.load().unwrap(), records);
    }

    #[test]
    fn records_with_refresh_adds_relay_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let services = HealthServices::bootstrap(dir.path()).unwrap();
        let records = services
            .registry
            .records_with_refresh(&services.extractor, Some(":18100"))
            .unwrap();
        assert_eq!(records.len(), registry::DEFAULT_ENDPOINTS.len() + 1);
        assert_eq!(records.last().unwrap().url, "http://127.0.0.1:18100");
    }

    #[test]
    fn tracker_uses_stored_settings() {
        let dir = tempfile::tempdir().unwrap();
        let services = HealthServices::bootstrap(dir.path()).unwrap();
        services
            .settings
            .set_blacklist_settings(settings::BlacklistSettings {
                failure_threshold: 2,
                duration_minutes: 1,
            })
            .unwrap();

        services.tracker.record_failure("gemini", "relay").unwrap();
        assert!(!services.tracker.is_blacklisted("gemini", "relay").0);
        services.tracker.record_failure("gemini", "relay").unwrap();
        assert!(services.tracker.is_blacklisted("gemini", "relay").0);
    }
}
