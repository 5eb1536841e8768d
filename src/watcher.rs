use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::extractor::PROVIDER_CONFIG_FILES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    ProviderConfigChanged { path: PathBuf },
}

fn is_provider_config(path: &Path, config_dir: &Path) -> bool {
    path.parent() == Some(config_dir)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| PROVIDER_CONFIG_FILES.contains(&name))
}

pub fn classify_event(event: &Event, config_dir: &Path) -> Option<WatchEvent> {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) => event
            .paths
            .iter()
            .find(|path| is_provider_config(path, config_dir))
            .map(|path| WatchEvent::ProviderConfigChanged { path: path.clone() }),
        _ => None,
    }
}

/// Watch `config_dir` (non-recursively) and forward changes to provider
/// config files on `tx`.
pub fn create_watcher(
    tx: mpsc::Sender<WatchEvent>,
    config_dir: PathBuf,
) -> Result<RecommendedWatcher, notify::Error> {
    let dir = config_dir.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        if let Ok(event) = res {
            if let Some(watch_event) = classify_event(&event, &dir) {
                let _ = tx.send(watch_event);
            }
        }
    })?;
    watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
