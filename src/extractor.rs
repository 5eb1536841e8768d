//! Candidate endpoint discovery from the provider config files.
//!
//! Each config format gets its own `ProviderSource` adapter that reduces it to
//! `(url, enabled)` pairs; `ConfigExtractor` only merges those pairs.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Result;
use crate::types::provider::{GeminiProviderEntry, ProviderEnvelope};

pub const CLAUDE_CONFIG_FILE: &str = "claude-code.json";
pub const CODEX_CONFIG_FILE: &str = "codex.json";
pub const GEMINI_CONFIG_FILE: &str = "gemini-providers.json";

pub const PROVIDER_CONFIG_FILES: [&str; 3] =
    [CLAUDE_CONFIG_FILE, CODEX_CONFIG_FILE, GEMINI_CONFIG_FILE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    pub url: String,
    pub enabled: bool,
}

pub trait ProviderSource: Send + Sync {
    fn name(&self) -> &str;
    fn candidates(&self) -> Result<Vec<EndpointCandidate>>;
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// `{ "providers": [{ "apiUrl": .., "enabled": .. }] }` (Claude Code, Codex).
pub struct ProviderListSource {
    name: String,
    path: PathBuf,
}

impl ProviderListSource {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
        }
    }
}

impl ProviderSource for ProviderListSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self) -> Result<Vec<EndpointCandidate>> {
        let envelope: ProviderEnvelope = read_json(&self.path)?;
        Ok(envelope
            .providers
            .into_iter()
            .map(|p| EndpointCandidate {
                url: p.api_url,
                enabled: p.enabled,
            })
            .collect())
    }
}

/// `[{ "baseUrl": .., "enabled": .. }]` (Gemini).
pub struct GeminiProviderSource {
    path: PathBuf,
}

impl GeminiProviderSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ProviderSource for GeminiProviderSource {
    fn name(&self) -> &str {
        "gemini"
    }

    fn candidates(&self) -> Result<Vec<EndpointCandidate>> {
        let entries: Vec<GeminiProviderEntry> = read_json(&self.path)?;
        Ok(entries
            .into_iter()
            .map(|p| EndpointCandidate {
                url: p.base_url,
                enabled: p.enabled,
            })
            .collect())
    }
}

pub struct ConfigExtractor {
    sources: Vec<Box<dyn ProviderSource>>,
}

impl ConfigExtractor {
    pub fn new(sources: Vec<Box<dyn ProviderSource>>) -> Self {
        Self { sources }
    }

    /// The three provider config files of the switcher's config directory.
    pub fn from_config_dir(config_dir: &Path) -> Self {
        Self::new(vec![
            Box::new(ProviderListSource::new(
                "claude",
                config_dir.join(CLAUDE_CONFIG_FILE),
            )),
            Box::new(ProviderListSource::new(
                "codex",
                config_dir.join(CODEX_CONFIG_FILE),
            )),
            Box::new(GeminiProviderSource::new(config_dir.join(GEMINI_CONFIG_FILE))),
        ])
    }

    /// URLs of all enabled providers, deduplicated in discovery order.
    /// Sources that cannot be read are skipped. When nothing is found, the
    /// relay address (if any) supplies a single fallback URL.
    pub fn extract_endpoints(&self, relay_addr: Option<&str>) -> Vec<String> {
        let mut urls = Vec::new();
        let mut seen = HashSet::new();

        for source in &self.sources {
            let candidates = match source.candidates() {
                Ok(candidates) => candidates,
                Err(e) => {
                    debug!(source = source.name(), error = %e, "Skipping provider config source");
                    continue;
                }
            };
            for candidate in candidates {
                if candidate.enabled
                    && !candidate.url.is_empty()
                    && seen.insert(candidate.url.clone())
                {
                    urls.push(candidate.url);
                }
            }
        }

        if urls.is_empty() {
            if let Some(fallback) = relay_addr.and_then(relay_base_url) {
                urls.push(fallback);
            }
        }

        urls
    }
}

/// Base URL of the local relay from its listen address: `:18100` becomes
/// `http://127.0.0.1:18100`, bare hosts get `http://`, full URLs pass through.
pub fn relay_base_url(addr: &str) -> Option<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return None;
    }
    if addr.starts_with("http://") || addr.starts_with("https://") {
        return Some(addr.to_string());
    }

    let host = if addr.starts_with(':') {
        format!("127.0.0.1{}", addr)
    } else {
        addr.to_string()
    };
    if host.contains("://") {
        Some(host)
    } else {
        Some(format!("http://{}", host))
    }
}
