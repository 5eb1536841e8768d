//! Concurrent endpoint latency probing.
//!
//! Every URL gets its own task: one warm-up GET whose outcome is discarded,
//! then a timed GET. Results come back in input order and are written through
//! to the endpoint registry once all probes are done, keyed by the URL string
//! exactly as the caller passed it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use tracing::{debug, warn};

use crate::error::{HealthError, Result};
use crate::registry::EndpointRegistry;
use crate::types::endpoint::EndpointLatency;

pub const DEFAULT_TIMEOUT_SECS: u64 = 8;
pub const MIN_TIMEOUT_SECS: u64 = 2;
pub const MAX_TIMEOUT_SECS: u64 = 30;
pub const MAX_REDIRECTS: usize = 5;
pub const USER_AGENT: &str = "relaywatch-speedtest/1.0";

/// Clamp a caller-supplied timeout to `[2, 30]` seconds, 8 when absent.
pub fn sanitize_timeout(timeout_secs: Option<i64>) -> u64 {
    match timeout_secs {
        None => DEFAULT_TIMEOUT_SECS,
        Some(secs) => secs.clamp(MIN_TIMEOUT_SECS as i64, MAX_TIMEOUT_SECS as i64) as u64,
    }
}

pub fn build_client(timeout_secs: u64) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .user_agent(USER_AGENT)
        .build()
}

fn format_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_string()
    } else if err.is_redirect() {
        "too many redirects".to_string()
    } else {
        format!("request failed: {}", err)
    }
}

async fn probe_endpoint(client: &reqwest::Client, raw_url: &str) -> EndpointLatency {
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        return EndpointLatency::failure(raw_url, "URL must not be empty");
    }

    let parsed = match url::Url::parse(trimmed) {
        Ok(parsed) => parsed,
        Err(e) => return EndpointLatency::failure(trimmed, format!("invalid URL: {}", e)),
    };

    // Warm-up: pay DNS/TCP/TLS setup once. Draining the body lets the
    // connection go back to the pool for the timed request.
    if let Ok(response) = client.get(parsed.clone()).send().await {
        let _ = response.bytes().await;
    }

    let start = Instant::now();
    match client.get(parsed).send().await {
        Ok(response) => {
            let latency = start.elapsed().as_millis() as u64;
            EndpointLatency::success(trimmed, latency, response.status().as_u16())
        }
        Err(e) => EndpointLatency::failure(trimmed, format_error(&e)),
    }
}

pub struct LatencyProber {
    registry: Arc<EndpointRegistry>,
}

impl LatencyProber {
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// Probe all `urls` in parallel and return one result per input, in input
    /// order. Every result is recorded in the registry; registry failures are
    /// logged and never change the returned results.
    pub async fn test_endpoints(
        &self,
        urls: &[String],
        timeout_secs: Option<i64>,
    ) -> Vec<EndpointLatency> {
        if urls.is_empty() {
            return Vec::new();
        }

        let timeout = sanitize_timeout(timeout_secs);
        let results = match build_client(timeout) {
            Ok(client) => probe_all(client, urls).await,
            Err(e) => {
                warn!(error = %e, "Failed to build HTTP client for latency probes");
                urls.iter()
                    .map(|url| {
                        EndpointLatency::failure(url.trim(), format!("request failed: {}", e))
                    })
                    .collect()
            }
        };

        self.write_through(urls, &results).await;
        results
    }

    /// Probe every endpoint currently in the registry.
    pub async fn test_registered_endpoints(
        &self,
        timeout_secs: Option<i64>,
    ) -> Result<Vec<EndpointLatency>> {
        let registry = self.registry.clone();
        let urls = match tokio::task::spawn_blocking(move || registry.urls()).await {
            Ok(urls) => urls?,
            Err(e) => {
                return Err(HealthError::Persistence(format!(
                    "endpoint registry read task failed: {}",
                    e
                )))
            }
        };
        Ok(self.test_endpoints(&urls, timeout_secs).await)
    }

    /// Results carry the trimmed URL; the registry is updated under the
    /// original input so stored entries always match.
    async fn write_through(&self, urls: &[String], results: &[EndpointLatency]) {
        let updates: Vec<(String, Option<u64>)> = urls
            .iter()
            .zip(results)
            .map(|(url, r)| (url.clone(), if r.is_success() { r.latency } else { None }))
            .collect();
        let registry = self.registry.clone();

        let written = tokio::task::spawn_blocking(move || {
            for (url, latency) in updates {
                if let Err(e) = registry.update_endpoint_test_result(&url, latency) {
                    warn!(url = %url, error = %e, "Failed to record endpoint test result");
                }
            }
        })
        .await;

        if let Err(e) = written {
            warn!(error = %e, "Endpoint registry write-through task failed");
        }
    }
}

async fn probe_all(client: reqwest::Client, urls: &[String]) -> Vec<EndpointLatency> {
    let handles: Vec<_> = urls
        .iter()
        .map(|url| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move { probe_endpoint(&client, &url).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (url, handle) in urls.iter().zip(handles) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => EndpointLatency::failure(url.trim(), format!("probe task failed: {}", e)),
        };
        debug!(
            url = %result.url,
            latency = ?result.latency,
            status = ?result.status,
            error = ?result.error,
            "Endpoint probed"
        );
        results.push(result);
    }
    results
}
