//! Install and activate phases of the offline cache.
//!
//! Install fetches the whole manifest before touching the store, so a
//! failed fetch leaves every stored generation exactly as it was. Activate
//! promotes the newest stored generation and purges the rest.

use std::sync::Arc;

use door_core::cache::{ActivateReport, CacheDb, CacheEntry, Generation, GenerationInfo};
use door_core::config::CacheConfig;
use door_core::{DoorError, Result};
use futures::future::try_join_all;
use reqwest::Url;

// ---------------------------------------------------------------------------
// Manifest resolution
// ---------------------------------------------------------------------------

/// Resolve manifest entries against `base`. Absolute entries are kept.
pub fn resolve_manifest(base: &Url, manifest: &[String]) -> Result<Vec<Url>> {
    manifest
        .iter()
        .map(|entry| {
            base.join(entry).map_err(|e| {
                DoorError::InvalidConfig(format!("manifest entry '{entry}': {e}"))
            })
        })
        .collect()
}

pub fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url)
        .map_err(|e| DoorError::InvalidConfig(format!("server.base_url '{base_url}': {e}")))
}

// ---------------------------------------------------------------------------
// Install
// ---------------------------------------------------------------------------

async fn fetch_entry(client: &reqwest::Client, url: Url) -> Result<CacheEntry> {
    let failed = |reason: String| DoorError::InstallFailed {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("HTTP {status}")));
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let payload = response
        .bytes()
        .await
        .map_err(|e| failed(e.to_string()))?;

    Ok(CacheEntry {
        request_key: url.to_string(),
        content_type,
        payload: payload.to_vec(),
    })
}

/// Fetch every manifest asset and store them as `config.generation`.
///
/// Any failed fetch aborts the install before anything is written. The new
/// generation is not served until [`activate`] runs.
pub async fn install(
    cache: &Arc<CacheDb>,
    client: &reqwest::Client,
    base: &Url,
    config: &CacheConfig,
) -> Result<GenerationInfo> {
    let generation = Generation(config.generation);
    let tag = generation.tag(&config.name);

    let active = blocking(cache, |db| db.active()).await?;
    if let Some(active) = active {
        if generation < active {
            return Err(DoorError::StaleGeneration {
                requested: generation.0,
                active: active.0,
            });
        }
    }

    let urls = resolve_manifest(base, &config.manifest)?;
    tracing::info!(%tag, assets = urls.len(), "installing cache generation");

    let entries = match try_join_all(urls.into_iter().map(|u| fetch_entry(client, u))).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(%tag, error = %e, "cache install failed; nothing stored");
            return Err(e);
        }
    };

    let info = blocking(cache, move |db| db.put_generation(generation, &tag, &entries)).await?;
    tracing::info!(tag = %info.tag, entries = info.entries, "cache generation installed");
    Ok(info)
}

/// Promote the newest stored generation and purge all older ones.
pub async fn activate(cache: &Arc<CacheDb>) -> Result<ActivateReport> {
    blocking(cache, |db| db.activate()).await
}

/// Startup sequence for the proxy: install the configured generation unless
/// it is already stored, then activate whatever is newest.
///
/// Failures are logged and leave the previously active generation serving.
/// Returns the generation serving traffic afterwards, if any.
pub async fn prepare(
    cache: &Arc<CacheDb>,
    client: &reqwest::Client,
    base: &Url,
    config: &CacheConfig,
) -> Option<Generation> {
    let generation = Generation(config.generation);
    match blocking(cache, move |db| db.has_generation(generation)).await {
        Ok(true) => tracing::debug!(%generation, "configured generation already stored"),
        Ok(false) => {
            if let Err(e) = install(cache, client, base, config).await {
                tracing::warn!(error = %e, "keeping previous cache generation");
            }
        }
        Err(e) => tracing::warn!(error = %e, "could not read cache store"),
    }

    match activate(cache).await {
        Ok(report) => Some(report.active),
        Err(DoorError::NothingToActivate) => {
            tracing::warn!("no cache generation available; serving from network only");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "cache activation failed");
            blocking(cache, |db| db.active()).await.ok().flatten()
        }
    }
}

/// Run a store operation on the blocking pool.
pub(crate) async fn blocking<T, F>(cache: &Arc<CacheDb>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&CacheDb) -> Result<T> + Send + 'static,
{
    let cache = Arc::clone(cache);
    tokio::task::spawn_blocking(move || f(&cache))
        .await
        .map_err(|e| DoorError::CacheDb(format!("store task failed: {e}")))?
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
