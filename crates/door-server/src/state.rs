use std::sync::Arc;

use door_core::cache::CacheDb;
use door_core::config::Config;
use reqwest::Url;

use crate::lifecycle::parse_base_url;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheDb>,
    /// Origin that origin-form request paths are resolved against.
    pub upstream: Url,
    pub api_prefix: String,
    pub cache_name: String,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(cache: Arc<CacheDb>, config: &Config) -> door_core::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.server.request_timeout())
            .build()
            .map_err(|e| door_core::DoorError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            cache,
            upstream: parse_base_url(&config.server.base_url)?,
            api_prefix: config.server.api_prefix.clone(),
            cache_name: config.cache.name.clone(),
            http_client,
        })
    }

    /// Requests under the API prefix are never answered from the cache.
    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn new_state_parses_upstream() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheDb::open(&dir.path().join("cache.db")).unwrap());
        let config = Config::new("https://tickets.example.com");
        let state = AppState::new(cache, &config).unwrap();
        assert_eq!(state.upstream.as_str(), "https://tickets.example.com/");
        assert!(state.is_api_path("/api/checkin"));
        assert!(!state.is_api_path("/app.js"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheDb::open(&dir.path().join("cache.db")).unwrap());
        let config = Config::new("::nope::");
        assert!(AppState::new(cache, &config).is_err());
    }
}
