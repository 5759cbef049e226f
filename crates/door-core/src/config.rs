use crate::error::{DoorError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_checkin_path")]
    pub checkin_path: String,
    /// Requests under this prefix always go to the network.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_checkin_path() -> String {
    "/api/checkin".to_string()
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            checkin_path: default_checkin_path(),
            api_prefix: default_api_prefix(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn checkin_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.checkin_path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix)
    }
}

// ---------------------------------------------------------------------------
// DecoderConfig / ScannerConfig
// ---------------------------------------------------------------------------

/// External decoder invocation. `{device}` in `args` is replaced with the
/// selected device path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecoderConfig {
    #[serde(default = "default_decoder_program")]
    pub program: String,
    #[serde(default = "default_decoder_args")]
    pub args: Vec<String>,
    #[serde(default = "default_device_dir")]
    pub device_dir: String,
}

fn default_decoder_program() -> String {
    "zbarcam".to_string()
}

fn default_decoder_args() -> Vec<String> {
    vec![
        "--raw".to_string(),
        "--nodisplay".to_string(),
        "{device}".to_string(),
    ]
}

fn default_device_dir() -> String {
    "/dev".to_string()
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: default_decoder_program(),
            args: default_decoder_args(),
            device_dir: default_device_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_feedback_ms")]
    pub feedback_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub same_code_cooldown_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub decoder: DecoderConfig,
}

fn default_feedback_ms() -> u64 {
    1800
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    16
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            feedback_ms: default_feedback_ms(),
            same_code_cooldown_ms: default_cooldown_ms(),
            channel_capacity: default_channel_capacity(),
            decoder: DecoderConfig::default(),
        }
    }
}

impl ScannerConfig {
    pub fn feedback_duration(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }

    pub fn same_code_cooldown(&self) -> Duration {
        Duration::from_millis(self.same_code_cooldown_ms)
    }
}

// ---------------------------------------------------------------------------
// ConnectivityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_probe_interval() -> u64 {
    5
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval(),
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_name")]
    pub name: String,
    /// Bumped on every deployment; the only cache invalidation signal.
    #[serde(default = "default_generation")]
    pub generation: u64,
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,
}

fn default_cache_name() -> String {
    "door-scanner".to_string()
}

fn default_generation() -> u64 {
    1
}

fn default_manifest() -> Vec<String> {
    [
        "./",
        "./index.html",
        "./app.js",
        "./styles.css",
        "./manifest.webmanifest",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: default_cache_name(),
            generation: default_generation(),
            manifest: default_manifest(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProxyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

fn default_proxy_port() -> u16 {
    8080
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_proxy_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerConfig::default(),
            scanner: ScannerConfig::default(),
            connectivity: ConnectivityConfig::default(),
            cache: CacheConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl Config {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            server: ServerConfig {
                base_url: base_url.into(),
                ..ServerConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(DoorError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Load and refuse to continue if validation reports any error.
    pub fn load_valid(root: &Path) -> Result<Self> {
        let cfg = Self::load(root)?;
        if let Some(err) = cfg
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            return Err(DoorError::InvalidConfig(err.message));
        }
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        let url = &self.server.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            push(
                WarnLevel::Error,
                format!("server.base_url '{url}' must start with http:// or https://"),
            );
        }

        if !self.server.api_prefix.starts_with('/') {
            push(
                WarnLevel::Error,
                format!(
                    "server.api_prefix '{}' must start with '/'",
                    self.server.api_prefix
                ),
            );
        }

        // A check-in path outside the API prefix would be eligible for caching.
        if !self.server.is_api_path(&self.server.checkin_path) {
            push(
                WarnLevel::Error,
                format!(
                    "server.checkin_path '{}' is not under api_prefix '{}'",
                    self.server.checkin_path, self.server.api_prefix
                ),
            );
        }

        if self.server.request_timeout_secs == 0 {
            push(
                WarnLevel::Warning,
                "server.request_timeout_secs is 0; verification requests will fail immediately"
                    .to_string(),
            );
        }

        if self.cache.manifest.is_empty() {
            push(
                WarnLevel::Error,
                "cache.manifest is empty; nothing would be available offline".to_string(),
            );
        }

        if self.scanner.feedback_ms == 0 {
            push(
                WarnLevel::Warning,
                "scanner.feedback_ms is 0; feedback will not be visible".to_string(),
            );
        }

        if self.scanner.same_code_cooldown_ms < self.scanner.feedback_ms {
            push(
                WarnLevel::Warning,
                format!(
                    "scanner.same_code_cooldown_ms ({}) is shorter than feedback_ms ({}); \
                     a code left in view will be re-submitted right after unlock",
                    self.scanner.same_code_cooldown_ms, self.scanner.feedback_ms
                ),
            );
        }

        if self.scanner.channel_capacity == 0 {
            push(
                WarnLevel::Error,
                "scanner.channel_capacity must be at least 1".to_string(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
