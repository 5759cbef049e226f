use thiserror::Error;

#[derive(Debug, Error)]
pub enum DoorError {
    #[error("not initialized: run 'door init'")]
    NotInitialized,

    #[error("no scanner key set: run 'door key set <KEY>'")]
    MissingCredential,

    #[error("scanner key must not be empty")]
    EmptyCredential,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("cache database error: {0}")]
    CacheDb(String),

    #[error("install failed: could not fetch '{url}': {reason}")]
    InstallFailed { url: String, reason: String },

    #[error("generation {requested} is older than the active generation {active}")]
    StaleGeneration { requested: u64, active: u64 },

    #[error("no cache generation installed: nothing to activate")]
    NothingToActivate,

    #[error("no camera found")]
    NoDecoderDevice,

    #[error("decoder error: {0}")]
    Decoder(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DoorError>;
