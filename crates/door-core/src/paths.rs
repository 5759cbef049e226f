use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DOOR_DIR: &str = ".door";
pub const CONFIG_FILE: &str = ".door/config.yaml";
pub const CREDENTIAL_FILE: &str = ".door/scanner-key";
pub const CACHE_DB_FILE: &str = ".door/cache.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn door_dir(root: &Path) -> PathBuf {
    root.join(DOOR_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn credential_path(root: &Path) -> PathBuf {
    root.join(CREDENTIAL_FILE)
}

pub fn cache_db_path(root: &Path) -> PathBuf {
    root.join(CACHE_DB_FILE)
}
