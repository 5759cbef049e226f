//! Versioned local store for the offline resource cache.
//!
//! Resources are grouped into generations. A generation is written in full
//! by install (or not at all) and becomes visible only through
//! [`CacheDb::activate`], which also purges every older generation. The
//! proxy only ever reads; nothing writes outside install and activate.

pub mod db;

pub use db::CacheDb;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Totally ordered cache version identifier. Higher is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    /// Human-facing version tag, e.g. `door-scanner-v3`.
    pub fn tag(self, name: &str) -> String {
        format!("{name}-v{}", self.0)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One fetched asset, ready to be written under a generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub request_key: String,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
}

/// A stored asset as returned by [`CacheDb::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResource {
    pub generation: Generation,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub generation: Generation,
    pub tag: String,
    pub entries: usize,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateReport {
    pub active: Generation,
    pub purged: Vec<Generation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub active: Option<Generation>,
    pub generations: Vec<GenerationInfo>,
}
