//! Persistent cache storage using redb.
//!
//! # Table design
//!
//! Entry tables use a composite key:
//! ```text
//! [ generation: u64 big-endian (8 bytes) | request URL bytes ]
//! ```
//!
//! Because the generation occupies the high bytes in big-endian encoding,
//! every entry of one generation is contiguous, so purging a generation is a
//! single prefix scan. Payloads and their metadata live in separate tables so
//! asset bytes are never JSON-encoded.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::error::{DoorError, Result};

use super::{
    ActivateReport, CacheEntry, CacheStatus, CachedResource, Generation, GenerationInfo,
};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// Key: generation ++ URL. Value: raw payload bytes.
const ENTRIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");

/// Key: generation ++ URL. Value: JSON-encoded `EntryMeta`.
const ENTRY_META: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entry_meta");

/// Key: generation number. Value: JSON-encoded `GenerationInfo`.
const GENERATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("generations");

/// Key: `"active"`. Value: active generation number.
const STATE: TableDefinition<&str, u64> = TableDefinition::new("state");

const ACTIVE_KEY: &str = "active";

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    content_type: Option<String>,
    stored_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn entry_key(generation: Generation, url: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + url.len());
    key.extend_from_slice(&generation.0.to_be_bytes());
    key.extend_from_slice(url.as_bytes());
    key
}

fn db_err(e: impl std::fmt::Display) -> DoorError {
    DoorError::CacheDb(e.to_string())
}

/// Remove every row of `table` whose key starts with `generation`'s prefix.
fn purge_prefix(
    wt: &WriteTransaction,
    table: TableDefinition<'static, &'static [u8], &'static [u8]>,
    generation: Generation,
) -> Result<usize> {
    let prefix = generation.0.to_be_bytes();
    let mut table = wt.open_table(table).map_err(db_err)?;
    let mut keys = Vec::new();
    for entry in table.range(prefix.as_slice()..).map_err(db_err)? {
        let (k, _) = entry.map_err(db_err)?;
        let k = k.value();
        if !k.starts_with(&prefix) {
            break;
        }
        keys.push(k.to_vec());
    }
    for k in &keys {
        table.remove(k.as_slice()).map_err(db_err)?;
    }
    Ok(keys.len())
}

// ---------------------------------------------------------------------------
// CacheDb
// ---------------------------------------------------------------------------

/// Persistent store for cache generations.
pub struct CacheDb {
    db: Database,
}

impl CacheDb {
    /// Open or create the redb database at `path`, creating all tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(ENTRIES).map_err(db_err)?;
        wt.open_table(ENTRY_META).map_err(db_err)?;
        wt.open_table(GENERATIONS).map_err(db_err)?;
        wt.open_table(STATE).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// The generation currently serving traffic, if any.
    pub fn active(&self) -> Result<Option<Generation>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(STATE).map_err(db_err)?;
        Ok(table
            .get(ACTIVE_KEY)
            .map_err(db_err)?
            .map(|v| Generation(v.value())))
    }

    /// All stored generations, oldest first.
    pub fn generations(&self) -> Result<Vec<GenerationInfo>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(GENERATIONS).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let info: GenerationInfo = serde_json::from_slice(v.value())?;
            result.push(info);
        }
        Ok(result)
    }

    pub fn has_generation(&self, generation: Generation) -> Result<bool> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(GENERATIONS).map_err(db_err)?;
        Ok(table.get(generation.0).map_err(db_err)?.is_some())
    }

    /// Write a complete generation in one transaction.
    ///
    /// Either every entry lands or none does. Re-installing an existing
    /// generation replaces its entries; installing one older than the
    /// active generation is refused.
    pub fn put_generation(
        &self,
        generation: Generation,
        tag: &str,
        entries: &[CacheEntry],
    ) -> Result<GenerationInfo> {
        if let Some(active) = self.active()? {
            if generation < active {
                return Err(DoorError::StaleGeneration {
                    requested: generation.0,
                    active: active.0,
                });
            }
        }

        let now = Utc::now();
        let info = GenerationInfo {
            generation,
            tag: tag.to_string(),
            entries: entries.len(),
            installed_at: now,
        };

        let wt = self.db.begin_write().map_err(db_err)?;
        purge_prefix(&wt, ENTRIES, generation)?;
        purge_prefix(&wt, ENTRY_META, generation)?;
        {
            let mut payloads = wt.open_table(ENTRIES).map_err(db_err)?;
            let mut metas = wt.open_table(ENTRY_META).map_err(db_err)?;
            for entry in entries {
                let key = entry_key(generation, &entry.request_key);
                let meta = serde_json::to_vec(&EntryMeta {
                    content_type: entry.content_type.clone(),
                    stored_at: now,
                })?;
                payloads
                    .insert(key.as_slice(), entry.payload.as_slice())
                    .map_err(db_err)?;
                metas
                    .insert(key.as_slice(), meta.as_slice())
                    .map_err(db_err)?;
            }
            let mut gens = wt.open_table(GENERATIONS).map_err(db_err)?;
            let value = serde_json::to_vec(&info)?;
            gens.insert(generation.0, value.as_slice()).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        tracing::debug!(generation = %generation, entries = entries.len(), "cache generation stored");
        Ok(info)
    }

    /// Make the newest stored generation active and delete all others.
    pub fn activate(&self) -> Result<ActivateReport> {
        let stored: Vec<Generation> = self
            .generations()?
            .into_iter()
            .map(|g| g.generation)
            .collect();
        let newest = stored
            .iter()
            .copied()
            .max()
            .ok_or(DoorError::NothingToActivate)?;
        let purged: Vec<Generation> = stored.into_iter().filter(|g| *g != newest).collect();

        let wt = self.db.begin_write().map_err(db_err)?;
        for g in &purged {
            purge_prefix(&wt, ENTRIES, *g)?;
            purge_prefix(&wt, ENTRY_META, *g)?;
        }
        {
            let mut gens = wt.open_table(GENERATIONS).map_err(db_err)?;
            for g in &purged {
                gens.remove(g.0).map_err(db_err)?;
            }
            let mut state = wt.open_table(STATE).map_err(db_err)?;
            state.insert(ACTIVE_KEY, newest.0).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        tracing::info!(active = %newest, purged = purged.len(), "cache generation activated");

        Ok(ActivateReport {
            active: newest,
            purged,
        })
    }

    /// Exact-URL lookup under the active generation only.
    pub fn lookup(&self, url: &str) -> Result<Option<CachedResource>> {
        let Some(generation) = self.active()? else {
            return Ok(None);
        };
        let key = entry_key(generation, url);
        let rt = self.db.begin_read().map_err(db_err)?;
        let payloads = rt.open_table(ENTRIES).map_err(db_err)?;
        let Some(payload) = payloads.get(key.as_slice()).map_err(db_err)? else {
            return Ok(None);
        };
        let metas = rt.open_table(ENTRY_META).map_err(db_err)?;
        let meta: Option<EntryMeta> = match metas.get(key.as_slice()).map_err(db_err)? {
            Some(m) => Some(serde_json::from_slice(m.value())?),
            None => None,
        };
        Ok(Some(CachedResource {
            generation,
            content_type: meta.as_ref().and_then(|m| m.content_type.clone()),
            payload: payload.value().to_vec(),
            stored_at: meta.map(|m| m.stored_at).unwrap_or_else(Utc::now),
        }))
    }

    /// URLs stored under `generation`, in key order.
    pub fn urls(&self, generation: Generation) -> Result<Vec<String>> {
        let prefix = generation.0.to_be_bytes();
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ENTRIES).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.range(prefix.as_slice()..).map_err(db_err)? {
            let (k, _) = entry.map_err(db_err)?;
            let k = k.value();
            if !k.starts_with(&prefix) {
                break;
            }
            result.push(String::from_utf8_lossy(&k[8..]).into_owned());
        }
        Ok(result)
    }

    pub fn status(&self) -> Result<CacheStatus> {
        Ok(CacheStatus {
            active: self.active()?,
            generations: self.generations()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
