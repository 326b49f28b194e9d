//! Per-identity bet slip cache.
//!
//! Saves and loads a serialized `BetSlip` under the key `betslip_{uid}`
//! (uid percent-encoded).
//! `FileSlipCache` keeps one JSON file per identity in a directory;
//! `MemorySlipCache` keeps the same JSON strings in memory.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::BetSlip;

/// Local storage for bet slips, keyed by identity.
pub trait SlipCache: Send + Sync {
    fn load(&self, uid: &str) -> Result<Option<BetSlip>>;
    fn save(&self, uid: &str, slip: &BetSlip) -> Result<()>;
    fn remove(&self, uid: &str) -> Result<()>;
}

/// Cache key for an identity. Percent-encoding keeps distinct uids distinct
/// and leaves no path separators in file names.
pub fn cache_key(uid: &str) -> String {
    format!("betslip_{}", urlencoding::encode(uid))
}

// ---------------------------------------------------------------------------
// File-backed cache
// ---------------------------------------------------------------------------

pub struct FileSlipCache {
    dir: PathBuf,
}

impl FileSlipCache {
    /// Use `dir` for cache files, creating it if missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create slip cache dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, uid: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(uid)))
    }
}

impl SlipCache for FileSlipCache {
    fn load(&self, uid: &str) -> Result<Option<BetSlip>> {
        let path = self.path_for(uid);
        if !Path::new(&path).exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read slip from {}", path.display()))?;
        let slip: BetSlip = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse slip from {}", path.display()))?;

        info!(
            uid,
            selections = slip.selections().len(),
            mode = %slip.mode(),
            "Bet slip restored"
        );
        Ok(Some(slip))
    }

    fn save(&self, uid: &str, slip: &BetSlip) -> Result<()> {
        let path = self.path_for(uid);
        let json = serde_json::to_string_pretty(slip).context("Failed to serialise bet slip")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write slip to {}", path.display()))?;
        debug!(uid, selections = slip.selections().len(), "Bet slip saved");
        Ok(())
    }

    fn remove(&self, uid: &str) -> Result<()> {
        let path = self.path_for(uid);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete slip file {}", path.display()))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory cache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySlipCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySlipCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON stored for an identity.
    pub fn raw(&self, uid: &str) -> Option<String> {
        self.entries.lock().ok()?.get(&cache_key(uid)).cloned()
    }
}

impl SlipCache for MemorySlipCache {
    fn load(&self, uid: &str) -> Result<Option<BetSlip>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("slip cache lock poisoned"))?;
        entries
            .get(&cache_key(uid))
            .map(|json| serde_json::from_str(json).context("Failed to parse cached slip"))
            .transpose()
    }

    fn save(&self, uid: &str, slip: &BetSlip) -> Result<()> {
        let json = serde_json::to_string(slip).context("Failed to serialise bet slip")?;
        self.entries
            .lock()
            .map_err(|_| anyhow!("slip cache lock poisoned"))?
            .insert(cache_key(uid), json);
        Ok(())
    }

    fn remove(&self, uid: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("slip cache lock poisoned"))?
            .remove(&cache_key(uid));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
