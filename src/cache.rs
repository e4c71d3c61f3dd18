//! File-backed cache for search results.
//!
//! Each request maps to one JSON file under `<root>/searches/`, keyed by
//! the md5 of a canonical rendering of the request. Entries expire by TTL
//! and are evicted lazily on lookup. Writes go through a temp file and a
//! rename, so readers never see a partially written entry.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HarvestError;
use crate::models::{BoolOp, Paper, SearchRequest};

/// Default entry lifetime
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const SEARCHES_SUBDIR: &str = "searches";

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Fresh entry with its papers
    Hit(Vec<Paper>),
    /// No entry on disk
    Miss,
    /// Entry existed but its TTL had elapsed; it has been evicted
    Expired,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    papers: Vec<Paper>,
    /// Unix seconds at store time
    stored_at: u64,
    ttl_secs: u64,
}

/// Counts reported by [`SearchCache::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
}

/// Disk cache for search responses.
#[derive(Debug, Clone)]
pub struct SearchCache {
    dir: PathBuf,
    ttl: Duration,
}

impl SearchCache {
    /// Open a cache rooted at `dir`, creating the layout if needed.
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, HarvestError> {
        let dir = dir.into();
        std::fs::create_dir_all(dir.join(SEARCHES_SUBDIR))?;
        Ok(Self { dir, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Canonical cache key for a request.
    ///
    /// Order-insensitive pieces (OR'd term lists, categories) are sorted
    /// before hashing, so logically identical requests share an entry.
    /// `id_list` order is preserved because it determines result order.
    pub fn fingerprint(request: &SearchRequest) -> String {
        let mut parts: Vec<String> = Vec::new();

        for query in &request.queries {
            let mut terms = query.terms.clone();
            if query.operator == BoolOp::Or {
                terms.sort();
            }
            parts.push(format!(
                "q:{}:{}:{}",
                query.field.prefix(),
                query.operator.as_str(),
                terms.join(",")
            ));
        }

        if !request.id_list.is_empty() {
            parts.push(format!("ids:{}", request.id_list.join(",")));
        }

        if let Some(range) = &request.date_range {
            let fragment = range.to_fragment();
            if !fragment.is_empty() {
                parts.push(format!("date:{}", fragment));
            }
        }

        if !request.categories.is_empty() {
            let mut cats = request.categories.clone();
            cats.sort();
            parts.push(format!("cats:{}", cats.join(",")));
        }

        parts.push(format!("start:{}", request.start));
        parts.push(format!("max:{}", request.max_results));
        parts.push(format!("sort:{}:{}", request.sort_by.as_str(), request.sort_order.as_str()));

        format!("{:x}", md5::compute(parts.join("|")))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(SEARCHES_SUBDIR).join(format!("{}.json", key))
    }

    /// Look up a request, evicting the entry if it has expired.
    pub fn get(&self, request: &SearchRequest) -> CacheLookup {
        let key = Self::fingerprint(request);
        let path = self.entry_path(&key);

        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(_) => return CacheLookup::Miss,
        };

        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(entry) => entry,
            Err(e) => {
                // Corrupt entries count as misses and are removed
                warn!(key = %key, error = %e, "removing unreadable cache entry");
                let _ = std::fs::remove_file(&path);
                return CacheLookup::Miss;
            }
        };

        if is_expired(&entry, unix_now()) {
            debug!(key = %key, "cache entry expired");
            let _ = std::fs::remove_file(&path);
            return CacheLookup::Expired;
        }

        debug!(key = %key, papers = entry.papers.len(), "cache hit");
        CacheLookup::Hit(entry.papers)
    }

    /// Store the papers for a request.
    pub fn put(&self, request: &SearchRequest, papers: &[Paper]) -> Result<(), HarvestError> {
        let key = Self::fingerprint(request);
        let entry = CacheEntry {
            key: key.clone(),
            papers: papers.to_vec(),
            stored_at: unix_now(),
            ttl_secs: self.ttl.as_secs(),
        };

        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| HarvestError::Filesystem(format!("cache serialization failed: {}", e)))?;

        let dir = self.dir.join(SEARCHES_SUBDIR);
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&json)?;
        tmp.persist(self.entry_path(&key))
            .map_err(|e| HarvestError::Filesystem(format!("cache write failed: {}", e)))?;

        debug!(key = %key, papers = papers.len(), "cache store");
        Ok(())
    }

    /// Remove every cached entry.
    pub fn clear(&self) -> Result<usize, HarvestError> {
        let mut removed = 0;
        for path in self.entry_files()? {
            std::fs::remove_file(path)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Count entries on disk, split into live and expired.
    pub fn stats(&self) -> Result<CacheStats, HarvestError> {
        let now = unix_now();
        let mut stats = CacheStats::default();
        for path in self.entry_files()? {
            stats.entries += 1;
            if let Ok(data) = std::fs::read_to_string(&path) {
                if let Ok(entry) = serde_json::from_str::<CacheEntry>(&data) {
                    if is_expired(&entry, now) {
                        stats.expired += 1;
                    }
                }
            }
        }
        Ok(stats)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>, HarvestError> {
        let mut files = Vec::new();
        for dirent in std::fs::read_dir(self.dir.join(SEARCHES_SUBDIR))? {
            let path = dirent?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

fn is_expired(entry: &CacheEntry, now: u64) -> bool {
    now >= entry.stored_at.saturating_add(entry.ttl_secs)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Default cache directory under the platform cache root
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| Path::new(".").to_path_buf())
        .join("arxiv-harvest")
}
