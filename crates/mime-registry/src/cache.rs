use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{MimeError, Result};
use crate::mime::MimeTypeMap;
use crate::source::MimeTypesProvider;

/// Single key under which the whole mapping is stored.
pub const MIME_TYPES_CACHE_KEY: &str = "mimeTypes";

/// Key/value store whose entries go stale after a time-to-live.
///
/// `ttl` of `None` defers to the cache's own default.
pub trait TtlCache<V> {
    fn has(&self, key: &str) -> Result<bool>;
    fn get(&self, key: &str) -> Result<Option<V>>;
    fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()>;
}

impl<V, C> TtlCache<V> for Arc<C>
where
    C: TtlCache<V> + ?Sized,
{
    fn has(&self, key: &str) -> Result<bool> {
        (**self).has(key)
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, ttl)
    }
}

#[derive(Debug)]
struct MemoryEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> MemoryEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// Process-local cache. A `default_ttl` of `None` never expires.
#[derive(Debug)]
pub struct MemoryTtlCache<V> {
    default_ttl: Option<Duration>,
    entries: RwLock<HashMap<String, MemoryEntry<V>>>,
}

impl<V> Default for MemoryTtlCache<V> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<V> MemoryTtlCache<V> {
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            default_ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> for MemoryTtlCache<V> {
    fn has(&self, key: &str) -> Result<bool> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MimeError::Cache("memory cache lock poisoned".to_string()))?;
        Ok(entries
            .get(key)
            .is_some_and(|entry| entry.is_fresh(Instant::now())))
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| MimeError::Cache("memory cache lock poisoned".to_string()))?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl
            .or(self.default_ttl)
            .and_then(|ttl| Instant::now().checked_add(ttl));
        let mut entries = self
            .entries
            .write()
            .map_err(|_| MimeError::Cache("memory cache lock poisoned".to_string()))?;
        entries.insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry<V> {
    key: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    value: V,
}

impl<V> FileEntry<V> {
    fn is_fresh_for(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.key == key && self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// Persists one JSON document per key under `dir`, so entries survive restarts.
///
/// Unreadable or corrupt entries are reported as misses.
#[derive(Debug, Clone)]
pub struct FileTtlCache {
    dir: PathBuf,
    default_ttl: Option<Duration>,
}

impl FileTtlCache {
    pub fn new(dir: impl Into<PathBuf>, default_ttl: Option<Duration>) -> Self {
        Self {
            dir: dir.into(),
            default_ttl,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes());
        self.dir.join(format!("{}.json", digest.to_hex()))
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<FileEntry<T>>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice::<FileEntry<T>>(&raw) {
            Ok(entry) if entry.is_fresh_for(key, Utc::now()) => Ok(Some(entry)),
            Ok(_) => Ok(None),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring corrupt cache entry");
                Ok(None)
            }
        }
    }
}

impl<V> TtlCache<V> for FileTtlCache
where
    V: Serialize + DeserializeOwned,
{
    fn has(&self, key: &str) -> Result<bool> {
        Ok(self.read_entry::<IgnoredAny>(key)?.is_some())
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.read_entry::<V>(key)?.map(|entry| entry.value))
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<()> {
        // A TTL past the representable range never expires.
        let expires_at = ttl
            .or(self.default_ttl)
            .and_then(|ttl| TimeDelta::from_std(ttl).ok())
            .and_then(|delta| Utc::now().checked_add_signed(delta));
        let entry = FileEntry {
            key: key.to_string(),
            expires_at,
            value,
        };
        let encoded = serde_json::to_vec(&entry)?;

        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let mut staging = NamedTempFile::new_in(&self.dir)?;
        staging.write_all(&encoded)?;
        staging.persist(&path).map_err(|err| err.error)?;
        Ok(())
    }
}

/// Fronts a provider with a TTL cache under [`MIME_TYPES_CACHE_KEY`].
///
/// There is no invalidation: a stored mapping is served until its TTL lapses.
/// Concurrent cold-cache callers may both fetch and store; the stored value is
/// the same either way.
#[derive(Debug, Clone)]
pub struct MimeTypesCache<C, P> {
    cache: C,
    src: P,
    ttl: Option<Duration>,
}

impl<C, P> MimeTypesCache<C, P>
where
    P: MimeTypesProvider,
    C: TtlCache<MimeTypeMap<P::Record>>,
{
    pub fn new(cache: C, src: P, ttl: Option<Duration>) -> Self {
        Self { cache, src, ttl }
    }
}

impl<C, P> MimeTypesProvider for MimeTypesCache<C, P>
where
    P: MimeTypesProvider,
    C: TtlCache<MimeTypeMap<P::Record>>,
{
    type Record = P::Record;

    fn mime_types(&self) -> Result<MimeTypeMap<P::Record>> {
        if let Some(cached) = self.cache.get(MIME_TYPES_CACHE_KEY)? {
            debug!(key = MIME_TYPES_CACHE_KEY, entries = cached.len(), "mime types cache hit");
            return Ok(cached);
        }

        debug!(key = MIME_TYPES_CACHE_KEY, "mime types cache miss");
        let fresh = self.src.mime_types()?;
        self.cache
            .set(MIME_TYPES_CACHE_KEY, fresh.clone(), self.ttl)?;
        Ok(fresh)
    }
}
