//! On-disk cache for Stack Exchange responses.
//!
//! Lives under the platform cache directory and is best-effort: a missing,
//! locked, or corrupt cache never blocks a diagnosis, it just costs a
//! refetch. Writes go through a lock file plus an atomic rename so two
//! invocations running at once cannot tear the JSON.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

const APP_CACHE_DIR: &str = "pysage";
const CACHE_FILE: &str = "http_cache.json";
const LOCK_FILE: &str = ".lock";

/// Max age for a cached response, in hours.
const CACHE_MAX_AGE_HOURS: i64 = 24;

const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    /// The full request URL, kept to guard against key collisions.
    url: String,
    body: String,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: HashMap<String, CacheEntry>,
}

impl CacheFile {
    /// Drop entries past their max age.
    fn cleanup(&mut self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| {
            now.signed_duration_since(entry.fetched_at).num_hours() <= CACHE_MAX_AGE_HOURS
        });
    }
}

/// Cache manager for API responses.
pub struct ResponseCache {
    cache_dir: Option<PathBuf>,
}

struct CacheLock {
    file: std::fs::File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl ResponseCache {
    /// Cache under the platform cache directory. When that cannot be
    /// determined every operation is a no-op.
    pub fn new() -> Self {
        Self {
            cache_dir: dirs::cache_dir().map(|dir| dir.join(APP_CACHE_DIR)),
        }
    }

    /// Look up a fresh cached body for a URL.
    pub fn get(&self, url: &str) -> Option<String> {
        let dir = self.cache_dir.as_ref()?;
        let path = dir.join(CACHE_FILE);
        if !path.exists() {
            return None;
        }

        let _lock = self.lock(false).ok()?;
        let content = fs::read_to_string(&path).ok()?;
        let cache: CacheFile = serde_json::from_str(&content).ok()?;

        let entry = cache.entries.get(&hash_url(url))?;
        if entry.url != url {
            return None;
        }
        let age = Utc::now().signed_duration_since(entry.fetched_at);
        if age.num_hours() > CACHE_MAX_AGE_HOURS {
            return None;
        }
        Some(entry.body.clone())
    }

    /// Store a response body. Best effort: a failed write just means a
    /// refetch next run.
    pub fn put(&self, url: &str, body: &str) {
        let _ = self.store(url, body);
    }

    fn store(&self, url: &str, body: &str) -> Result<()> {
        let Some(dir) = self.cache_dir.as_ref() else {
            return Ok(());
        };
        let _lock = self.lock(true)?;

        let path = dir.join(CACHE_FILE);
        let mut cache = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str::<CacheFile>(&content).ok())
            .unwrap_or_default();

        cache.cleanup();
        cache.entries.insert(
            hash_url(url),
            CacheEntry {
                url: url.to_string(),
                body: body.to_string(),
                fetched_at: Utc::now(),
            },
        );

        let content = serde_json::to_string(&cache)?;
        write_atomic(&path, &content)?;
        Ok(())
    }

    fn lock(&self, exclusive: bool) -> Result<CacheLock> {
        let Some(dir) = self.cache_dir.as_ref() else {
            bail!("no cache directory");
        };
        if exclusive {
            fs::create_dir_all(dir)?;
        } else if !dir.exists() {
            bail!("cache directory missing");
        }

        let lock_path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // only the lock matters, not the content
            .open(&lock_path)?;

        let start = Instant::now();
        loop {
            let result = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match result {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(err.into());
                    }
                    if start.elapsed() >= StdDuration::from_secs(LOCK_TIMEOUT_SECS) {
                        bail!("timed out waiting for cache lock ({LOCK_TIMEOUT_SECS}s)");
                    }
                    std::thread::sleep(StdDuration::from_millis(LOCK_RETRY_MS));
                }
            }
        }

        Ok(CacheLock { file })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_url(url: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Write content to a temp file first, then rename it into place.
fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;

    // Responses are public data, but keep the cache owner-only anyway.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        let _ = fs::set_permissions(&tmp_path, perms);
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
