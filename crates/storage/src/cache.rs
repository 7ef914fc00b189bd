//! Best-effort secondary store.
//!
//! The session store is the primary persistence; this cache is the
//! fallback written when the primary save fails, and the recovery source
//! of last resort on resume. One file per content kind, throttled so a
//! hot capture loop does not rewrite it every tick, aged out after a day.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::session::ContentKind;
use crate::{Result, fs::atomic_write_async};

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CacheEntry {
    content: String,
    saved_at: DateTime<Utc>,
}

pub struct CacheStore {
    base: PathBuf,
    max_age: Duration,
    min_interval: Duration,
    last_update: Mutex<HashMap<ContentKind, DateTime<Utc>>>,
}

impl CacheStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self::with_policy(base, Duration::hours(24), Duration::seconds(60))
    }

    pub fn with_policy(base: impl Into<PathBuf>, max_age: Duration, min_interval: Duration) -> Self {
        Self {
            base: base.into(),
            max_age,
            min_interval,
            last_update: Mutex::new(HashMap::new()),
        }
    }

    fn path_for(&self, kind: ContentKind) -> PathBuf {
        self.base.join(format!("cache_{}.json", kind.as_str()))
    }

    /// Write one content buffer. Returns `false` when the write was
    /// throttled because the same kind was cached too recently.
    pub async fn save(&self, kind: ContentKind, content: &str) -> Result<bool> {
        let now = Utc::now();
        {
            let last = self.last_update.lock().expect("cache throttle lock");
            if let Some(at) = last.get(&kind) {
                if now - *at < self.min_interval {
                    return Ok(false);
                }
            }
        }

        let entry = CacheEntry {
            content: content.to_string(),
            saved_at: now,
        };
        atomic_write_async(&self.path_for(kind), &serde_json::to_string(&entry)?).await?;

        self.last_update
            .lock()
            .expect("cache throttle lock")
            .insert(kind, now);
        tracing::debug!(kind = kind.as_str(), "content cached");
        Ok(true)
    }

    /// Read one content buffer back, dropping entries past their max age.
    pub async fn load(&self, kind: ContentKind) -> Result<Option<String>> {
        let path = self.path_for(kind);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "dropping unreadable cache entry");
                let _ = tokio::fs::remove_file(&path).await;
                return Ok(None);
            }
        };

        if Utc::now() - entry.saved_at > self.max_age {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(entry.content))
    }

    pub async fn clear(&self) -> Result<()> {
        for kind in ContentKind::ALL {
            match tokio::fs::remove_file(self.path_for(kind)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.last_update.lock().expect("cache throttle lock").clear();
        Ok(())
    }
}
