//! Durable session persistence.
//!
//! One JSON file per session under a base directory, written atomically.
//! Writes are last-write-wins per session id, with one exception: a save
//! never shrinks a previously persisted buffer. After a reload race the
//! fresh capture may hold less than what an earlier run already saved,
//! and the longer buffer must survive.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};

use crate::session::{ContentKind, Session};
use crate::{BoxFuture, Error, Result, fs::atomic_write_async, session::sanitize_title};

pub trait SessionStore: Send + Sync {
    fn save<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, Result<()>>;

    /// Most recently updated session for this meeting key that actually
    /// holds content. Sessions with nothing captured are not worth
    /// resuming.
    fn load_most_recent_matching<'a>(
        &'a self,
        meeting_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Session>>>;

    fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Remove sessions whose last update is older than `max_age`.
    /// Returns how many were removed.
    fn cleanup_older_than(&self, max_age: Duration) -> BoxFuture<'_, Result<usize>>;
}

pub struct FsSessionStore {
    base: PathBuf,
}

impl FsSessionStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `<data dir>/meetcap/sessions`.
    pub fn at_default_base() -> Result<Self> {
        let base = dirs::data_dir()
            .ok_or(Error::DataDirUnavailable)?
            .join("meetcap")
            .join("sessions");
        Ok(Self::new(base))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.base.join(format!("{}.json", sanitize_title(session_id)))
    }

    async fn read_session(path: &Path) -> Result<Session> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn load_all(&self) -> Result<Vec<(PathBuf, Session)>> {
        let mut sessions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read_session(&path).await {
                Ok(session) => sessions.push((path, session)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session file");
                }
            }
        }

        Ok(sessions)
    }

    async fn save_impl(&self, session: &Session) -> Result<()> {
        if !session.has_content() {
            return Ok(());
        }

        let path = self.path_for(&session.id);
        let mut to_save = session.clone();
        to_save.updated_at = Utc::now();

        match Self::read_session(&path).await {
            Ok(existing) => {
                to_save.created_at = existing.created_at;
                for kind in ContentKind::ALL {
                    guard_regression(&mut to_save, &existing, kind);
                }
            }
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                // A corrupt session file must not block saving; the new
                // snapshot simply replaces it.
                tracing::warn!(path = %path.display(), error = %e, "replacing unreadable session file");
            }
        }

        let content = serde_json::to_string_pretty(&to_save)?;
        atomic_write_async(&path, &content).await?;
        tracing::debug!(session_id = %to_save.id, "session saved");
        Ok(())
    }

    async fn load_most_recent_impl(&self, meeting_id: &str) -> Result<Option<Session>> {
        let sessions = self.load_all().await?;
        Ok(sessions
            .into_iter()
            .map(|(_, session)| session)
            .filter(|s| s.meeting_id == meeting_id && s.has_content())
            .max_by_key(|s| s.updated_at))
    }

    async fn cleanup_impl(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let mut removed = 0;

        for (path, session) in self.load_all().await? {
            if session.updated_at < cutoff {
                tracing::info!(session_id = %session.id, "removing expired session");
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

impl SessionStore for FsSessionStore {
    fn save<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.save_impl(session))
    }

    fn load_most_recent_matching<'a>(
        &'a self,
        meeting_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Session>>> {
        Box::pin(self.load_most_recent_impl(meeting_id))
    }

    fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.path_for(session_id)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn cleanup_older_than(&self, max_age: Duration) -> BoxFuture<'_, Result<usize>> {
        Box::pin(self.cleanup_impl(max_age))
    }
}

/// Keep the longer of the old and new buffer for one content kind.
fn guard_regression(to_save: &mut Session, existing: &Session, kind: ContentKind) {
    let old = existing.buffers.get(kind);
    let new = to_save.buffers.get(kind);
    if old.is_empty() || new.is_empty() {
        if new.is_empty() && !old.is_empty() {
            to_save.buffers.set(kind, old.to_string());
        }
        return;
    }

    let old_lines = old.lines().count();
    let new_lines = new.lines().count();
    if new_lines < old_lines {
        tracing::warn!(
            kind = kind.as_str(),
            old_lines,
            new_lines,
            "preserving longer persisted buffer"
        );
        to_save.buffers.set(kind, old.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn session(id: &str, meeting_id: &str) -> Session {
        Session::new(id.into(), meeting_id.into(), "Weekly Sync".into(), None)
    }

    fn with_captions(mut s: Session, captions: &str) -> Session {
        s.buffers.set(ContentKind::Captions, captions.into());
        s
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        let s = with_captions(session("[08-07] - Weekly Sync - MoM - 42", "42"), "line one");
        store.save(&s).await.unwrap();

        let loaded = store.load_most_recent_matching("42").await.unwrap().unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(loaded.buffers.captions, "line one");
    }

    #[tokio::test]
    async fn load_ignores_other_meetings_and_empty_sessions() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        store
            .save(&with_captions(session("a", "meeting-a"), "content"))
            .await
            .unwrap();
        store.save(&session("b", "meeting-b")).await.unwrap();

        assert!(store.load_most_recent_matching("meeting-b").await.unwrap().is_none());
        assert!(store.load_most_recent_matching("meeting-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn load_picks_most_recently_updated() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        let mut old = with_captions(session("old", "m"), "one line");
        old.updated_at = Utc::now() - Duration::hours(2);
        let content = serde_json::to_string(&old).unwrap();
        crate::fs::atomic_write(&store.path_for("old"), &content).unwrap();

        store
            .save(&with_captions(session("new", "m"), "fresh line"))
            .await
            .unwrap();

        let loaded = store.load_most_recent_matching("m").await.unwrap().unwrap();
        assert_eq!(loaded.id, "new");
    }

    #[tokio::test]
    async fn shorter_update_does_not_shrink_saved_buffer() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        let long = with_captions(session("s", "m"), "one\ntwo\nthree");
        store.save(&long).await.unwrap();

        let short = with_captions(session("s", "m"), "one");
        store.save(&short).await.unwrap();

        let loaded = store.load_most_recent_matching("m").await.unwrap().unwrap();
        assert_eq!(loaded.buffers.captions, "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn longer_update_replaces_saved_buffer() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        store.save(&with_captions(session("s", "m"), "one")).await.unwrap();
        store
            .save(&with_captions(session("s", "m"), "one\ntwo"))
            .await
            .unwrap();

        let loaded = store.load_most_recent_matching("m").await.unwrap().unwrap();
        assert_eq!(loaded.buffers.captions, "one\ntwo");
    }

    #[tokio::test]
    async fn created_at_survives_resaves() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        let first = with_captions(session("s", "m"), "one");
        store.save(&first).await.unwrap();

        let mut second = with_captions(session("s", "m"), "one\ntwo");
        second.created_at = Utc::now() + Duration::hours(1);
        store.save(&second).await.unwrap();

        let loaded = store.load_most_recent_matching("m").await.unwrap().unwrap();
        assert_eq!(
            loaded.created_at.timestamp(),
            first.created_at.timestamp()
        );
    }

    #[tokio::test]
    async fn save_without_content_is_a_no_op() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        store.save(&session("s", "m")).await.unwrap();
        assert!(store.load_most_recent_matching("m").await.unwrap().is_none());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_expired_sessions() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        let mut expired = with_captions(session("expired", "m"), "stale");
        expired.updated_at = Utc::now() - Duration::hours(48);
        let content = serde_json::to_string(&expired).unwrap();
        crate::fs::atomic_write(&store.path_for("expired"), &content).unwrap();

        store
            .save(&with_captions(session("fresh", "m"), "recent"))
            .await
            .unwrap();

        let removed = store.cleanup_older_than(Duration::hours(24)).await.unwrap();
        assert_eq!(removed, 1);

        let loaded = store.load_most_recent_matching("m").await.unwrap().unwrap();
        assert_eq!(loaded.id, "fresh");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        store.save(&with_captions(session("s", "m"), "x")).await.unwrap();
        store.delete("s").await.unwrap();
        store.delete("s").await.unwrap();
        assert!(store.load_most_recent_matching("m").await.unwrap().is_none());
    }
}
