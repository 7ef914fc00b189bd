//! The timer-driven capture session.
//!
//! One tokio task multiplexes every periodic trigger: the fast caption
//! poll, the slower chat poll, attendee refresh, and persistence. Each
//! tick runs to completion before the next is served, so a reconcile
//! call is atomic with respect to observation. No lock is needed around
//! the decision logic itself, only around the shared state the export
//! surface reads from other tasks.
//!
//! Stopping cancels the timers and nothing else: in-memory history stays
//! authoritative, and a restart does not reprocess fragments the engine
//! has already fingerprinted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use meetcap_storage::{CacheStore, ContentKind, Session, SessionStore, session_id};
use meetcap_transcript::{
    FingerprintSet, LineKind, ReconcileAction, ReconciliationEngine, TimestampTag, TranscriptLine,
    timeline,
};

use crate::adapter::{CaptureAdapter, ChatMessage, MeetingDetails};
use crate::events::{
    CaptureRuntime, SessionDataEvent, SessionErrorEvent, SessionLifecycleEvent,
};
use crate::Result;

/// Marker the feed puts in its machine-caption announcement. Captions
/// from the announcement are folded into one notice line in the header.
const SYSTEM_CAPTION_MARKER: &str = "Machine generated captions";

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub caption_poll: Duration,
    pub chat_poll: Duration,
    pub persist_every: Duration,
    pub attendees_refresh: Duration,
    /// Persisted sessions older than this are not resumed.
    pub resume_max_age: chrono::Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            caption_poll: Duration::from_secs(1),
            chat_poll: Duration::from_secs(2),
            persist_every: Duration::from_secs(10),
            attendees_refresh: Duration::from_secs(30),
            resume_max_age: chrono::Duration::hours(24),
        }
    }
}

struct State {
    session_id: String,
    engine: ReconciliationEngine,
    chat: Vec<TranscriptLine>,
    comments: Vec<TranscriptLine>,
    chat_seen: FingerprintSet,
    attendees: String,
    notice_added: bool,
    created_at: chrono::DateTime<Utc>,
}

pub struct CaptureSession {
    details: MeetingDetails,
    opened_on: NaiveDate,
    config: CaptureConfig,
    adapter: Arc<dyn CaptureAdapter>,
    runtime: Arc<dyn CaptureRuntime>,
    store: Arc<dyn SessionStore>,
    cache: Option<Arc<CacheStore>>,
    state: Mutex<State>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl CaptureSession {
    pub fn new(
        details: MeetingDetails,
        adapter: Arc<dyn CaptureAdapter>,
        runtime: Arc<dyn CaptureRuntime>,
        store: Arc<dyn SessionStore>,
        config: CaptureConfig,
    ) -> Self {
        let opened_on = Local::now().date_naive();
        let state = State {
            session_id: session_id(opened_on, &details.title, &details.meeting_id),
            engine: ReconciliationEngine::new(),
            chat: Vec::new(),
            comments: Vec::new(),
            chat_seen: FingerprintSet::new(),
            attendees: String::new(),
            notice_added: false,
            created_at: Utc::now(),
        };
        Self {
            details,
            opened_on,
            config,
            adapter,
            runtime,
            store,
            cache: None,
            state: Mutex::new(state),
            cancel: Mutex::new(None),
        }
    }

    /// Attach a secondary cache store, written when the primary save
    /// fails and consulted on resume when no session matches.
    pub fn with_cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn session_id(&self) -> String {
        self.lock_state().session_id.clone()
    }

    pub fn details(&self) -> &MeetingDetails {
        &self.details
    }

    pub fn has_content(&self) -> bool {
        let state = self.lock_state();
        !state.engine.is_empty() || !state.chat.is_empty() || !state.comments.is_empty()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start the capture timers. Idempotent: a second call while running
    /// is a no-op and returns `false`.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = self.cancel.lock().expect("cancel slot lock");
        if slot.is_some() {
            return false;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        drop(slot);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(token).await });

        self.runtime.emit_lifecycle(SessionLifecycleEvent::Started {
            session_id: self.session_id(),
        });
        true
    }

    /// Cancel the capture timers and write one final snapshot. Engine
    /// state is untouched; `start` may be called again afterwards.
    pub async fn stop(&self) {
        let token = self.cancel.lock().expect("cancel slot lock").take();
        let Some(token) = token else {
            return;
        };
        token.cancel();

        self.persist().await;
        self.runtime.emit_lifecycle(SessionLifecycleEvent::Stopped {
            session_id: self.session_id(),
        });
    }

    async fn run(&self, token: CancellationToken) {
        let mut caption_tick = tokio::time::interval(self.config.caption_poll);
        let mut chat_tick = tokio::time::interval(self.config.chat_poll);
        let mut attendees_tick = tokio::time::interval(self.config.attendees_refresh);
        let mut persist_tick = tokio::time::interval(self.config.persist_every);
        for tick in [&mut caption_tick, &mut chat_tick, &mut attendees_tick, &mut persist_tick] {
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = caption_tick.tick() => self.capture_captions().await,
                _ = chat_tick.tick() => self.capture_chat().await,
                _ = attendees_tick.tick() => self.refresh_attendees().await,
                _ = persist_tick.tick() => self.persist().await,
            }
        }

        tracing::debug!(session_id = %self.session_id(), "capture timers stopped");
    }

    // ── Resume ──────────────────────────────────────────────────────────

    /// Rebuild state from the most recent persisted session for this
    /// meeting, falling back to the cache store. Returns `true` when
    /// anything was restored.
    pub async fn resume(&self) -> Result<bool> {
        let persisted = self
            .store
            .load_most_recent_matching(&self.details.meeting_id)
            .await?
            .filter(|s| Utc::now() - s.updated_at <= self.config.resume_max_age);

        let session = match persisted {
            Some(session) => Some(session),
            None => self.recover_from_cache().await,
        };
        let Some(session) = session else {
            return Ok(false);
        };

        let restored = {
            let mut state = self.lock_state();
            let mut restored = 0;

            for line in session.buffers.get(ContentKind::Captions).lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed = TranscriptLine::parse_rendered(line);
                if parsed.text == timeline::CAPTION_NOTICE {
                    state.notice_added = true;
                    continue;
                }
                if parsed.kind == LineKind::Header {
                    continue;
                }
                state.engine.restore_line(parsed);
                restored += 1;
            }

            for line in session.buffers.get(ContentKind::Chat).lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed = TranscriptLine::parse_rendered(line);
                if parsed.kind == LineKind::Chat {
                    state
                        .chat_seen
                        .insert(&format!("{}:{}", parsed.speaker, parsed.text));
                }
                state.chat.push(parsed);
                restored += 1;
            }

            for line in session.buffers.get(ContentKind::Comments).lines() {
                if line.trim().is_empty() {
                    continue;
                }
                state.comments.push(TranscriptLine::parse_rendered(line));
                restored += 1;
            }

            state.session_id = session.id;
            state.created_at = session.created_at;
            restored
        };

        tracing::info!(restored, "session resumed");
        self.runtime.emit_lifecycle(SessionLifecycleEvent::Resumed {
            session_id: self.session_id(),
            restored_lines: restored,
        });
        Ok(restored > 0)
    }

    async fn recover_from_cache(&self) -> Option<Session> {
        let cache = self.cache.as_ref()?;
        let mut session = Session::new(
            self.session_id(),
            self.details.meeting_id.clone(),
            self.details.title.clone(),
            self.details.organizer.clone(),
        );

        for kind in [ContentKind::Captions, ContentKind::Chat, ContentKind::Comments] {
            match cache.load(kind).await {
                Ok(Some(content)) => session.buffers.set(kind, content),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "cache recovery failed"),
            }
        }

        session.has_content().then_some(session)
    }

    // ── Capture ticks ───────────────────────────────────────────────────

    async fn capture_captions(&self) {
        let fragments = self.adapter.poll_captions().await;
        if fragments.is_empty() {
            return;
        }

        let mut events = Vec::new();
        {
            let mut state = self.lock_state();
            for fragment in &fragments {
                if fragment.text.contains(SYSTEM_CAPTION_MARKER) {
                    state.notice_added = true;
                    continue;
                }

                let outcome = state.engine.reconcile_fragment(fragment);
                let (Some(line), Some(index)) = (outcome.line, outcome.index) else {
                    continue;
                };
                let event = match outcome.action {
                    ReconcileAction::Appended => SessionDataEvent::CaptionAppended {
                        session_id: state.session_id.clone(),
                        line: line.render(),
                    },
                    ReconcileAction::Merged => SessionDataEvent::CaptionMerged {
                        session_id: state.session_id.clone(),
                        index,
                        line: line.render(),
                    },
                    ReconcileAction::Discarded => continue,
                };
                events.push(event);
            }
        }

        for event in events {
            self.runtime.emit_data(event);
        }
    }

    async fn capture_chat(&self) {
        let messages = self.adapter.poll_chat().await;
        if messages.is_empty() {
            return;
        }

        let mut events = Vec::new();
        {
            let mut state = self.lock_state();
            for ChatMessage { sender, text, sent_at } in messages {
                let text = text.trim().to_string();
                if text.is_empty() || text.contains(SYSTEM_CAPTION_MARKER) {
                    continue;
                }
                if !state.chat_seen.insert(&format!("{sender}:{text}")) {
                    continue;
                }
                // Fingerprints are capacity-bounded; the history itself
                // is the backstop against re-capturing evicted content.
                if state.chat.iter().any(|l| l.speaker == sender && l.text == text) {
                    continue;
                }

                let tag = sent_at.unwrap_or_else(TimestampTag::now);
                let line = TranscriptLine::chat(sender, text, tag);
                events.push(SessionDataEvent::ChatCaptured {
                    session_id: state.session_id.clone(),
                    line: line.render(),
                });
                state.chat.push(line);
            }
        }

        for event in events {
            self.runtime.emit_data(event);
        }
    }

    async fn refresh_attendees(&self) {
        let mut names: Vec<String> = self
            .adapter
            .attendees()
            .await
            .into_iter()
            .map(|raw| meetcap_transcript::display_speaker_name(raw.trim()))
            .filter(|name| !name.is_empty())
            .collect();
        names.sort();
        names.dedup();
        let joined = names.join(", ");

        let changed = {
            let mut state = self.lock_state();
            let changed = !joined.is_empty() && joined != state.attendees;
            if changed {
                state.attendees = joined.clone();
            }
            changed
        };

        if changed {
            self.runtime.emit_data(SessionDataEvent::AttendeesChanged {
                session_id: self.session_id(),
                attendees: joined,
            });
        }
    }

    /// Inject a timestamped comment into the comment stream.
    pub fn add_comment(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let line = TranscriptLine::comment(text, TimestampTag::now());
        let rendered = line.render();
        let session_id = {
            let mut state = self.lock_state();
            state.comments.push(line);
            state.session_id.clone()
        };

        self.runtime.emit_data(SessionDataEvent::CommentAdded {
            session_id,
            line: rendered.clone(),
        });
        Some(rendered)
    }

    // ── Export surface ──────────────────────────────────────────────────

    /// The combined export: header block, then every stream merged
    /// chronologically, optionally scrubbed of interleaving duplicates.
    /// Newline-joined and ready for the clipboard or a file.
    pub fn combined_content(&self, apply_dedup: bool) -> String {
        let state = self.lock_state();
        self.combined_with(&state, apply_dedup)
    }

    pub fn content(&self, kind: ContentKind) -> String {
        let state = self.lock_state();
        match kind {
            ContentKind::Captions => render_lines(state.engine.history()),
            ContentKind::Chat => render_lines(&state.chat),
            ContentKind::Comments => render_lines(&state.comments),
            ContentKind::Combined => self.combined_with(&state, true),
        }
    }

    fn combined_with(&self, state: &State, apply_dedup: bool) -> String {
        let header = self.header_lines(state);
        let mut merged = timeline::merge(&[
            &header,
            state.engine.history(),
            &state.chat,
            &state.comments,
        ]);
        if apply_dedup {
            merged = timeline::scrub(&merged);
        }
        render_lines(&merged)
    }

    fn header_lines(&self, state: &State) -> Vec<TranscriptLine> {
        let mut lines = vec![
            TranscriptLine::header(format!(
                "{}[{}] - {}",
                timeline::TITLE_PREFIX,
                self.opened_on.format("%m-%d"),
                self.details.title,
            )),
            TranscriptLine::header(format!(
                "{}{}",
                timeline::DATE_PREFIX,
                self.opened_on.format("%m/%d"),
            )),
        ];
        if !state.attendees.is_empty() {
            lines.push(TranscriptLine::header(format!(
                "{}{}",
                timeline::ATTENDEES_PREFIX,
                state.attendees,
            )));
        }
        if state.notice_added {
            lines.push(TranscriptLine::header(timeline::CAPTION_NOTICE));
        }
        lines
    }

    // ── Persistence ─────────────────────────────────────────────────────

    fn snapshot(&self) -> Option<Session> {
        let state = self.lock_state();
        if state.engine.is_empty() && state.chat.is_empty() && state.comments.is_empty() {
            return None;
        }

        let mut session = Session::new(
            state.session_id.clone(),
            self.details.meeting_id.clone(),
            self.details.title.clone(),
            self.details.organizer.clone(),
        );
        session.created_at = state.created_at;
        session.buffers.captions = render_lines(state.engine.history());
        session.buffers.chat = render_lines(&state.chat);
        session.buffers.comments = render_lines(&state.comments);
        session.buffers.combined = self.combined_with(&state, true);
        Some(session)
    }

    /// Write the current snapshot to the primary store; on failure keep
    /// running and fall back to the cache. In-memory history stays
    /// authoritative either way.
    pub async fn persist(&self) {
        let Some(session) = self.snapshot() else {
            return;
        };

        match self.store.save(&session).await {
            Ok(()) => {}
            Err(e) => {
                let cached = self.write_cache_fallback(&session).await;
                tracing::warn!(error = %e, cached, "primary session save failed");
                self.runtime.emit_error(SessionErrorEvent::SaveFailed {
                    session_id: session.id.clone(),
                    error: e.to_string(),
                    cached,
                });
            }
        }
    }

    async fn write_cache_fallback(&self, session: &Session) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let mut any = false;
        for kind in ContentKind::ALL {
            let content = session.buffers.get(kind);
            if content.is_empty() {
                continue;
            }
            match cache.save(kind, content).await {
                Ok(written) => any |= written,
                Err(e) => tracing::warn!(error = %e, kind = kind.as_str(), "cache save failed"),
            }
        }
        any
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("capture state lock")
    }
}

fn render_lines(lines: &[TranscriptLine]) -> String {
    lines.iter().map(TranscriptLine::render).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ScriptedAdapter;
    use crate::events::NullRuntime;
    use meetcap_storage::{BoxFuture, Result as StorageResult};
    use meetcap_transcript::CaptionFragment;
    use std::collections::HashMap;

    /// In-memory store standing in for the filesystem store.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        sessions: Mutex<HashMap<String, Session>>,
    }

    impl MemoryStore {
        pub(crate) fn session_count(&self) -> usize {
            self.sessions.lock().unwrap().len()
        }
    }

    impl SessionStore for MemoryStore {
        fn save<'a>(&'a self, session: &'a Session) -> BoxFuture<'a, StorageResult<()>> {
            Box::pin(async {
                self.sessions
                    .lock()
                    .unwrap()
                    .insert(session.id.clone(), session.clone());
                Ok(())
            })
        }

        fn load_most_recent_matching<'a>(
            &'a self,
            meeting_id: &'a str,
        ) -> BoxFuture<'a, StorageResult<Option<Session>>> {
            Box::pin(async move {
                Ok(self
                    .sessions
                    .lock()
                    .unwrap()
                    .values()
                    .filter(|s| s.meeting_id == meeting_id && s.has_content())
                    .max_by_key(|s| s.updated_at)
                    .cloned())
            })
        }

        fn delete<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, StorageResult<()>> {
            Box::pin(async move {
                self.sessions.lock().unwrap().remove(session_id);
                Ok(())
            })
        }

        fn cleanup_older_than(
            &self,
            max_age: chrono::Duration,
        ) -> BoxFuture<'_, StorageResult<usize>> {
            Box::pin(async move {
                let cutoff = Utc::now() - max_age;
                let mut sessions = self.sessions.lock().unwrap();
                let before = sessions.len();
                sessions.retain(|_, s| s.updated_at >= cutoff);
                Ok(before - sessions.len())
            })
        }
    }

    fn details() -> MeetingDetails {
        MeetingDetails {
            meeting_id: "1234567890".into(),
            title: "Weekly Sync".into(),
            organizer: Some("Ana Silva".into()),
        }
    }

    fn new_session(adapter: Arc<ScriptedAdapter>, store: Arc<MemoryStore>) -> Arc<CaptureSession> {
        Arc::new(CaptureSession::new(
            details(),
            adapter,
            Arc::new(NullRuntime),
            store,
            CaptureConfig::default(),
        ))
    }

    #[tokio::test]
    async fn caption_tick_reconciles_fragments() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter.clone(), Arc::new(MemoryStore::default()));

        adapter.push_caption_batch(vec![
            CaptionFragment::new("Hetz, Doron", "This is a test 12"),
            CaptionFragment::new("Hetz, Doron", "This is a test, 123."),
        ]);
        session.capture_captions().await;

        let captions = session.content(ContentKind::Captions);
        assert_eq!(captions.lines().count(), 1);
        assert!(captions.contains("This is a test, 123."));
    }

    #[tokio::test]
    async fn system_caption_becomes_header_notice() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter.clone(), Arc::new(MemoryStore::default()));

        adapter.push_caption_batch(vec![
            CaptionFragment::new("Feed", "Machine generated captions are enabled for this call"),
            CaptionFragment::new("Silva, Ana", "actual spoken content here"),
        ]);
        session.capture_captions().await;

        assert_eq!(session.content(ContentKind::Captions).lines().count(), 1);
        assert!(session.combined_content(true).contains(timeline::CAPTION_NOTICE));
    }

    #[tokio::test]
    async fn chat_tick_deduplicates_by_content() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter.clone(), Arc::new(MemoryStore::default()));

        let message = || ChatMessage {
            sender: "Ben Okafor".into(),
            text: "link is in the doc".into(),
            sent_at: TimestampTag::from_hms(10, 0, 1),
        };
        adapter.push_chat_batch(vec![message(), message()]);
        adapter.push_chat_batch(vec![message()]);

        session.capture_chat().await;
        session.capture_chat().await;

        assert_eq!(session.content(ContentKind::Chat).lines().count(), 1);
    }

    #[tokio::test]
    async fn attendees_change_is_tracked_sorted() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter.clone(), Arc::new(MemoryStore::default()));

        adapter.set_attendees(vec!["Okafor, Ben".into(), "Silva, Ana".into()]);
        session.refresh_attendees().await;

        let combined = session.combined_content(false);
        assert!(combined.contains("Attendees: Ana Silva, Ben Okafor"));
    }

    #[tokio::test]
    async fn comment_is_injected_with_timestamp() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter, Arc::new(MemoryStore::default()));

        assert!(session.add_comment("  ").is_none());
        let rendered = session.add_comment("follow up on budget").unwrap();
        assert!(rendered.contains("[Injected Comment]: follow up on budget"));
        assert_eq!(session.content(ContentKind::Comments).lines().count(), 1);
    }

    #[tokio::test]
    async fn export_is_idempotent() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter.clone(), Arc::new(MemoryStore::default()));

        adapter.push_caption_batch(vec![
            CaptionFragment::new("Silva, Ana", "we agreed to ship on thursday"),
            CaptionFragment::new("Okafor, Ben", "sounds right to me"),
        ]);
        session.capture_captions().await;

        let first = session.combined_content(true);
        let second = session.combined_content(true);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn header_precedes_content_in_export() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter.clone(), Arc::new(MemoryStore::default()));

        adapter.push_caption_batch(vec![CaptionFragment::new("Silva, Ana", "hello world today")]);
        session.capture_captions().await;

        let combined = session.combined_content(true);
        let lines: Vec<&str> = combined.lines().collect();
        assert!(lines[0].starts_with(timeline::TITLE_PREFIX));
        assert!(lines[1].starts_with(timeline::DATE_PREFIX));
        assert!(lines.last().unwrap().contains("hello world today"));
    }

    #[tokio::test]
    async fn persist_and_resume_round_trip() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let store = Arc::new(MemoryStore::default());
        let session = new_session(adapter.clone(), store.clone());

        adapter.push_caption_batch(vec![
            CaptionFragment::new("Silva, Ana", "the numbers look good this quarter"),
        ]);
        adapter.push_chat_batch(vec![ChatMessage {
            sender: "Ben Okafor".into(),
            text: "agreed, shipping it".into(),
            sent_at: TimestampTag::from_hms(10, 0, 3),
        }]);
        session.capture_captions().await;
        session.capture_chat().await;
        session.add_comment("decision recorded");
        session.persist().await;
        assert_eq!(store.session_count(), 1);

        let resumed = new_session(adapter.clone(), store.clone());
        assert!(resumed.resume().await.unwrap());
        assert_eq!(resumed.session_id(), session.session_id());
        assert!(
            resumed
                .content(ContentKind::Captions)
                .contains("the numbers look good this quarter")
        );
        assert!(resumed.content(ContentKind::Chat).contains("agreed, shipping it"));
        assert!(resumed.content(ContentKind::Comments).contains("decision recorded"));

        // Fragments persisted by the previous run stay fingerprinted.
        adapter.push_caption_batch(vec![
            CaptionFragment::new("Silva, Ana", "the numbers look good this quarter"),
        ]);
        resumed.capture_captions().await;
        assert_eq!(resumed.content(ContentKind::Captions).lines().count(), 1);
    }

    #[tokio::test]
    async fn resume_without_persisted_session_is_clean() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let session = new_session(adapter, Arc::new(MemoryStore::default()));
        assert!(!session.resume().await.unwrap());
        assert!(!session.has_content());
    }

    #[tokio::test]
    async fn persist_without_content_saves_nothing() {
        let adapter = Arc::new(ScriptedAdapter::new(details()));
        let store = Arc::new(MemoryStore::default());
        let session = new_session(adapter, store.clone());

        session.persist().await;
        assert_eq!(store.session_count(), 0);
    }
}
