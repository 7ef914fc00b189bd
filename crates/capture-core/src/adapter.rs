//! The boundary to the live feed.
//!
//! Everything page-specific (selectors, retries against a half-rendered
//! DOM, markup stripping) lives behind [`CaptureAdapter`]. The capture
//! loop only ever sees plain-text speaker and caption strings; a tick
//! where the feed was not readable is an empty batch, not an error.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use meetcap_transcript::{CaptionFragment, TimestampTag};

use crate::{BoxFuture, Error, Result};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MeetingDetails {
    pub meeting_id: String,
    pub title: String,
    pub organizer: Option<String>,
}

/// One chat message as the feed displays it. `sent_at` is the feed's own
/// timestamp when one was shown; the capture loop falls back to the
/// observation time when it is missing.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub sent_at: Option<TimestampTag>,
}

pub trait CaptureAdapter: Send + Sync + 'static {
    /// All `(speaker, text)` pairs currently visible in the caption
    /// region. The same pair may be returned on every tick; the engine's
    /// fingerprinting makes that idempotent.
    fn poll_captions(&self) -> BoxFuture<'_, Vec<CaptionFragment>>;

    /// All chat messages currently visible.
    fn poll_chat(&self) -> BoxFuture<'_, Vec<ChatMessage>>;

    /// Meeting metadata, once the feed exposes it. `None` while the
    /// meeting has not been joined yet.
    fn meeting_details(&self) -> BoxFuture<'_, Option<MeetingDetails>>;

    /// Current attendee display names, unordered.
    fn attendees(&self) -> BoxFuture<'_, Vec<String>>;
}

/// Poll the adapter for meeting details with bounded retries. The feed
/// takes a while to render its metadata after join; callers block on
/// this before opening a session.
pub async fn wait_for_meeting_details(
    adapter: &dyn CaptureAdapter,
    attempts: u32,
    delay: Duration,
) -> Result<MeetingDetails> {
    for attempt in 0..attempts {
        if let Some(details) = adapter.meeting_details().await {
            return Ok(details);
        }
        tracing::debug!(attempt, "meeting details not available yet");
        tokio::time::sleep(delay).await;
    }
    Err(Error::MeetingDetailsUnavailable { attempts })
}

/// Scripted feed for tests and replays: each poll pops the next batch.
pub struct ScriptedAdapter {
    details: Option<MeetingDetails>,
    details_ready_after: AtomicU32,
    captions: Mutex<VecDeque<Vec<CaptionFragment>>>,
    chat: Mutex<VecDeque<Vec<ChatMessage>>>,
    attendees: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new(details: MeetingDetails) -> Self {
        Self {
            details: Some(details),
            details_ready_after: AtomicU32::new(0),
            captions: Mutex::new(VecDeque::new()),
            chat: Mutex::new(VecDeque::new()),
            attendees: Mutex::new(Vec::new()),
        }
    }

    /// Report no details for the first `polls` calls, like a feed that
    /// has not finished joining.
    pub fn with_details_ready_after(mut self, polls: u32) -> Self {
        self.details_ready_after = AtomicU32::new(polls);
        self
    }

    pub fn push_caption_batch(&self, batch: Vec<CaptionFragment>) {
        self.captions.lock().expect("scripted captions lock").push_back(batch);
    }

    pub fn push_chat_batch(&self, batch: Vec<ChatMessage>) {
        self.chat.lock().expect("scripted chat lock").push_back(batch);
    }

    pub fn set_attendees(&self, attendees: Vec<String>) {
        *self.attendees.lock().expect("scripted attendees lock") = attendees;
    }
}

impl CaptureAdapter for ScriptedAdapter {
    fn poll_captions(&self) -> BoxFuture<'_, Vec<CaptionFragment>> {
        Box::pin(async {
            self.captions
                .lock()
                .expect("scripted captions lock")
                .pop_front()
                .unwrap_or_default()
        })
    }

    fn poll_chat(&self) -> BoxFuture<'_, Vec<ChatMessage>> {
        Box::pin(async {
            self.chat
                .lock()
                .expect("scripted chat lock")
                .pop_front()
                .unwrap_or_default()
        })
    }

    fn meeting_details(&self) -> BoxFuture<'_, Option<MeetingDetails>> {
        Box::pin(async {
            let remaining = self.details_ready_after.load(Ordering::Relaxed);
            if remaining > 0 {
                self.details_ready_after.store(remaining - 1, Ordering::Relaxed);
                return None;
            }
            self.details.clone()
        })
    }

    fn attendees(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async { self.attendees.lock().expect("scripted attendees lock").clone() })
    }
}
