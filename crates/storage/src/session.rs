//! The persisted, resumable unit of captured content.

use chrono::{DateTime, NaiveDate, Utc};

/// Suffix baked into every session identifier and export filename.
const ID_SUFFIX: &str = "MoM";

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Captions,
    Chat,
    Comments,
    Combined,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Captions,
        ContentKind::Chat,
        ContentKind::Comments,
        ContentKind::Combined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Captions => "captions",
            ContentKind::Chat => "chat",
            ContentKind::Comments => "comments",
            ContentKind::Combined => "combined",
        }
    }
}

/// Parallel newline-joined content buffers, one per stream plus the
/// precomputed combined export.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContentBuffers {
    pub captions: String,
    pub chat: String,
    pub comments: String,
    pub combined: String,
}

impl ContentBuffers {
    pub fn get(&self, kind: ContentKind) -> &str {
        match kind {
            ContentKind::Captions => &self.captions,
            ContentKind::Chat => &self.chat,
            ContentKind::Comments => &self.comments,
            ContentKind::Combined => &self.combined,
        }
    }

    pub fn set(&mut self, kind: ContentKind, content: String) {
        match kind {
            ContentKind::Captions => self.captions = content,
            ContentKind::Chat => self.chat = content,
            ContentKind::Comments => self.comments = content,
            ContentKind::Combined => self.combined = content,
        }
    }

    /// True when no stream holds any content. The combined buffer is
    /// derived, so it does not count.
    pub fn is_empty(&self) -> bool {
        self.captions.trim().is_empty()
            && self.chat.trim().is_empty()
            && self.comments.trim().is_empty()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Session {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub organizer: Option<String>,
    pub buffers: ContentBuffers,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, meeting_id: String, title: String, organizer: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            meeting_id,
            title,
            organizer,
            buffers: ContentBuffers::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_content(&self) -> bool {
        !self.buffers.is_empty()
    }
}

/// Deterministic session identifier. The format is bit-exact across
/// runs so a reloaded capture can find its previous session:
/// `[MM-DD] - Title - MoM - 1234567890`.
pub fn session_id(date: NaiveDate, title: &str, meeting_id: &str) -> String {
    let meeting_id: String = meeting_id.split_whitespace().collect();
    format!(
        "[{}] - {} - {ID_SUFFIX} - {meeting_id}",
        date.format("%m-%d"),
        sanitize_title(title),
    )
}

/// Filename stem for exported transcripts: the session id without the
/// meeting id.
pub fn export_file_stem(date: NaiveDate, title: &str) -> String {
    format!("[{}] - {} - {ID_SUFFIX}", date.format("%m-%d"), sanitize_title(title))
}

/// Map forbidden filesystem characters to `-`, collapse whitespace and
/// `-` runs, trim the edges, truncate to 200 characters.
pub fn sanitize_title(raw: &str) -> String {
    const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', ','];

    let mapped: String = raw
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { '-' } else { c })
        .collect();
    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::with_capacity(collapsed.len());
    let mut prev_dash = false;
    for c in collapsed.chars() {
        if c == '-' {
            if prev_dash {
                continue;
            }
            prev_dash = true;
        } else {
            prev_dash = false;
        }
        out.push(c);
    }

    out.trim_matches(|c: char| c == '-' || c.is_whitespace())
        .chars()
        .take(MAX_TITLE_LEN)
        .collect()
}
