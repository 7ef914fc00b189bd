use chrono::{DateTime, Local};

use crate::timestamp::TimestampTag;

/// One raw observation from the capture source: possibly partial,
/// corrected, or a verbatim repeat of something already seen.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CaptionFragment {
    pub speaker: String,
    pub text: String,
    pub observed_at: DateTime<Local>,
}

impl CaptionFragment {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            observed_at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Transcript,
    Chat,
    Comment,
    System,
    Header,
}

/// One rendered/stored unit of history.
///
/// The timestamp tag is carried alongside the text, never recovered from
/// it; [`TranscriptLine::parse_rendered`] re-derives both only when
/// rebuilding state from persisted text.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptLine {
    pub speaker: String,
    pub text: String,
    pub tag: TimestampTag,
    pub kind: LineKind,
}

impl TranscriptLine {
    pub fn transcript(speaker: impl Into<String>, text: impl Into<String>, tag: TimestampTag) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            tag,
            kind: LineKind::Transcript,
        }
    }

    pub fn chat(sender: impl Into<String>, text: impl Into<String>, tag: TimestampTag) -> Self {
        Self {
            speaker: sender.into(),
            text: text.into(),
            tag,
            kind: LineKind::Chat,
        }
    }

    pub fn comment(text: impl Into<String>, tag: TimestampTag) -> Self {
        Self {
            speaker: String::new(),
            text: text.into(),
            tag,
            kind: LineKind::Comment,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            speaker: String::new(),
            text: text.into(),
            tag: TimestampTag::now(),
            kind: LineKind::System,
        }
    }

    pub fn header(text: impl Into<String>) -> Self {
        Self {
            speaker: String::new(),
            text: text.into(),
            tag: TimestampTag::now(),
            kind: LineKind::Header,
        }
    }

    /// The exact persisted/exported form of this line.
    pub fn render(&self) -> String {
        match self.kind {
            LineKind::Transcript => {
                format!("{} {}: {}", self.speaker, self.tag.render_bracketed(), self.text)
            }
            LineKind::Chat => {
                format!("{} - {}: {}", self.tag.render_bracketed(), self.speaker, self.text)
            }
            LineKind::Comment => {
                format!("{} - [Injected Comment]: {}", self.tag.render_bracketed(), self.text)
            }
            LineKind::System | LineKind::Header => self.text.clone(),
        }
    }

    /// Rebuild a line from its rendered form.
    ///
    /// Total: a line that matches no known shape comes back as a system
    /// line holding the raw text, tagged "now". Resumed content is never
    /// dropped just because its format drifted.
    pub fn parse_rendered(line: &str) -> Self {
        if crate::timeline::is_header_line(line) {
            return Self::header(line);
        }

        if let Some(tag) = TimestampTag::extract(line) {
            // Chat and comment lines lead with the tag.
            if line.trim_start().starts_with('[') {
                if let Some((prefix, text)) = line.split_once(": ") {
                    let after_tag = prefix.split_once("] - ").map(|(_, s)| s).unwrap_or("");
                    if after_tag == "[Injected Comment]" {
                        return Self::comment(text, tag);
                    }
                    if !after_tag.is_empty() {
                        return Self::chat(after_tag, text, tag);
                    }
                }
            } else if let Some(open) = line.find(" [") {
                // Transcript lines: "Speaker [tag]: text".
                let speaker = line[..open].to_string();
                if let Some((_, text)) = line[open..].split_once("]: ") {
                    return Self::transcript(speaker, text, tag);
                }
            }
        }

        Self::system(line)
    }
}

/// Normalize a raw display name from the `"Last, First"` convention to
/// `"First Last"`. Anything that is not exactly one comma-separated pair
/// passes through unchanged; never fails on odd names.
pub fn display_speaker_name(raw: &str) -> String {
    let parts: Vec<&str> = raw.split(", ").collect();
    match parts.as_slice() {
        [last, first] => format!("{first} {last}"),
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(h: u32, m: u32, s: u32) -> TimestampTag {
        TimestampTag::from_hms(h, m, s).unwrap()
    }

    #[test]
    fn speaker_name_swaps_single_comma_pair() {
        assert_eq!(display_speaker_name("Hetz, Doron"), "Doron Hetz");
    }

    #[test]
    fn speaker_name_passes_through_other_shapes() {
        assert_eq!(display_speaker_name("Ana Silva"), "Ana Silva");
        assert_eq!(display_speaker_name("Team, Core, Infra"), "Team, Core, Infra");
        assert_eq!(display_speaker_name(""), "");
    }

    #[test]
    fn transcript_line_renders_speaker_tag_text() {
        let line = TranscriptLine::transcript("Doron Hetz", "This is a test", tag(10, 0, 5));
        assert_eq!(line.render(), "Doron Hetz [10:00:05 AM]: This is a test");
    }

    #[test]
    fn chat_line_renders_tag_first() {
        let line = TranscriptLine::chat("Ana Silva", "sounds good", tag(14, 30, 9));
        assert_eq!(line.render(), "[2:30:09 PM] - Ana Silva: sounds good");
    }

    #[test]
    fn comment_line_renders_marker() {
        let line = TranscriptLine::comment("action item: ship it", tag(9, 1, 0));
        assert_eq!(line.render(), "[9:01:00 AM] - [Injected Comment]: action item: ship it");
    }

    #[test]
    fn parse_rendered_round_trips_transcript() {
        let original = TranscriptLine::transcript("Doron Hetz", "hello there", tag(10, 0, 5));
        let parsed = TranscriptLine::parse_rendered(&original.render());
        assert_eq!(parsed.kind, LineKind::Transcript);
        assert_eq!(parsed.speaker, "Doron Hetz");
        assert_eq!(parsed.text, "hello there");
        assert_eq!(parsed.tag, original.tag);
    }

    #[test]
    fn parse_rendered_round_trips_chat_and_comment() {
        let chat = TranscriptLine::chat("Ana Silva", "ok: noted", tag(11, 2, 3));
        let parsed = TranscriptLine::parse_rendered(&chat.render());
        assert_eq!(parsed.kind, LineKind::Chat);
        assert_eq!(parsed.speaker, "Ana Silva");
        assert_eq!(parsed.text, "ok: noted");

        let comment = TranscriptLine::comment("remember this", tag(11, 2, 4));
        let parsed = TranscriptLine::parse_rendered(&comment.render());
        assert_eq!(parsed.kind, LineKind::Comment);
        assert_eq!(parsed.text, "remember this");
    }

    #[test]
    fn parse_rendered_accepts_legacy_minute_tags() {
        let parsed = TranscriptLine::parse_rendered("Ana Silva [10:30 AM]: legacy line");
        assert_eq!(parsed.kind, LineKind::Transcript);
        assert_eq!(parsed.tag, tag(10, 30, 0));
    }

    #[test]
    fn parse_rendered_keeps_unknown_shapes() {
        let parsed = TranscriptLine::parse_rendered("free-form note without tags");
        assert_eq!(parsed.kind, LineKind::System);
        assert_eq!(parsed.text, "free-form note without tags");
    }

    #[test]
    fn line_serializes_with_lowercase_kind() {
        let line = TranscriptLine::transcript("Doron Hetz", "hello", tag(10, 0, 5));
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["kind"], "transcript");

        let back: TranscriptLine = serde_json::from_value(json).unwrap();
        assert_eq!(back.render(), line.render());
    }
}
