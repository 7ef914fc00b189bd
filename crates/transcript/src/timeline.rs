//! Combining independently-captured streams into one timeline.
//!
//! Captions, chat, and injected comments are each deduplicated on their
//! own as they are captured, but interleaving them for export can put
//! near-duplicates next to each other that no per-stream pass could see.
//! [`merge`] orders everything by timestamp tag; [`scrub`] walks the
//! merged sequence once more and drops what the interleaving reintroduced.

use std::collections::HashMap;

use crate::normalize::word_count;
use crate::types::{LineKind, TranscriptLine};

/// Header-block markers. The header is detected by prefix, never by
/// content similarity, and always hoists to the front of a merge.
pub const TITLE_PREFIX: &str = "Meeting Title: ";
pub const DATE_PREFIX: &str = "Meeting Date: ";
pub const ATTENDEES_PREFIX: &str = "Attendees: ";

/// Notice emitted once per session when the feed announces that captions
/// are machine generated.
pub const CAPTION_NOTICE: &str =
    "Machine generated captions are produced by the transcription service.";

pub fn is_header_line(line: &str) -> bool {
    line.starts_with(TITLE_PREFIX)
        || line.starts_with(DATE_PREFIX)
        || line.starts_with(ATTENDEES_PREFIX)
        || line == CAPTION_NOTICE
}

/// Merge ordered streams into one timeline.
///
/// Header lines hoist to the front in encounter order. Everything else
/// stable-sorts by timestamp tag; ties break by stream position, then by
/// intra-stream position, so the merge is fully deterministic.
pub fn merge(streams: &[&[TranscriptLine]]) -> Vec<TranscriptLine> {
    let mut header = Vec::new();
    let mut entries: Vec<(usize, usize, &TranscriptLine)> = Vec::new();

    for (stream_idx, stream) in streams.iter().enumerate() {
        for (intra_idx, line) in stream.iter().enumerate() {
            if line.kind == LineKind::Header {
                header.push(line.clone());
            } else {
                entries.push((stream_idx, intra_idx, line));
            }
        }
    }

    entries.sort_by_key(|(stream_idx, intra_idx, line)| (line.tag, *stream_idx, *intra_idx));

    header
        .into_iter()
        .chain(entries.into_iter().map(|(_, _, line)| line.clone()))
        .collect()
}

/// Post-merge duplicate scrub.
///
/// Walks the merged sequence keeping, per speaker, the last few emitted
/// transcript lines. A short line is always kept; a line equal to or
/// contained in a recently kept same-speaker line is dropped unless it is
/// the longer of the two. Chat, comments, and header/system lines pass
/// through untouched. Running the scrub twice changes nothing.
pub fn scrub(lines: &[TranscriptLine]) -> Vec<TranscriptLine> {
    const RECENT_PER_SPEAKER: usize = 5;
    const SHORT_TOKENS: usize = 3;

    let mut kept: Vec<TranscriptLine> = Vec::with_capacity(lines.len());
    let mut recent: HashMap<&str, Vec<&str>> = HashMap::new();

    for line in lines {
        if line.kind != LineKind::Transcript {
            kept.push(line.clone());
            continue;
        }

        let text = line.text.as_str();
        let speaker_recent = recent.entry(line.speaker.as_str()).or_default();

        let duplicate = word_count(text) > SHORT_TOKENS
            && speaker_recent.iter().any(|prev| {
                text == *prev
                    || ((text.contains(*prev) || prev.contains(text)) && text.len() <= prev.len())
            });

        if duplicate {
            continue;
        }

        speaker_recent.push(text);
        if speaker_recent.len() > RECENT_PER_SPEAKER {
            speaker_recent.remove(0);
        }
        kept.push(line.clone());
    }

    kept
}
