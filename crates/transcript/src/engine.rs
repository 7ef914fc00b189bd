//! # Per-speaker caption reconciliation
//!
//! The caption feed is noisy: the same utterance arrives as a growing
//! prefix, an in-place correction, or a verbatim repeat on every poll
//! tick. Each incoming `(speaker, text)` pair is decided against that
//! speaker's recent history: appended as new content, merged into the
//! line it revises, or discarded as redundant.
//!
//! ## Decision ladder
//!
//! For each candidate, most recent first:
//! exact equality → discard; word-prefix extension → merge keeping the
//! longer side; short utterances (≤ 3 tokens) are otherwise never
//! fuzzy-merged, since `"Yes."` after an unrelated line is a genuine
//! interjection, not a correction; for two longer texts, raw prefix
//! containment keeps the longer line, then the similarity matcher
//! decides whether the newer text is a correction of the older.
//!
//! A merge replaces the superseded line's content and timestamp in
//! place, preserving its position in the ordered history. Older entries
//! outside the recency window are presumed settled and never revisited,
//! which also bounds each decision to O(window).

use crate::fingerprint::FingerprintSet;
use crate::matcher::SimilarityMatcher;
use crate::normalize::word_count;
use crate::timestamp::TimestampTag;
use crate::types::{CaptionFragment, LineKind, TranscriptLine, display_speaker_name};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many recent same-speaker lines are considered as merge
    /// candidates. Older lines are settled.
    pub recency_window: usize,
    /// Utterances at or below this token count are treated as
    /// interjections and never fuzzy-merged.
    pub short_message_tokens: usize,
    /// Fingerprint set capacity before eviction.
    pub fingerprint_max: usize,
    /// Fingerprints retained after eviction.
    pub fingerprint_keep: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recency_window: 5,
            short_message_tokens: 3,
            fingerprint_max: FingerprintSet::DEFAULT_MAX,
            fingerprint_keep: FingerprintSet::DEFAULT_KEEP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    Appended,
    Merged,
    Discarded,
}

/// What one `reconcile` call did. `index`/`line` identify the affected
/// history entry for appends and merges; discards touch nothing.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,
    pub index: Option<usize>,
    pub line: Option<TranscriptLine>,
}

impl ReconcileOutcome {
    fn discarded() -> Self {
        Self {
            action: ReconcileAction::Discarded,
            index: None,
            line: None,
        }
    }
}

enum Decision {
    Merge(usize),
    Discard,
    Append,
}

pub struct ReconciliationEngine {
    config: EngineConfig,
    matcher: SimilarityMatcher,
    history: Vec<TranscriptLine>,
    fingerprints: FingerprintSet,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), SimilarityMatcher::default())
    }

    pub fn with_config(config: EngineConfig, matcher: SimilarityMatcher) -> Self {
        let fingerprints = FingerprintSet::with_bounds(config.fingerprint_max, config.fingerprint_keep);
        Self {
            config,
            matcher,
            history: Vec::new(),
            fingerprints,
        }
    }

    pub fn history(&self) -> &[TranscriptLine] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn reconcile_fragment(&mut self, fragment: &CaptionFragment) -> ReconcileOutcome {
        self.reconcile(
            &fragment.speaker,
            &fragment.text,
            TimestampTag::from_time(fragment.observed_at.time()),
        )
    }

    /// Decide one observation. Malformed input (blank text) is discarded
    /// silently; a speaker that does not match the `"Last, First"`
    /// convention is used as-is.
    pub fn reconcile(&mut self, speaker: &str, text: &str, tag: TimestampTag) -> ReconcileOutcome {
        let text = text.trim();
        if text.is_empty() {
            return ReconcileOutcome::discarded();
        }

        let speaker = display_speaker_name(speaker);

        let fingerprint = format!("{speaker}:{text}");
        if !self.fingerprints.insert(&fingerprint) {
            return ReconcileOutcome::discarded();
        }

        match self.decide(&speaker, text) {
            Decision::Discard => ReconcileOutcome::discarded(),
            Decision::Merge(index) => {
                let line = &mut self.history[index];
                line.text = text.to_string();
                line.tag = tag;
                ReconcileOutcome {
                    action: ReconcileAction::Merged,
                    index: Some(index),
                    line: Some(line.clone()),
                }
            }
            Decision::Append => {
                let line = TranscriptLine::transcript(speaker, text, tag);
                self.history.push(line.clone());
                ReconcileOutcome {
                    action: ReconcileAction::Appended,
                    index: Some(self.history.len() - 1),
                    line: Some(line),
                }
            }
        }
    }

    /// Re-seat a line when rebuilding from persisted content. Transcript
    /// lines also reseed the fingerprint set so a restarted capture does
    /// not duplicate what the feed still displays.
    pub fn restore_line(&mut self, line: TranscriptLine) {
        if line.kind == LineKind::Transcript {
            self.fingerprints.insert(&format!("{}:{}", line.speaker, line.text));
        }
        self.history.push(line);
    }

    fn decide(&self, speaker: &str, text: &str) -> Decision {
        let short = self.config.short_message_tokens;
        let current_is_short = word_count(text) <= short;

        let mut considered = 0;
        for index in (0..self.history.len()).rev() {
            let line = &self.history[index];
            if line.kind != LineKind::Transcript || line.speaker != speaker {
                continue;
            }
            considered += 1;
            if considered > self.config.recency_window {
                break;
            }

            let candidate = line.text.as_str();

            if text == candidate {
                return Decision::Discard;
            }

            if current_is_short {
                if extends_word_prefix(candidate, text) {
                    return Decision::Discard;
                }
                if extends_word_prefix(text, candidate) {
                    return Decision::Merge(index);
                }
                continue;
            }

            if word_count(candidate) <= short {
                if extends_word_prefix(text, candidate) {
                    return Decision::Merge(index);
                }
                continue;
            }

            // Raw prefix containment before the fuzzy matcher, so a
            // correction can never truncate a longer settled line.
            if text.starts_with(candidate) {
                return Decision::Merge(index);
            }
            if candidate.starts_with(text) {
                return Decision::Discard;
            }

            if self.matcher.matches(candidate, text) {
                return Decision::Merge(index);
            }
        }

        Decision::Append
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Does `longer` start with `shorter` followed by a word boundary?
/// `"Hi there"` extends `"Hi"`, but `"Yesterday"` does not extend `"Yes"`.
fn extends_word_prefix(longer: &str, shorter: &str) -> bool {
    longer.len() > shorter.len()
        && longer.starts_with(shorter)
        && longer.as_bytes()[shorter.len()] == b' '
}
