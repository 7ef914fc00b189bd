//! Fuzzy matching between two observations of the same utterance.
//!
//! Live captions are revised in place (ASR correcting earlier words) or
//! extended (more words appended) far more often than replaced outright.
//! The layered tests below trade recall for precision as string length
//! grows: short strings carry too little signal for overlap statistics,
//! so they only match exactly or by prefix.

use crate::normalize::{char_prefix, meaningful_words, normalize};

/// How aggressively [`SimilarityMatcher::matches`] merges.
///
/// `Loose` applies the layered fuzzy tests only. `Strict` additionally
/// recognizes small grammatical edits (word reordering, leading filler
/// removal, article insertion) the way transcript cleanup needs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Loose,
    Strict,
}

/// Tunable thresholds. These are empirical, not contracts; the defaults
/// are the superset of what worked in production capture sessions.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Both strings must exceed this length before the core-overlap test runs.
    pub core_overlap_min_len: usize,
    /// Characters of trailing drift tolerated by the core-overlap test.
    pub core_slack: usize,
    /// Lower bound on the core comparison length, so the test never
    /// degenerates into comparing a handful of characters.
    pub core_floor: usize,
    /// Both strings must exceed this length before word-overlap scoring runs.
    pub word_overlap_min_len: usize,
    /// Minimum fraction of the shorter side's content words that must
    /// appear in the longer side.
    pub word_overlap_ratio: f64,
    /// Minimum absolute count of shared content words, guarding against
    /// short-list false positives.
    pub word_overlap_min_shared: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            core_overlap_min_len: 10,
            core_slack: 5,
            core_floor: 10,
            word_overlap_min_len: 15,
            word_overlap_ratio: 0.7,
            word_overlap_min_shared: 3,
        }
    }
}

pub struct SimilarityMatcher {
    config: MatcherConfig,
    strictness: Strictness,
}

impl SimilarityMatcher {
    pub fn new(strictness: Strictness) -> Self {
        Self::with_config(strictness, MatcherConfig::default())
    }

    pub fn with_config(strictness: Strictness, config: MatcherConfig) -> Self {
        Self { config, strictness }
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// One entry point for the engine: fuzzy match, plus the correction
    /// rules when the matcher is `Strict`.
    pub fn matches(&self, previous: &str, current: &str) -> bool {
        if self.is_match(previous, current) {
            return true;
        }
        match self.strictness {
            Strictness::Loose => false,
            Strictness::Strict => self.is_auto_correction(current, previous),
        }
    }

    /// Layered fuzzy test: exact normalized equality, prefix relation,
    /// core overlap, word-overlap scoring. Short-circuits on first hit.
    pub fn is_match(&self, previous: &str, current: &str) -> bool {
        let a = normalize(previous);
        let b = normalize(current);

        if a == b {
            return true;
        }

        if a.starts_with(&b) || b.starts_with(&a) {
            return true;
        }

        let (a_len, b_len) = (a.chars().count(), b.chars().count());

        if a_len > self.config.core_overlap_min_len && b_len > self.config.core_overlap_min_len {
            let min_len = a_len.min(b_len);
            let comparison_len = min_len
                .saturating_sub(self.config.core_slack)
                .max(self.config.core_floor);

            let a_core = char_prefix(&a, comparison_len);
            let b_core = char_prefix(&b, comparison_len);

            if a_core == b_core || a.contains(b_core) || b.contains(a_core) {
                return true;
            }
        }

        if a_len > self.config.word_overlap_min_len && b_len > self.config.word_overlap_min_len {
            let a_words = meaningful_words(&a);
            let b_words = meaningful_words(&b);

            let (shorter, longer) = if a_words.len() <= b_words.len() {
                (&a_words, &b_words)
            } else {
                (&b_words, &a_words)
            };
            if shorter.is_empty() {
                return false;
            }

            let shared = shorter.iter().filter(|w| longer.contains(w)).count();
            let ratio = shared as f64 / shorter.len() as f64;

            return ratio >= self.config.word_overlap_ratio
                && shared >= self.config.word_overlap_min_shared;
        }

        false
    }

    /// Does `current` look like an in-place correction of `previous`?
    ///
    /// Corrections frequently manifest as small grammatical edits rather
    /// than pure prefix growth: a word swapped, a leading filler dropped,
    /// an article inserted. Identical strings are *not* corrections.
    pub fn is_auto_correction(&self, current: &str, previous: &str) -> bool {
        if current == previous {
            return false;
        }

        let a = normalize(current);
        let b = normalize(previous);
        if a == b {
            return true;
        }

        let a_words: Vec<&str> = a.split_whitespace().collect();
        let b_words: Vec<&str> = b.split_whitespace().collect();

        if a_words.len().abs_diff(b_words.len()) > 2 {
            return false;
        }

        let min_len = a_words.len().min(b_words.len());
        if min_len == 0 {
            return false;
        }

        // Word-for-word match ignoring position: grammar corrections
        // shuffle words without changing them.
        let matching = a_words.iter().filter(|w| b_words.contains(w)).count();
        if matching as f64 / min_len as f64 >= 0.7 {
            return true;
        }

        // Leading filler word removed.
        if a_words.len() > 1 && b_words.len() > 1 {
            if a_words[1..] == b_words[..] || b_words[1..] == a_words[..] {
                return true;
            }
        }

        // One article inserted or removed.
        if a_words.len().abs_diff(b_words.len()) == 1 {
            let (longer, shorter) = if a_words.len() > b_words.len() {
                (&a_words, &b_words)
            } else {
                (&b_words, &a_words)
            };
            for article in ["a", "an", "the"] {
                if let Some(pos) = longer.iter().position(|w| *w == article) {
                    if !shorter.contains(&article) {
                        let mut without = longer.clone();
                        without.remove(pos);
                        if without == *shorter {
                            return true;
                        }
                    }
                }
            }
        }

        let matching_prefix = a_words
            .iter()
            .zip(b_words.iter())
            .take_while(|(x, y)| x == y)
            .count();

        // Short phrases sharing their first word are revisions of each other.
        if a_words.len() <= 3 && b_words.len() <= 4 && matching_prefix >= 1 {
            return true;
        }

        min_len > 1 && matching_prefix >= 3.min(min_len - 1)
    }
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self::new(Strictness::Strict)
    }
}
