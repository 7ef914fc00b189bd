//! Text normalization for utterance comparison.
//!
//! Live captions are revised in place by the ASR, so two observations of
//! the same utterance routinely differ in punctuation, casing, and
//! whitespace. Every comparison in this crate goes through [`normalize`]
//! first; the raw text is what gets rendered and persisted.

/// Punctuation stripped before comparison. Matches what caption feeds
/// actually vary on between revisions of the same utterance.
const PUNCTUATION: &[char] = &[
    '.', ',', '/', '#', '!', '$', '%', '^', '&', '*', ';', ':', '{', '}', '=', '-', '_', '`', '~',
    '(', ')',
];

/// Tokens with no comparison signal: articles, fillers, pronouns,
/// conjunctions. Dropped by [`meaningful_words`] so that word-overlap
/// scoring only counts content words.
const STOP_WORDS: &[&str] = &[
    "i", "will", "would", "like", "to", "the", "this", "that", "is", "a", "an", "and", "or", "but",
    "in", "on", "at", "it", "for", "yes", "no", "so", "uh", "um", "we", "you", "they", "of", "from",
];

/// Lowercase, strip punctuation, collapse whitespace runs, trim.
///
/// Pure and total: empty input yields empty output, nothing panics.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered.chars().filter(|c| !PUNCTUATION.contains(c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content words of an already-normalized string: stop words and
/// single-character tokens removed.
pub fn meaningful_words(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .collect()
}

/// Whitespace token count of a raw (un-normalized) string.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `n` characters of a string, by char boundary.
pub(crate) fn char_prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
