//! Clock-time tags embedded in rendered transcript lines.
//!
//! A [`TimestampTag`] is produced once when a line is created and carried
//! alongside the rendered text; nothing in the pipeline re-parses display
//! strings to recover ordering. The bracket-format parser below exists
//! only at the serialization boundary, for persisted and exported text
//! written by earlier capture sessions.

use chrono::{Local, NaiveTime};

/// Wall-clock second at which a line was observed or injected.
///
/// Serializes to the bracketed form `[h:mm:ss AM/PM]`; the parser also
/// accepts the legacy minute-granularity form `[h:mm AM/PM]`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct TimestampTag(NaiveTime);

impl TimestampTag {
    pub fn now() -> Self {
        Self(Local::now().time())
    }

    pub fn from_time(time: NaiveTime) -> Self {
        Self(time)
    }

    pub fn from_hms(hour: u32, min: u32, sec: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, min, sec).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// `10:00:05 AM`, the inner text of the bracketed tag.
    pub fn render(&self) -> String {
        self.0.format("%-I:%M:%S %p").to_string()
    }

    /// `[10:00:05 AM]`, as embedded in rendered lines.
    pub fn render_bracketed(&self) -> String {
        format!("[{}]", self.render())
    }

    /// Parse the inner text of a tag, with or without seconds.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        NaiveTime::parse_from_str(text, "%I:%M:%S %p")
            .or_else(|_| NaiveTime::parse_from_str(text, "%I:%M %p"))
            .ok()
            .map(Self)
    }

    /// Scan a rendered line for the first bracketed clock-time tag.
    ///
    /// Unparseable or absent tags yield `None`; callers degrade to "now"
    /// rather than failing, so an unsortable entry is still included.
    pub fn extract(line: &str) -> Option<Self> {
        let mut rest = line;
        while let Some(open) = rest.find('[') {
            let after = &rest[open + 1..];
            let Some(close) = after.find(']') else {
                return None;
            };
            if let Some(tag) = Self::parse(&after[..close]) {
                return Some(tag);
            }
            rest = &after[close + 1..];
        }
        None
    }
}
