pub mod engine;
pub mod fingerprint;
pub mod matcher;
pub mod normalize;
pub mod timeline;
pub mod timestamp;
pub mod types;

pub use engine::{EngineConfig, ReconcileAction, ReconcileOutcome, ReconciliationEngine};
pub use fingerprint::FingerprintSet;
pub use matcher::{MatcherConfig, SimilarityMatcher, Strictness};
pub use timestamp::TimestampTag;
pub use types::{CaptionFragment, LineKind, TranscriptLine, display_speaker_name};
