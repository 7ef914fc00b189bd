//! Runtime event surface.
//!
//! The capture loop reports what it does through [`CaptureRuntime`];
//! the host decides what to do with it: forward to a UI, log, or drop.

pub trait CaptureRuntime: Send + Sync + 'static {
    fn emit_lifecycle(&self, event: SessionLifecycleEvent);
    fn emit_data(&self, event: SessionDataEvent);
    fn emit_error(&self, event: SessionErrorEvent);
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionLifecycleEvent {
    Started { session_id: String },
    Resumed { session_id: String, restored_lines: usize },
    Stopped { session_id: String },
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionDataEvent {
    CaptionAppended { session_id: String, line: String },
    CaptionMerged { session_id: String, index: usize, line: String },
    ChatCaptured { session_id: String, line: String },
    CommentAdded { session_id: String, line: String },
    AttendeesChanged { session_id: String, attendees: String },
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SessionErrorEvent {
    SaveFailed {
        session_id: String,
        error: String,
        cached: bool,
    },
}

/// Drops every event. For callers that only want the capture side
/// effects (history and persistence) without an event surface.
pub struct NullRuntime;

impl CaptureRuntime for NullRuntime {
    fn emit_lifecycle(&self, _event: SessionLifecycleEvent) {}
    fn emit_data(&self, _event: SessionDataEvent) {}
    fn emit_error(&self, _event: SessionErrorEvent) {}
}
