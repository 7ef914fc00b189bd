pub mod adapter;
mod error;
pub mod events;
pub mod session;

pub use adapter::{CaptureAdapter, ChatMessage, MeetingDetails, ScriptedAdapter, wait_for_meeting_details};
pub use error::{Error, Result};
pub use events::{
    CaptureRuntime, NullRuntime, SessionDataEvent, SessionErrorEvent, SessionLifecycleEvent,
};
pub use session::{CaptureConfig, CaptureSession};

use std::future::Future;
use std::pin::Pin;

/// Object-safe future type for the [`CaptureAdapter`] trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
