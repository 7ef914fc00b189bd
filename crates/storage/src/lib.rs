mod error;
pub mod cache;
pub mod fs;
pub mod session;
pub mod store;

pub use cache::CacheStore;
pub use error::*;
pub use session::{ContentBuffers, ContentKind, Session, export_file_stem, sanitize_title, session_id};
pub use store::{FsSessionStore, SessionStore};

use std::future::Future;
use std::pin::Pin;

/// Object-safe future type for the [`SessionStore`] trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
