//! # services
//!
//! Application logic sitting between the transport and the storage ports:
//! input validation, submitter hashing, media naming, and per-request
//! cancellation.

pub mod content;
pub mod context;
pub mod identity;
pub mod media;

pub use content::ContentService;
pub use context::RequestContext;
pub use identity::SubmitterHasher;
pub use media::{MediaService, MEDIA_URL_TTL};
