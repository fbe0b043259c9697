//! Media backends. Exactly one is wired in by the binary at startup.

#[cfg(feature = "media-local")]
pub mod local;
#[cfg(feature = "media-s3")]
pub mod s3;

#[cfg(feature = "media-local")]
pub use local::LocalMediaStore;
#[cfg(feature = "media-s3")]
pub use s3::{S3MediaStore, S3Options};
