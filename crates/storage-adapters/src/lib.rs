//! # storage-adapters
//!
//! Implementations of the `domains` ports. Each backend sits behind a Cargo
//! feature so the binary only links what it is configured to use.

#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub mod media;

#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteContentRepository;

#[cfg(feature = "media-local")]
pub use media::LocalMediaStore;
#[cfg(feature = "media-s3")]
pub use media::{S3MediaStore, S3Options};
