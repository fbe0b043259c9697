//! # Domain Models
//!
//! Boards own posts, posts own comments. Rows are never mutated after
//! creation except for the `deleted_at` stamp, and no core operation removes
//! them physically.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate key assigned by the storage engine.
pub type EntityId = i64;

/// Default page size for post listings.
pub const DEFAULT_POST_LIMIT: i64 = 100;
/// Default page size for comment listings.
pub const DEFAULT_COMMENT_LIMIT: i64 = 500;

/// A discussion board (e.g. "rust", "music").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: EntityId,
    /// Globally unique, including among soft-deleted boards.
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A top-level post on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub board_id: EntityId,
    pub title: Option<String>,
    pub text: String,
    /// One-way hash of the submitter's raw identifier, never the raw value.
    pub submitter_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A reply to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub text: String,
    pub submitter_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

macro_rules! impl_liveness {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// A row is live until it carries a deletion stamp.
            pub fn is_live(&self) -> bool {
                self.deleted_at.is_none()
            }
        }
    )*};
}

impl_liveness!(Board, Post, Comment);

/// Insert payload for a board, already validated by the service layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBoard {
    pub name: String,
    pub description: Option<String>,
}

/// Insert payload for a post. The submitter is stored as a token only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub board_id: EntityId,
    pub title: Option<String>,
    pub text: String,
    pub submitter_token: Option<String>,
}

/// Insert payload for a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: EntityId,
    pub text: String,
    pub submitter_token: Option<String>,
}

/// Visibility filter and window for child listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn posts() -> Self {
        Self { include_deleted: false, limit: DEFAULT_POST_LIMIT, offset: 0 }
    }

    pub fn comments() -> Self {
        Self { include_deleted: false, limit: DEFAULT_COMMENT_LIMIT, offset: 0 }
    }
}

/// A binary upload as received by the ingestion endpoint.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    /// The client-side file name; only its extension is kept.
    pub original_name: Option<String>,
    /// Declared content type of the multipart field.
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A stored upload and its time-limited retrieval link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaObject {
    /// Collision-resistant generated object name.
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
