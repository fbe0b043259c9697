//! # Core Traits (Ports)
//!
//! Any storage adapter must implement these traits to be wired into the
//! binary. Implementations classify their own engine errors into
//! [`DomainError`](crate::DomainError) before returning.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::errors::Result;
use crate::models::{Board, Comment, EntityId, NewBoard, NewComment, NewPost, Page, Post};

/// Persistence contract for boards, posts, and comments.
///
/// Every method is a single statement against the engine; none of them
/// wraps reads of a parent row in the same transaction as a child write.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentRepository: Send + Sync {
    // Board Operations
    async fn create_board(&self, board: NewBoard) -> Result<Board>;
    async fn get_board(&self, id: EntityId) -> Result<Board>;
    async fn list_boards(&self, include_deleted: bool) -> Result<Vec<Board>>;
    async fn delete_board(&self, id: EntityId) -> Result<()>;
    async fn restore_board(&self, id: EntityId) -> Result<()>;

    // Post Operations
    async fn create_post(&self, post: NewPost) -> Result<Post>;
    async fn get_post(&self, id: EntityId) -> Result<Post>;
    async fn list_posts(&self, board_id: EntityId, page: Page) -> Result<Vec<Post>>;
    async fn delete_post(&self, id: EntityId) -> Result<()>;

    // Comment Operations
    async fn create_comment(&self, comment: NewComment) -> Result<Comment>;
    async fn get_comment(&self, id: EntityId) -> Result<Comment>;
    async fn list_comments(&self, post_id: EntityId, page: Page) -> Result<Vec<Comment>>;
    async fn delete_comment(&self, id: EntityId) -> Result<()>;
}

/// Object storage contract for uploaded media.
///
/// Implementations create their backing container on first use.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Stores `data` under `key` and returns the stored byte size.
    async fn put_object(&self, key: &str, content_type: &str, data: Bytes) -> Result<u64>;

    /// Returns a self-authorizing URL for `key` that stops working after `ttl`.
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// An object read back through a signed link.
#[derive(Debug, Clone)]
pub struct SignedObject {
    pub content_type: String,
    pub data: Bytes,
}

/// Serves objects for stores that sign their own links instead of
/// delegating retrieval to an external object server.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SignedObjectReader: Send + Sync {
    /// Verifies `signature` and `expires` (unix seconds) before reading `key`.
    async fn open_signed(&self, key: &str, expires: i64, signature: &str) -> Result<SignedObject>;
}
