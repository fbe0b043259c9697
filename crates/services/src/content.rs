//! # ContentService
//!
//! Sole authority over the board → post → comment hierarchy. Validates
//! input, replaces raw submitter identifiers with tokens, and runs each
//! repository call under the caller's [`RequestContext`].
//!
//! Soft-deleting a parent does not touch its children: a post on a deleted
//! board stays listed until the post itself is deleted. Only boards can be
//! restored.

use std::sync::Arc;

use domains::{
    Board, Comment, ContentRepository, DomainError, EntityId, NewBoard, NewComment, NewPost,
    Page, Post, Result,
};
use tracing::{error, instrument, warn};

use crate::context::RequestContext;
use crate::identity::SubmitterHasher;

/// Upper bound on board name length, in characters.
pub const MAX_BOARD_NAME_CHARS: usize = 64;

pub struct ContentService {
    repo: Arc<dyn ContentRepository>,
    hasher: SubmitterHasher,
}

impl ContentService {
    pub fn new(repo: Arc<dyn ContentRepository>, hasher: SubmitterHasher) -> Self {
        Self { repo, hasher }
    }

    // ── Boards ───────────────────────────────────────────────────────────────

    #[instrument(skip(self, ctx, description))]
    pub async fn create_board(
        &self,
        ctx: &RequestContext,
        name: &str,
        description: Option<String>,
    ) -> Result<Board> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::invalid("board name must not be empty"));
        }
        if name.chars().count() > MAX_BOARD_NAME_CHARS {
            return Err(DomainError::invalid(format!(
                "board name must be at most {MAX_BOARD_NAME_CHARS} characters"
            )));
        }

        let board = NewBoard { name: name.to_string(), description };
        observe(ctx.run(self.repo.create_board(board)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_board(&self, ctx: &RequestContext, id: EntityId) -> Result<Board> {
        observe(ctx.run(self.repo.get_board(id)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_boards(&self, ctx: &RequestContext, include_deleted: bool) -> Result<Vec<Board>> {
        observe(ctx.run(self.repo.list_boards(include_deleted)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_board(&self, ctx: &RequestContext, id: EntityId) -> Result<()> {
        observe(ctx.run(self.repo.delete_board(id)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn restore_board(&self, ctx: &RequestContext, id: EntityId) -> Result<()> {
        observe(ctx.run(self.repo.restore_board(id)).await)
    }

    // ── Posts ────────────────────────────────────────────────────────────────

    #[instrument(skip(self, ctx, title, text, submitter_raw))]
    pub async fn create_post(
        &self,
        ctx: &RequestContext,
        board_id: EntityId,
        title: Option<String>,
        text: String,
        submitter_raw: Option<&str>,
    ) -> Result<Post> {
        require_text(&text, "post")?;

        let post = NewPost {
            board_id,
            title: title.filter(|t| !t.trim().is_empty()),
            text,
            submitter_token: self.hasher.token_for(submitter_raw),
        };
        observe(ctx.run(self.repo.create_post(post)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_post(&self, ctx: &RequestContext, id: EntityId) -> Result<Post> {
        observe(ctx.run(self.repo.get_post(id)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_posts(&self, ctx: &RequestContext, board_id: EntityId, page: Page) -> Result<Vec<Post>> {
        check_page(&page)?;
        observe(ctx.run(self.repo.list_posts(board_id, page)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_post(&self, ctx: &RequestContext, id: EntityId) -> Result<()> {
        observe(ctx.run(self.repo.delete_post(id)).await)
    }

    // ── Comments ─────────────────────────────────────────────────────────────

    #[instrument(skip(self, ctx, text, submitter_raw))]
    pub async fn create_comment(
        &self,
        ctx: &RequestContext,
        post_id: EntityId,
        text: String,
        submitter_raw: Option<&str>,
    ) -> Result<Comment> {
        require_text(&text, "comment")?;

        let comment = NewComment {
            post_id,
            text,
            submitter_token: self.hasher.token_for(submitter_raw),
        };
        observe(ctx.run(self.repo.create_comment(comment)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn get_comment(&self, ctx: &RequestContext, id: EntityId) -> Result<Comment> {
        observe(ctx.run(self.repo.get_comment(id)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_comments(&self, ctx: &RequestContext, post_id: EntityId, page: Page) -> Result<Vec<Comment>> {
        check_page(&page)?;
        observe(ctx.run(self.repo.list_comments(post_id, page)).await)
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_comment(&self, ctx: &RequestContext, id: EntityId) -> Result<()> {
        observe(ctx.run(self.repo.delete_comment(id)).await)
    }
}

fn require_text(text: &str, what: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(DomainError::invalid(format!("{what} text must not be empty")));
    }
    Ok(())
}

fn check_page(page: &Page) -> Result<()> {
    if page.limit < 0 {
        return Err(DomainError::invalid("limit must not be negative"));
    }
    if page.offset < 0 {
        return Err(DomainError::invalid("offset must not be negative"));
    }
    Ok(())
}

/// Logs failures that need an operator before handing them back unchanged.
fn observe<T>(res: Result<T>) -> Result<T> {
    if let Err(err) = &res {
        match err {
            DomainError::Internal(_) => error!(error = %err, "content operation failed"),
            DomainError::Unavailable(_) => warn!(error = %err, "content store unavailable"),
            _ => {}
        }
    }
    res
}
