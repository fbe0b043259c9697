//! # SQLite content repository
//!
//! Maps the boards/posts/comments tables onto the domain models. Every
//! operation is one statement; concurrency control is left to the engine.

mod errors;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    Board, Comment, ContentRepository, DomainError, EntityId, NewBoard, NewComment, NewPost, Page,
    Post, Result,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use errors::classify;

const BOARD_COLUMNS: &str = "id, name, description, created_at, deleted_at";
const POST_COLUMNS: &str = "id, board_id, title, text, submitter_token, created_at, deleted_at";
const COMMENT_COLUMNS: &str = "id, post_id, text, submitter_token, created_at, deleted_at";

pub struct SqliteContentRepository {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct BoardRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<BoardRow> for Board {
    fn from(row: BoardRow) -> Self {
        Board {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(FromRow)]
struct PostRow {
    id: i64,
    board_id: i64,
    title: Option<String>,
    text: String,
    submitter_token: Option<String>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            board_id: row.board_id,
            title: row.title,
            text: row.text,
            submitter_token: row.submitter_token,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    text: String,
    submitter_token: Option<String>,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            post_id: row.post_id,
            text: row.text,
            submitter_token: row.submitter_token,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        }
    }
}

impl SqliteContentRepository {
    /// Opens a pool against `url` (e.g. `sqlite://forum.db?mode=rwc`).
    ///
    /// An in-memory database exists only as long as its connection, so
    /// memory URLs get exactly one connection that is never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| DomainError::Internal(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool_opts = SqlitePoolOptions::new();
        pool_opts = if in_memory {
            pool_opts.max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            pool_opts.max_connections(max_connections.max(1))
        };

        let pool = pool_opts
            .connect_with(opts)
            .await
            .map_err(|e| classify(e, "database connection"))?;
        info!(in_memory, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// A migrated, private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let repo = Self::connect("sqlite::memory:", 1).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(format!("migration failed: {e}")))?;
        debug!("content schema up to date");
        Ok(())
    }

    /// Cheap liveness probe against the pool.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, "ping"))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Stamps `deleted_at` unless already set, so the first deletion time
    /// survives repeated deletes.
    async fn soft_delete(&self, table: &'static str, entity: &'static str, id: EntityId) -> Result<()> {
        let sql = format!("UPDATE {table} SET deleted_at = COALESCE(deleted_at, ?) WHERE id = ?");
        let done = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("{entity} {id}")))?;

        if done.rows_affected() == 0 {
            return Err(DomainError::not_found(entity, id));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentRepository for SqliteContentRepository {
    async fn create_board(&self, board: NewBoard) -> Result<Board> {
        let sql = format!(
            "INSERT INTO boards (name, description, created_at) VALUES (?, ?, ?) RETURNING {BOARD_COLUMNS}"
        );
        let row: BoardRow = sqlx::query_as(&sql)
            .bind(&board.name)
            .bind(&board.description)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("board `{}`", board.name)))?;
        Ok(row.into())
    }

    async fn get_board(&self, id: EntityId) -> Result<Board> {
        let sql = format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = ?");
        let row: Option<BoardRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("board {id}")))?;
        row.map(Board::from).ok_or_else(|| DomainError::not_found("board", id))
    }

    async fn list_boards(&self, include_deleted: bool) -> Result<Vec<Board>> {
        let sql = format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE (? OR deleted_at IS NULL) ORDER BY id"
        );
        let rows: Vec<BoardRow> = sqlx::query_as(&sql)
            .bind(include_deleted)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, "boards"))?;
        Ok(rows.into_iter().map(Board::from).collect())
    }

    async fn delete_board(&self, id: EntityId) -> Result<()> {
        self.soft_delete("boards", "board", id).await
    }

    async fn restore_board(&self, id: EntityId) -> Result<()> {
        let done = sqlx::query("UPDATE boards SET deleted_at = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("board {id}")))?;

        if done.rows_affected() == 0 {
            return Err(DomainError::not_found("board", id));
        }
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let sql = format!(
            "INSERT INTO posts (board_id, title, text, submitter_token, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {POST_COLUMNS}"
        );
        let row: PostRow = sqlx::query_as(&sql)
            .bind(post.board_id)
            .bind(&post.title)
            .bind(&post.text)
            .bind(&post.submitter_token)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("post on board {}", post.board_id)))?;
        Ok(row.into())
    }

    async fn get_post(&self, id: EntityId) -> Result<Post> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?");
        let row: Option<PostRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("post {id}")))?;
        row.map(Post::from).ok_or_else(|| DomainError::not_found("post", id))
    }

    async fn list_posts(&self, board_id: EntityId, page: Page) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE board_id = ? AND (? OR deleted_at IS NULL) \
             ORDER BY created_at, id LIMIT ? OFFSET ?"
        );
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(board_id)
            .bind(page.include_deleted)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("posts of board {board_id}")))?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn delete_post(&self, id: EntityId) -> Result<()> {
        self.soft_delete("posts", "post", id).await
    }

    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let sql = format!(
            "INSERT INTO comments (post_id, text, submitter_token, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {COMMENT_COLUMNS}"
        );
        let row: CommentRow = sqlx::query_as(&sql)
            .bind(comment.post_id)
            .bind(&comment.text)
            .bind(&comment.submitter_token)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("comment on post {}", comment.post_id)))?;
        Ok(row.into())
    }

    async fn get_comment(&self, id: EntityId) -> Result<Comment> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?");
        let row: Option<CommentRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("comment {id}")))?;
        row.map(Comment::from).ok_or_else(|| DomainError::not_found("comment", id))
    }

    async fn list_comments(&self, post_id: EntityId, page: Page) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE post_id = ? AND (? OR deleted_at IS NULL) \
             ORDER BY created_at, id LIMIT ? OFFSET ?"
        );
        let rows: Vec<CommentRow> = sqlx::query_as(&sql)
            .bind(post_id)
            .bind(page.include_deleted)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, &format!("comments of post {post_id}")))?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn delete_comment(&self, id: EntityId) -> Result<()> {
        self.soft_delete("comments", "comment", id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn repo() -> SqliteContentRepository {
        SqliteContentRepository::in_memory().await.expect("in-memory sqlite")
    }

    async fn board(repo: &SqliteContentRepository, name: &str) -> Board {
        repo.create_board(NewBoard { name: name.into(), description: None })
            .await
            .expect("create board")
    }

    async fn post(repo: &SqliteContentRepository, board_id: EntityId, text: &str) -> Post {
        repo.create_post(NewPost {
            board_id,
            title: None,
            text: text.into(),
            submitter_token: None,
        })
        .await
        .expect("create post")
    }

    fn page(limit: i64, offset: i64) -> Page {
        Page { include_deleted: false, limit, offset }
    }

    #[tokio::test]
    async fn test_created_board_resolves_by_id() {
        let repo = repo().await;
        let created = repo
            .create_board(NewBoard { name: "rust".into(), description: Some("crabs".into()) })
            .await
            .unwrap();

        let fetched = repo.get_board(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert!(fetched.is_live());
    }

    #[tokio::test]
    async fn test_duplicate_board_name_conflicts_even_when_deleted() {
        let repo = repo().await;
        let b = board(&repo, "rust").await;

        let err = repo
            .create_board(NewBoard { name: "rust".into(), description: None })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)), "{err:?}");

        repo.delete_board(b.id).await.unwrap();
        let err = repo
            .create_board(NewBoard { name: "rust".into(), description: None })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let repo = repo().await;
        assert!(matches!(repo.get_board(404).await, Err(DomainError::NotFound("board", _))));
        assert!(matches!(repo.get_post(404).await, Err(DomainError::NotFound("post", _))));
        assert!(matches!(repo.get_comment(404).await, Err(DomainError::NotFound("comment", _))));
        assert!(matches!(repo.delete_board(404).await, Err(DomainError::NotFound(..))));
        assert!(matches!(repo.restore_board(404).await, Err(DomainError::NotFound(..))));
    }

    #[tokio::test]
    async fn test_soft_deleted_board_is_hidden_but_addressable() {
        let repo = repo().await;
        let keep = board(&repo, "keep").await;
        let gone = board(&repo, "gone").await;

        repo.delete_board(gone.id).await.unwrap();

        let live: Vec<_> = repo.list_boards(false).await.unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(live, vec![keep.id]);

        let all: Vec<_> = repo.list_boards(true).await.unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(all, vec![keep.id, gone.id]);

        let fetched = repo.get_board(gone.id).await.unwrap();
        assert!(fetched.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_keeps_first_stamp() {
        let repo = repo().await;
        let b = board(&repo, "twice").await;

        repo.delete_board(b.id).await.unwrap();
        let first = repo.get_board(b.id).await.unwrap().deleted_at;
        repo.delete_board(b.id).await.unwrap();
        let second = repo.get_board(b.id).await.unwrap().deleted_at;

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_restore_round_trips() {
        let repo = repo().await;
        let b = board(&repo, "phoenix").await;

        // Restoring a live board is a no-op.
        repo.restore_board(b.id).await.unwrap();

        repo.delete_board(b.id).await.unwrap();
        repo.restore_board(b.id).await.unwrap();
        repo.restore_board(b.id).await.unwrap();

        let live = repo.list_boards(false).await.unwrap();
        assert!(live.iter().any(|x| x.id == b.id));
        assert!(repo.get_board(b.id).await.unwrap().is_live());
    }

    #[tokio::test]
    async fn test_board_soft_delete_does_not_cascade() {
        let repo = repo().await;
        let b = board(&repo, "parent").await;
        let p = post(&repo, b.id, "child").await;

        repo.delete_board(b.id).await.unwrap();

        let p_after = repo.get_post(p.id).await.unwrap();
        assert!(p_after.is_live());
        let listed = repo.list_posts(b.id, Page::posts()).await.unwrap();
        assert_eq!(listed.iter().map(|x| x.id).collect::<Vec<_>>(), vec![p.id]);
    }

    #[tokio::test]
    async fn test_post_on_missing_board_is_invalid() {
        let repo = repo().await;
        let err = repo
            .create_post(NewPost { board_id: 77, title: None, text: "orphan".into(), submitter_token: None })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Invalid(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_comment_on_missing_post_is_invalid() {
        let repo = repo().await;
        let err = repo
            .create_comment(NewComment { post_id: 77, text: "orphan".into(), submitter_token: None })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Invalid(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_post_pagination_is_disjoint_and_ordered() {
        let repo = repo().await;
        let b = board(&repo, "pages").await;
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(post(&repo, b.id, &format!("post {i}")).await.id);
        }

        let first = repo.list_posts(b.id, page(2, 0)).await.unwrap();
        let second = repo.list_posts(b.id, page(2, 2)).await.unwrap();
        let third = repo.list_posts(b.id, page(2, 4)).await.unwrap();
        let beyond = repo.list_posts(b.id, page(2, 10)).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert!(beyond.is_empty());

        let seen: Vec<_> = first.iter().chain(&second).chain(&third).map(|p| p.id).collect();
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn test_deleted_posts_only_listed_on_request() {
        let repo = repo().await;
        let b = board(&repo, "filter").await;
        let a = post(&repo, b.id, "a").await;
        let z = post(&repo, b.id, "z").await;
        repo.delete_post(a.id).await.unwrap();
        repo.delete_post(a.id).await.unwrap();

        let live = repo.list_posts(b.id, Page::posts()).await.unwrap();
        assert_eq!(live.iter().map(|p| p.id).collect::<Vec<_>>(), vec![z.id]);

        let all = repo
            .list_posts(b.id, Page { include_deleted: true, ..Page::posts() })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(repo.get_post(a.id).await.unwrap().deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_comments_scope_to_their_post() {
        let repo = repo().await;
        let b = board(&repo, "threads").await;
        let p1 = post(&repo, b.id, "one").await;
        let p2 = post(&repo, b.id, "two").await;

        let c = repo
            .create_comment(NewComment { post_id: p1.id, text: "hi".into(), submitter_token: Some("tok".into()) })
            .await
            .unwrap();
        repo.create_comment(NewComment { post_id: p2.id, text: "elsewhere".into(), submitter_token: None })
            .await
            .unwrap();

        let listed = repo.list_comments(p1.id, Page::comments()).await.unwrap();
        assert_eq!(listed, vec![c.clone()]);

        repo.delete_comment(c.id).await.unwrap();
        assert!(repo.list_comments(p1.id, Page::comments()).await.unwrap().is_empty());
        assert!(repo.get_comment(c.id).await.unwrap().deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_posts_get_distinct_ids() {
        let repo = Arc::new(repo().await);
        let board_id = board(&repo, "race").await.id;

        let handles: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|text| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.create_post(NewPost {
                        board_id,
                        title: None,
                        text: text.into(),
                        submitter_token: None,
                    })
                    .await
                })
            })
            .collect();

        let mut created = Vec::new();
        for handle in futures_util::future::join_all(handles).await {
            created.push(handle.unwrap().unwrap());
        }
        assert_ne!(created[0].id, created[1].id);
        for p in &created {
            assert_eq!(repo.get_post(p.id).await.unwrap().text, p.text);
        }
    }

    #[tokio::test]
    async fn test_concurrent_posts_on_a_shared_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("forum.db").display());
        let repo = SqliteContentRepository::connect(&url, 4).await.unwrap();
        repo.migrate().await.unwrap();
        let repo = Arc::new(repo);
        let board_id = board(&repo, "busy").await.id;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move {
                    repo.create_post(NewPost {
                        board_id,
                        title: None,
                        text: format!("writer {i}"),
                        submitter_token: None,
                    })
                    .await
                })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for handle in futures_util::future::join_all(handles).await {
            let created = handle.unwrap().unwrap();
            assert_eq!(repo.get_post(created.id).await.unwrap().text, created.text);
            ids.insert(created.id);
        }
        assert_eq!(ids.len(), 8);
        assert_eq!(repo.list_posts(board_id, page(100, 0)).await.unwrap().len(), 8);
    }
}
