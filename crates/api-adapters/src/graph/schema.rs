//! # Schema
//!
//! The operation graph is assembled once at startup with [`SchemaBuilder`]
//! and shared read-only afterwards. Each operation declares its result
//! shape and a typed argument struct; arguments are decoded with serde and
//! anything the struct does not describe is refused.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use domains::{
    Board, Comment, DomainError, EntityId, Page, Post, Result, DEFAULT_COMMENT_LIMIT,
    DEFAULT_POST_LIMIT,
};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use services::{ContentService, RequestContext};

use super::document::{Field, OperationKind};
use super::objects::{GraphObject, ResultShape, BOARD, COMMENT, POST};

/// What a resolver hands back; one variant per result shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Board(Board),
    Boards(Vec<Board>),
    Post(Post),
    Posts(Vec<Post>),
    Comment(Comment),
    Comments(Vec<Comment>),
    Flag(bool),
}

impl Resolved {
    /// Projects the value onto a validated selection set.
    pub fn render(&self, selection: &[Field]) -> Value {
        fn list<T: GraphObject>(items: &[T], selection: &[Field]) -> Value {
            Value::Array(items.iter().map(|item| item.project(selection)).collect())
        }

        match self {
            Resolved::Board(b) => b.project(selection),
            Resolved::Boards(bs) => list(bs, selection),
            Resolved::Post(p) => p.project(selection),
            Resolved::Posts(ps) => list(ps, selection),
            Resolved::Comment(c) => c.project(selection),
            Resolved::Comments(cs) => list(cs, selection),
            Resolved::Flag(flag) => Value::Bool(*flag),
        }
    }
}

type Resolver =
    Box<dyn Fn(Arc<ContentService>, RequestContext, Value) -> BoxFuture<'static, Result<Resolved>> + Send + Sync>;

pub struct OperationDef {
    pub name: &'static str,
    pub shape: ResultShape,
    resolve: Resolver,
}

impl OperationDef {
    /// Decodes `args` and starts the resolver. Decoding failures surface as
    /// `Invalid` from the returned future.
    pub fn resolve(
        &self,
        content: Arc<ContentService>,
        ctx: RequestContext,
        args: Value,
    ) -> BoxFuture<'static, Result<Resolved>> {
        (self.resolve)(content, ctx, args)
    }
}

pub struct Schema {
    queries: HashMap<&'static str, OperationDef>,
    mutations: HashMap<&'static str, OperationDef>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder { queries: HashMap::new(), mutations: HashMap::new() }
    }

    pub fn operation(&self, kind: OperationKind, name: &str) -> Option<&OperationDef> {
        match kind {
            OperationKind::Query => self.queries.get(name),
            OperationKind::Mutation => self.mutations.get(name),
        }
    }

    /// Names of every registered operation, for logging at startup.
    pub fn operation_names(&self, kind: OperationKind) -> Vec<&'static str> {
        let map = match kind {
            OperationKind::Query => &self.queries,
            OperationKind::Mutation => &self.mutations,
        };
        let mut names: Vec<_> = map.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// The forum's full query and mutation surface.
    pub fn forum() -> Schema {
        Schema::builder()
            // Queries
            .query("board", ResultShape::Object(&BOARD), |svc, ctx, args: ById| async move {
                svc.get_board(&ctx, args.id.0).await.map(Resolved::Board)
            })
            .query("boards", ResultShape::List(&BOARD), |svc, ctx, args: BoardsArgs| async move {
                svc.list_boards(&ctx, args.include_deleted).await.map(Resolved::Boards)
            })
            .query("post", ResultShape::Object(&POST), |svc, ctx, args: ById| async move {
                svc.get_post(&ctx, args.id.0).await.map(Resolved::Post)
            })
            .query("posts", ResultShape::List(&POST), |svc, ctx, args: PostsArgs| async move {
                let page = Page { include_deleted: args.include_deleted, limit: args.limit, offset: args.offset };
                svc.list_posts(&ctx, args.board_id.0, page).await.map(Resolved::Posts)
            })
            .query("comment", ResultShape::Object(&COMMENT), |svc, ctx, args: ById| async move {
                svc.get_comment(&ctx, args.id.0).await.map(Resolved::Comment)
            })
            .query("comments", ResultShape::List(&COMMENT), |svc, ctx, args: CommentsArgs| async move {
                let page = Page { include_deleted: args.include_deleted, limit: args.limit, offset: args.offset };
                svc.list_comments(&ctx, args.post_id.0, page).await.map(Resolved::Comments)
            })
            // Mutations
            .mutation("createBoard", ResultShape::Object(&BOARD), |svc, ctx, args: Input<CreateBoardInput>| async move {
                let input = args.input;
                svc.create_board(&ctx, &input.name, input.description).await.map(Resolved::Board)
            })
            .mutation("deleteBoard", ResultShape::Boolean, |svc, ctx, args: ById| async move {
                svc.delete_board(&ctx, args.id.0).await.map(|()| Resolved::Flag(true))
            })
            .mutation("restoreBoard", ResultShape::Boolean, |svc, ctx, args: ById| async move {
                svc.restore_board(&ctx, args.id.0).await.map(|()| Resolved::Flag(true))
            })
            .mutation("createPost", ResultShape::Object(&POST), |svc, ctx, args: Input<CreatePostInput>| async move {
                let input = args.input;
                svc.create_post(&ctx, input.board_id.0, input.title, input.text, input.submitter_raw.as_deref())
                    .await
                    .map(Resolved::Post)
            })
            .mutation("deletePost", ResultShape::Boolean, |svc, ctx, args: ById| async move {
                svc.delete_post(&ctx, args.id.0).await.map(|()| Resolved::Flag(true))
            })
            .mutation(
                "createComment",
                ResultShape::Object(&COMMENT),
                |svc, ctx, args: Input<CreateCommentInput>| async move {
                    let input = args.input;
                    svc.create_comment(&ctx, input.post_id.0, input.text, input.submitter_raw.as_deref())
                        .await
                        .map(Resolved::Comment)
                },
            )
            .mutation("deleteComment", ResultShape::Boolean, |svc, ctx, args: ById| async move {
                svc.delete_comment(&ctx, args.id.0).await.map(|()| Resolved::Flag(true))
            })
            .build()
    }
}

pub struct SchemaBuilder {
    queries: HashMap<&'static str, OperationDef>,
    mutations: HashMap<&'static str, OperationDef>,
}

impl SchemaBuilder {
    pub fn query<A, F, Fut>(mut self, name: &'static str, shape: ResultShape, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(Arc<ContentService>, RequestContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resolved>> + Send + 'static,
    {
        let prev = self.queries.insert(name, operation(name, shape, f));
        debug_assert!(prev.is_none(), "query `{name}` registered twice");
        self
    }

    pub fn mutation<A, F, Fut>(mut self, name: &'static str, shape: ResultShape, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(Arc<ContentService>, RequestContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resolved>> + Send + 'static,
    {
        let prev = self.mutations.insert(name, operation(name, shape, f));
        debug_assert!(prev.is_none(), "mutation `{name}` registered twice");
        self
    }

    pub fn build(self) -> Schema {
        Schema { queries: self.queries, mutations: self.mutations }
    }
}

fn operation<A, F, Fut>(name: &'static str, shape: ResultShape, f: F) -> OperationDef
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(Arc<ContentService>, RequestContext, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resolved>> + Send + 'static,
{
    let resolve: Resolver = Box::new(move |svc, ctx, raw| match decode_args::<A>(raw) {
        Ok(args) => f(svc, ctx, args).boxed(),
        Err(err) => futures_util::future::ready(Err(err)).boxed(),
    });
    OperationDef { name, shape, resolve }
}

pub fn decode_args<A: DeserializeOwned>(raw: Value) -> Result<A> {
    serde_json::from_value(raw).map_err(|e| DomainError::invalid(format!("invalid arguments: {e}")))
}

// ── Argument types ──────────────────────────────────────────────────────────

/// Identifiers travel as strings holding a decimal integer. Numbers and
/// other JSON types are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id(pub EntityId);

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<EntityId>()
            .map(Id)
            .map_err(|_| de::Error::custom(format!("`{raw}` is not a valid ID")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ById {
    pub id: Id,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BoardsArgs {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PostsArgs {
    pub board_id: Id,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default = "default_post_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CommentsArgs {
    pub post_id: Id,
    #[serde(default)]
    pub include_deleted: bool,
    #[serde(default = "default_comment_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_post_limit() -> i64 {
    DEFAULT_POST_LIMIT
}

fn default_comment_limit() -> i64 {
    DEFAULT_COMMENT_LIMIT
}

/// Mutations take their payload in a single `input` argument.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input<T> {
    pub input: T,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBoardInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreatePostInput {
    pub board_id: Id,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub submitter_raw: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateCommentInput {
    pub post_id: Id,
    pub text: String,
    #[serde(default)]
    pub submitter_raw: Option<String>,
}
