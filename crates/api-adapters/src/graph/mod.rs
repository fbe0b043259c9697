//! # Query resolution layer
//!
//! A typed operation graph over [`ContentService`](services::ContentService):
//! `document` parses request text, `schema` declares the operations and
//! their argument types, `objects` renders entities, and `executor` ties
//! them together per request.

pub mod document;
pub mod executor;
pub mod objects;
pub mod schema;

pub use executor::{Executor, GraphError, GraphRequest, GraphResponse, OperationOutcome};
pub use schema::{Resolved, Schema, SchemaBuilder};
