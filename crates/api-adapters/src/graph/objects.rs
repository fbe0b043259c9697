//! Output types: what each operation returns and how entities are projected
//! onto a caller's selection set.

use chrono::{DateTime, SecondsFormat, Utc};
use domains::{Board, Comment, DomainError, Post, Result};
use serde_json::{Map, Value};

use super::document::Field;

pub const TYPENAME: &str = "__typename";

/// Static description of an object type in the schema.
#[derive(Debug)]
pub struct ObjectType {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

pub const BOARD: ObjectType = ObjectType {
    name: "Board",
    fields: &["id", "name", "description", "createdAt", "deletedAt"],
};

pub const POST: ObjectType = ObjectType {
    name: "Post",
    fields: &["id", "boardId", "title", "text", "submitterToken", "createdAt", "deletedAt"],
};

pub const COMMENT: ObjectType = ObjectType {
    name: "Comment",
    fields: &["id", "postId", "text", "submitterToken", "createdAt", "deletedAt"],
};

/// Declared result shape of an operation.
#[derive(Debug, Clone, Copy)]
pub enum ResultShape {
    Object(&'static ObjectType),
    List(&'static ObjectType),
    Boolean,
}

impl ResultShape {
    /// Checks `field`'s selection set against this shape without running
    /// anything.
    pub fn validate(&self, field: &Field) -> Result<()> {
        match self {
            ResultShape::Boolean => {
                if !field.selection_set.is_empty() {
                    return Err(DomainError::invalid(format!(
                        "field `{}` returns Boolean and cannot have a selection set",
                        field.name
                    )));
                }
                Ok(())
            }
            ResultShape::Object(ty) | ResultShape::List(ty) => {
                if field.selection_set.is_empty() {
                    return Err(DomainError::invalid(format!(
                        "field `{}` of type {} must have a selection set",
                        field.name, ty.name
                    )));
                }
                field.selection_set.iter().try_for_each(|sub| check_leaf(ty, sub))
            }
        }
    }
}

fn check_leaf(ty: &ObjectType, field: &Field) -> Result<()> {
    if field.name != TYPENAME && !ty.fields.contains(&field.name.as_str()) {
        return Err(DomainError::invalid(format!(
            "cannot query field `{}` on type {}",
            field.name, ty.name
        )));
    }
    if !field.arguments.is_empty() {
        return Err(DomainError::invalid(format!(
            "field `{}` on type {} takes no arguments",
            field.name, ty.name
        )));
    }
    if !field.selection_set.is_empty() {
        return Err(DomainError::invalid(format!(
            "field `{}` on type {} is a scalar and cannot have a selection set",
            field.name, ty.name
        )));
    }
    Ok(())
}

/// An entity that can be rendered as a schema object.
pub trait GraphObject {
    const TYPE: &'static ObjectType;

    fn field(&self, name: &str) -> Option<Value>;

    /// Renders the selected fields, keyed by alias.
    fn project(&self, selection: &[Field]) -> Value {
        let mut out = Map::with_capacity(selection.len());
        for field in selection {
            let value = if field.name == TYPENAME {
                Value::String(Self::TYPE.name.to_string())
            } else {
                self.field(&field.name).unwrap_or(Value::Null)
            };
            out.insert(field.response_key().to_string(), value);
        }
        Value::Object(out)
    }
}

fn id(id: i64) -> Value {
    Value::String(id.to_string())
}

fn timestamp(at: &DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn optional<T>(v: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    v.map(f).unwrap_or(Value::Null)
}

impl GraphObject for Board {
    const TYPE: &'static ObjectType = &BOARD;

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => id(self.id),
            "name" => Value::String(self.name.clone()),
            "description" => optional(self.description.clone(), Value::String),
            "createdAt" => timestamp(&self.created_at),
            "deletedAt" => optional(self.deleted_at.as_ref(), timestamp),
            _ => return None,
        })
    }
}

impl GraphObject for Post {
    const TYPE: &'static ObjectType = &POST;

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => id(self.id),
            "boardId" => id(self.board_id),
            "title" => optional(self.title.clone(), Value::String),
            "text" => Value::String(self.text.clone()),
            "submitterToken" => optional(self.submitter_token.clone(), Value::String),
            "createdAt" => timestamp(&self.created_at),
            "deletedAt" => optional(self.deleted_at.as_ref(), timestamp),
            _ => return None,
        })
    }
}

impl GraphObject for Comment {
    const TYPE: &'static ObjectType = &COMMENT;

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "id" => id(self.id),
            "postId" => id(self.post_id),
            "text" => Value::String(self.text.clone()),
            "submitterToken" => optional(self.submitter_token.clone(), Value::String),
            "createdAt" => timestamp(&self.created_at),
            "deletedAt" => optional(self.deleted_at.as_ref(), timestamp),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::document::parse;
    use chrono::TimeZone;
    use serde_json::json;

    fn selection(source: &str) -> Field {
        parse(source).unwrap().operations.remove(0).selection_set.remove(0)
    }

    #[test]
    fn every_declared_field_is_projectable() {
        let board = Board {
            id: 1,
            name: "rust".into(),
            description: None,
            created_at: Utc::now(),
            deleted_at: None,
        };
        for name in BOARD.fields {
            assert!(board.field(name).is_some(), "Board.{name}");
        }
        assert!(board.field("password").is_none());
    }

    #[test]
    fn projection_uses_aliases_and_string_ids() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let post = Post {
            id: 42,
            board_id: 7,
            title: None,
            text: "hello".into(),
            submitter_token: Some("tok".into()),
            created_at: created,
            deleted_at: Some(created),
        };
        let field = selection("{ post(id: \"42\") { key: id boardId title __typename createdAt deletedAt } }");
        assert_eq!(
            post.project(&field.selection_set),
            json!({
                "key": "42",
                "boardId": "7",
                "title": null,
                "__typename": "Post",
                "createdAt": "2024-03-01T12:00:00Z",
                "deletedAt": "2024-03-01T12:00:00Z",
            })
        );
    }

    #[test]
    fn timestamps_keep_sub_second_precision() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::microseconds(123_456);
        assert_eq!(timestamp(&at), json!("2024-03-01T12:00:00.123456Z"));

        let later = at + chrono::Duration::microseconds(1);
        assert_ne!(timestamp(&at), timestamp(&later));
    }

    #[test]
    fn selections_are_checked_against_the_shape() {
        let shape = ResultShape::Object(&COMMENT);
        assert!(shape.validate(&selection("{ comment(id: \"1\") { id text } }")).is_ok());
        assert!(shape.validate(&selection("{ comment(id: \"1\") }")).is_err());
        assert!(shape.validate(&selection("{ comment(id: \"1\") { title } }")).is_err());
        assert!(shape.validate(&selection("{ comment(id: \"1\") { id { x } } }")).is_err());
        assert!(shape.validate(&selection("{ comment(id: \"1\") { id(x: 1) } }")).is_err());

        let flag = ResultShape::Boolean;
        assert!(flag.validate(&selection("{ deletePost(id: \"1\") }")).is_ok());
        assert!(flag.validate(&selection("{ deletePost(id: \"1\") { id } }")).is_err());
    }
}
