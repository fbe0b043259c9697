//! # Executor
//!
//! Runs one request document against the [`Schema`]. Every top-level field
//! is an independent operation: its selection and arguments are checked
//! first, then it runs, and any failure is reported for that field alone.
//! Query fields run concurrently; mutation fields run one after another in
//! document order.

use std::collections::HashSet;
use std::sync::Arc;

use domains::{DomainError, Result};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use services::{ContentService, RequestContext};
use tracing::{debug, instrument};

use super::document::{self, Field, Operation, OperationKind, VariableDefinition};
use super::objects::TYPENAME;
use super::schema::{OperationDef, Schema};

/// A decoded request body.
#[derive(Debug, Clone, Default)]
pub struct GraphRequest {
    pub query: String,
    pub variables: Map<String, Value>,
    pub operation_name: Option<String>,
}

impl GraphRequest {
    /// Validates the envelope: `query` must be a string, `variables` an
    /// object or null, `operationName` a string or null.
    pub fn from_json(body: Value) -> Result<Self> {
        let Value::Object(mut body) = body else {
            return Err(DomainError::invalid("request body must be a JSON object"));
        };
        let query = match body.remove("query") {
            Some(Value::String(q)) => q,
            Some(_) => return Err(DomainError::invalid("`query` must be a string")),
            None => return Err(DomainError::invalid("missing `query` field")),
        };
        let variables = match body.remove("variables") {
            Some(Value::Object(vars)) => vars,
            Some(Value::Null) | None => Map::new(),
            Some(_) => return Err(DomainError::invalid("`variables` must be an object")),
        };
        let operation_name = match body.remove("operationName") {
            Some(Value::String(name)) => Some(name),
            Some(Value::Null) | None => None,
            Some(_) => return Err(DomainError::invalid("`operationName` must be a string")),
        };
        Ok(Self { query, variables, operation_name })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    pub extensions: ErrorExtensions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorExtensions {
    pub code: &'static str,
}

impl GraphError {
    fn new(err: &DomainError, path: Vec<String>) -> Self {
        let message = match err {
            // Internal detail stays in the logs.
            DomainError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self { message, path, extensions: ErrorExtensions { code: err.kind().code() } }
    }
}

/// Per-operation result, kept for metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub operation: String,
    /// `"ok"` or the error code.
    pub outcome: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
    #[serde(skip)]
    pub outcomes: Vec<OperationOutcome>,
}

impl GraphResponse {
    /// A response for a request that never reached any operation.
    pub fn request_error(err: DomainError) -> Self {
        Self { data: None, errors: vec![GraphError::new(&err, Vec::new())], outcomes: Vec::new() }
    }

    /// True when the request was rejected as a whole.
    pub fn is_request_error(&self) -> bool {
        self.data.is_none()
    }
}

/// Variable values in scope for one operation.
struct Variables {
    values: Map<String, Value>,
    declared: HashSet<String>,
}

enum Planned<'a> {
    Typename(&'a Field),
    Run { field: &'a Field, op: &'a OperationDef, args: Value },
    Failed { field: &'a Field, err: DomainError },
}

pub struct Executor {
    schema: Arc<Schema>,
    content: Arc<ContentService>,
}

impl Executor {
    pub fn new(schema: Arc<Schema>, content: Arc<ContentService>) -> Self {
        Self { schema, content }
    }

    #[instrument(skip_all, fields(operation_name = request.operation_name.as_deref()))]
    pub async fn execute(&self, ctx: &RequestContext, request: GraphRequest) -> GraphResponse {
        let document = match document::parse(&request.query) {
            Ok(doc) => doc,
            Err(e) => return GraphResponse::request_error(DomainError::invalid(e.to_string())),
        };
        let operation = match document.select(request.operation_name.as_deref()) {
            Ok(op) => op,
            Err(msg) => return GraphResponse::request_error(DomainError::invalid(msg)),
        };
        let variables = match bind_variables(&operation.variables, request.variables) {
            Ok(vars) => vars,
            Err(err) => return GraphResponse::request_error(err),
        };
        if let Err(err) = unique_response_keys(operation) {
            return GraphResponse::request_error(err);
        }

        let plan: Vec<Planned<'_>> = operation
            .selection_set
            .iter()
            .map(|field| self.plan(operation.kind, field, &variables))
            .collect();

        let results: Vec<Option<Result<Value>>> = match operation.kind {
            OperationKind::Query => {
                join_all(plan.iter().map(|step| self.run(ctx, step))).await
            }
            OperationKind::Mutation => {
                let mut out = Vec::with_capacity(plan.len());
                for step in &plan {
                    out.push(self.run(ctx, step).await);
                }
                out
            }
        };

        let mut response = GraphResponse { data: Some(Map::new()), ..Default::default() };
        for (step, result) in plan.iter().zip(results) {
            let field = step.field();
            let key = field.response_key().to_string();
            let value = match result {
                None => Value::String(operation.kind.root_type().to_string()),
                Some(Ok(value)) => {
                    response.outcomes.push(OperationOutcome { operation: step.label(), outcome: "ok" });
                    value
                }
                Some(Err(err)) => {
                    debug!(field = %key, error = %err, "operation failed");
                    response.outcomes.push(OperationOutcome { operation: step.label(), outcome: err.kind().code() });
                    response.errors.push(GraphError::new(&err, vec![key.clone()]));
                    Value::Null
                }
            };
            if let Some(data) = response.data.as_mut() {
                data.insert(key, value);
            }
        }
        response
    }

    fn plan<'a>(&'a self, kind: OperationKind, field: &'a Field, vars: &Variables) -> Planned<'a> {
        if field.name == TYPENAME {
            return Planned::Typename(field);
        }
        let Some(op) = self.schema.operation(kind, &field.name) else {
            let err = DomainError::invalid(format!(
                "cannot query field `{}` on type {}",
                field.name,
                kind.root_type()
            ));
            return Planned::Failed { field, err };
        };
        let prepared = op.shape.validate(field).and_then(|()| arguments(field, vars));
        match prepared {
            Ok(args) => Planned::Run { field, op, args },
            Err(err) => Planned::Failed { field, err },
        }
    }

    /// `None` marks a `__typename` step, which has no outcome.
    async fn run(&self, ctx: &RequestContext, step: &Planned<'_>) -> Option<Result<Value>> {
        match step {
            Planned::Typename(_) => None,
            Planned::Failed { err, .. } => Some(Err(err.clone())),
            Planned::Run { field, op, args } => {
                let resolved = op.resolve(self.content.clone(), ctx.clone(), args.clone()).await;
                Some(resolved.map(|value| value.render(&field.selection_set)))
            }
        }
    }
}

impl Planned<'_> {
    fn field(&self) -> &Field {
        match self {
            Planned::Typename(field) | Planned::Run { field, .. } | Planned::Failed { field, .. } => field,
        }
    }

    /// Metric label; unknown names collapse to one value.
    fn label(&self) -> String {
        match self {
            Planned::Run { op, .. } => op.name.to_string(),
            _ => "unknown".to_string(),
        }
    }
}

fn unique_response_keys(operation: &Operation) -> Result<()> {
    let mut seen = HashSet::new();
    for field in &operation.selection_set {
        if !seen.insert(field.response_key()) {
            return Err(DomainError::invalid(format!(
                "response key `{}` is used by more than one field",
                field.response_key()
            )));
        }
    }
    Ok(())
}

fn bind_variables(defs: &[VariableDefinition], mut provided: Map<String, Value>) -> Result<Variables> {
    let mut values = Map::new();
    let mut declared = HashSet::new();
    let empty = Variables { values: Map::new(), declared: HashSet::new() };

    for def in defs {
        if !declared.insert(def.name.clone()) {
            return Err(DomainError::invalid(format!("variable `${}` is declared twice", def.name)));
        }
        let value = match provided.remove(&def.name) {
            Some(v) => Some(v),
            None => match &def.default {
                Some(default) => to_json(default, &empty)?,
                None => None,
            },
        };
        match value {
            Some(Value::Null) | None if def.ty.ends_with('!') => {
                return Err(DomainError::invalid(format!(
                    "variable `${}` of required type `{}` was not provided",
                    def.name, def.ty
                )));
            }
            Some(v) => {
                values.insert(def.name.clone(), v);
            }
            None => {}
        }
    }
    Ok(Variables { values, declared })
}

/// Builds the argument object for a field. Top-level nulls and unset
/// variables count as "not given" so defaults apply.
fn arguments(field: &Field, vars: &Variables) -> Result<Value> {
    let mut out = Map::new();
    for (name, value) in &field.arguments {
        match to_json(value, vars)? {
            Some(Value::Null) | None => {}
            Some(v) => {
                out.insert(name.clone(), v);
            }
        }
    }
    Ok(Value::Object(out))
}

fn to_json(value: &document::Value, vars: &Variables) -> Result<Option<Value>> {
    use document::Value as V;
    Ok(Some(match value {
        V::Variable(name) => {
            if !vars.declared.contains(name) {
                return Err(DomainError::invalid(format!("variable `${name}` is not defined")));
            }
            return Ok(vars.values.get(name).cloned());
        }
        V::Int(i) => Value::Number((*i).into()),
        V::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        V::String(s) => Value::String(s.clone()),
        V::Boolean(b) => Value::Bool(*b),
        V::Null => Value::Null,
        V::Enum(name) => {
            return Err(DomainError::invalid(format!("enum value `{name}` is not valid here")));
        }
        V::List(items) => Value::Array(
            items
                .iter()
                .map(|item| to_json(item, vars).map(|v| v.unwrap_or(Value::Null)))
                .collect::<Result<_>>()?,
        ),
        V::Object(fields) => {
            let mut out = Map::new();
            for (key, item) in fields {
                if let Some(v) = to_json(item, vars)? {
                    out.insert(key.clone(), v);
                }
            }
            Value::Object(out)
        }
    }))
}
