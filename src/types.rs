//! GraphQL-over-HTTP wire types

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Source location attached to a GraphQL error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// A single entry of the `errors` array in a GraphQL response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

impl ResponseError {
    /// Error with only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Attach an `extensions.code` value
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert("code".to_string(), Value::String(code.into()));
        self
    }

    /// `extensions.code`, when the server sent one
    pub fn code(&self) -> Option<&str> {
        self.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .and_then(Value::as_str)
    }

    /// Dotted rendering of `path`, e.g. `business.campaigns.0`
    pub fn path_display(&self) -> Option<String> {
        self.path.as_ref().map(|segments| {
            segments
                .iter()
                .map(|s| match s {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".")
        })
    }
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Response body `{ data, errors }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
}

impl GraphQLResponse {
    /// Successful response carrying `data`
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Error-only response (`data: null`)
    pub fn from_errors(errors: Vec<ResponseError>) -> Self {
        Self { data: None, errors }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Per-call context threaded through the link chain
///
/// Links may rewrite `headers`; `request_id` only tags log lines.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub headers: HeaderMap,
    pub request_id: Uuid,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            request_id: Uuid::new_v4(),
        }
    }
}

/// A single query or mutation invocation
#[derive(Debug, Clone)]
pub struct Operation {
    pub query: String,
    pub variables: Value,
    pub operation_name: Option<String>,
    pub context: OperationContext,
}

/// JSON body posted to the endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody<'a> {
    pub query: &'a str,
    pub variables: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<&'a str>,
}

impl Operation {
    /// New operation with empty variables
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: Value::Object(Map::new()),
            operation_name: None,
            context: OperationContext::default(),
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Name used in log lines
    pub fn display_name(&self) -> &str {
        self.operation_name.as_deref().unwrap_or("anonymous")
    }

    pub fn body(&self) -> RequestBody<'_> {
        RequestBody {
            query: &self.query,
            variables: &self.variables,
            operation_name: self.operation_name.as_deref(),
        }
    }

    /// Cache key: operation name, document and variables
    ///
    /// Object keys are sorted first, so equal variable sets render identically.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.display_name(),
            self.query,
            sorted_keys(&self.variables)
        )
    }
}

fn sorted_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_keys).collect()),
        other => other.clone(),
    }
}
