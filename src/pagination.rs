//! Relay-style cursor pagination, client side

use serde::{Deserialize, Serialize};

use crate::{ClientError, Result};

/// Largest page the API serves
pub const MAX_PAGE_SIZE: i32 = 100;

/// Page information
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    #[serde(default)]
    pub start_cursor: Option<String>,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// Edge in a connection
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

/// Connection (paginated result)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// Nodes in page order
    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }

    pub fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|e| e.node).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Input for the page after this one, if there is one
    pub fn next_page(&self, current: &PaginationInput) -> Option<PaginationInput> {
        if !self.page_info.has_next_page {
            return None;
        }
        let cursor = self.page_info.end_cursor.clone()?;
        Some(PaginationInput {
            first: Some(current.limit()),
            after: Some(cursor),
            last: None,
            before: None,
        })
    }

    /// Input for the page before this one, if there is one
    pub fn previous_page(&self, current: &PaginationInput) -> Option<PaginationInput> {
        if !self.page_info.has_previous_page {
            return None;
        }
        let cursor = self.page_info.start_cursor.clone()?;
        Some(PaginationInput {
            first: None,
            after: None,
            last: Some(current.limit()),
            before: Some(cursor),
        })
    }
}

/// Pagination arguments sent with connection queries
///
/// Follows the Relay Cursor Connections Specification:
/// https://relay.dev/graphql/connections.htm
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationInput {
    /// Number of items to return (forward pagination)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<i32>,

    /// Cursor to start from (forward pagination)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,

    /// Number of items to return (backward pagination)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<i32>,

    /// Cursor to start from (backward pagination)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl PaginationInput {
    /// First `n` items
    pub fn first(n: i32) -> Self {
        Self {
            first: Some(n),
            after: None,
            last: None,
            before: None,
        }
    }

    /// Validate before sending, so the API never sees a request it would reject
    pub fn validate(&self) -> Result<()> {
        if self.first.is_some() && self.last.is_some() {
            return Err(ClientError::InvalidPagination(
                "Cannot specify both 'first' and 'last'".to_string(),
            ));
        }

        for (name, value) in [("first", self.first), ("last", self.last)] {
            if let Some(n) = value {
                if n < 0 {
                    return Err(ClientError::InvalidPagination(format!(
                        "'{name}' must be non-negative"
                    )));
                }
                if n > MAX_PAGE_SIZE {
                    return Err(ClientError::InvalidPagination(format!(
                        "'{name}' cannot exceed {MAX_PAGE_SIZE}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Page size
    pub fn limit(&self) -> i32 {
        self.first.or(self.last).unwrap_or(20).min(MAX_PAGE_SIZE)
    }

    pub fn is_forward(&self) -> bool {
        self.first.is_some() || self.after.is_some()
    }

    pub fn is_backward(&self) -> bool {
        self.last.is_some() || self.before.is_some()
    }
}

impl Default for PaginationInput {
    fn default() -> Self {
        Self::first(20)
    }
}
