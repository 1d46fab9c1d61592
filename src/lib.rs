//! # referral-graphql-client
//!
//! GraphQL client for the referral & loyalty dashboards.
//!
//! ## Features
//!
//! - **Token Store** - persisted `userData` session with atomic updates
//! - **Link Pipeline** - Log → Auth → Refresh → Error → Transport
//! - **Token Refresh** - one-shot refresh-and-retry on expired signatures, coalesced
//! - **Response Cache** - fetch policies, targeted cache edits, watched queries
//! - **Operation Contracts** - typed documents for the dashboard views
//! - **Relay Pagination** - client-side connections and page inputs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use referral_graphql_client::{
//!     ClientConfig, GraphQLClient, HttpTransport, MemoryBackend, TokenStore,
//! };
//!
//! # async fn example() -> referral_graphql_client::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let store = TokenStore::from_config(Arc::new(MemoryBackend::default()), &config);
//! let transport = Arc::new(HttpTransport::new(&config)?);
//! let client = GraphQLClient::standard(store, transport);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod documents;
pub mod link;
pub mod logging;
pub mod pagination;
pub mod refresh;
pub mod session;
pub mod transport;
pub mod types;
pub mod view;

pub use auth::{authorization_value, extract_token, AuthLink};
pub use cache::{CacheEntry, MemoryCache, ResponseCache};
pub use client::{FetchPolicy, GraphQLClient, QueryWatch};
pub use config::ClientConfig;
pub use documents::OperationContract;
pub use link::{Link, LinkChain, Next};
pub use logging::{init_tracing, ErrorLink, LogLink};
pub use pagination::{Connection, Edge, PageInfo, PaginationInput};
pub use refresh::{
    ExpirySignal, GraphQLRefresher, RefreshLink, RefreshMode, RefreshState, TokenPair,
    TokenRefresher,
};
pub use session::{FileBackend, MemoryBackend, Session, SessionBackend, TokenStore};
pub use transport::{HttpTransport, Transport};
pub use types::{GraphQLResponse, Location, Operation, OperationContext, ResponseError};
pub use view::{login_route, mount_dashboard, Mount, ViewState};

use thiserror::Error;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from GraphQL endpoint")]
    Status {
        status: u16,
        response: Option<GraphQLResponse>,
    },

    #[error("GraphQL error: {}", join_messages(.0))]
    GraphQL(Vec<ResponseError>),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Malformed session: {0}")]
    MalformedSession(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("No refresh token stored")]
    MissingRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pagination error: {0}")]
    InvalidPagination(String),
}

fn join_messages(errors: &[ResponseError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ClientError {
    /// GraphQL errors carried by this error, either directly or inside an HTTP error body
    pub fn graphql_errors(&self) -> &[ResponseError] {
        match self {
            Self::GraphQL(errors) => errors,
            Self::Status {
                response: Some(response),
                ..
            } => &response.errors,
            _ => &[],
        }
    }

    /// Whether any carried GraphQL error is the expired-credential signal
    pub fn is_expired_signature(&self, signal: &ExpirySignal) -> bool {
        self.graphql_errors().iter().any(|e| signal.matches(e))
    }

    /// The caller has to send the user back through login
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::MissingRefreshToken | Self::RefreshFailed(_) | Self::MalformedSession(_)
        )
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_errors_from_status_body() {
        let err = ClientError::Status {
            status: 401,
            response: Some(GraphQLResponse::from_errors(vec![ResponseError::new(
                "Signature has expired",
            )])),
        };
        assert_eq!(err.graphql_errors().len(), 1);
        assert!(err.is_expired_signature(&ExpirySignal::default()));
    }

    #[test]
    fn test_network_error_is_not_expiry() {
        let err = ClientError::Network("connection reset".to_string());
        assert!(err.graphql_errors().is_empty());
        assert!(!err.is_expired_signature(&ExpirySignal::default()));
        assert!(!err.requires_reauthentication());
    }

    #[test]
    fn test_graphql_error_display_joins_messages() {
        let err = ClientError::GraphQL(vec![
            ResponseError::new("Campaign not found"),
            ResponseError::new("Permission denied"),
        ]);
        assert_eq!(
            err.to_string(),
            "GraphQL error: Campaign not found; Permission denied"
        );
    }

    #[test]
    fn test_refresh_failures_require_reauthentication() {
        assert!(ClientError::MissingRefreshToken.requires_reauthentication());
        assert!(ClientError::RefreshFailed("boom".into()).requires_reauthentication());
    }
}
