//! Log and error links, and tracing setup
//!
//! Both links only observe: operations and results pass through unchanged.

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use crate::link::{Link, Next};
use crate::types::{GraphQLResponse, Operation, ResponseError};
use crate::{ClientError, Result};

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Logs every outgoing operation
pub struct LogLink;

#[async_trait]
impl Link for LogLink {
    async fn request(&self, operation: Operation, next: Next<'_>) -> Result<GraphQLResponse> {
        tracing::debug!(
            operation = operation.display_name(),
            request_id = %operation.context.request_id,
            query = %operation.query,
            variables = %operation.variables,
            "sending GraphQL operation"
        );
        next.run(operation).await
    }
}

/// Logs GraphQL and transport errors on the way back
pub struct ErrorLink;

fn log_graphql_error(operation: &str, error: &ResponseError) {
    let locations = error
        .locations
        .iter()
        .map(|l| format!("{}:{}", l.line, l.column))
        .collect::<Vec<_>>()
        .join(",");
    tracing::warn!(
        operation = %operation,
        message = %error.message,
        locations = %locations,
        path = %error.path_display().unwrap_or_default(),
        "GraphQL error"
    );
}

/// Log message for a failed request
fn failure_message(err: &ClientError) -> &'static str {
    match err {
        ClientError::Network(_) => "network error",
        ClientError::Status { .. } => "error status from GraphQL endpoint",
        ClientError::MissingRefreshToken | ClientError::RefreshFailed(_) => "token refresh failed",
        _ => "request failed",
    }
}

#[async_trait]
impl Link for ErrorLink {
    async fn request(&self, operation: Operation, next: Next<'_>) -> Result<GraphQLResponse> {
        let name = operation.display_name().to_string();
        let result = next.run(operation).await;
        match &result {
            Ok(response) => {
                for error in &response.errors {
                    log_graphql_error(&name, error);
                }
            }
            Err(err) => {
                for error in err.graphql_errors() {
                    log_graphql_error(&name, error);
                }
                tracing::error!(operation = %name, error = %err, "{}", failure_message(err));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::{network_down, ScriptedTransport};
    use crate::link::LinkChain;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_failure_message_by_kind() {
        assert_eq!(
            failure_message(&ClientError::Network("reset".into())),
            "network error"
        );
        assert_eq!(
            failure_message(&ClientError::Status {
                status: 502,
                response: None
            }),
            "error status from GraphQL endpoint"
        );
        assert_eq!(
            failure_message(&ClientError::RefreshFailed("revoked".into())),
            "token refresh failed"
        );
        assert_eq!(
            failure_message(&ClientError::MissingRefreshToken),
            "token refresh failed"
        );
        assert_eq!(
            failure_message(&ClientError::Decode("bad json".into())),
            "request failed"
        );
    }

    #[tokio::test]
    async fn test_links_pass_results_through_unchanged() {
        init_tracing();
        let transport = Arc::new(ScriptedTransport::new(network_down));
        let with_errors = GraphQLResponse {
            data: Some(json!({ "campaign": null })),
            errors: vec![ResponseError::new("Campaign not found")],
        };
        transport.push(Ok(with_errors.clone()));
        let chain = LinkChain::new(transport.clone())
            .link(LogLink)
            .link(ErrorLink);

        let op = Operation::new("query Campaign { campaign { id } }")
            .with_operation_name("Campaign")
            .with_variables(json!({ "id": "c1" }));

        let resp = chain.execute(op.clone()).await.unwrap();
        assert_eq!(resp, with_errors);

        let err = chain.execute(op).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));

        let sent = transport.operations();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].variables, json!({ "id": "c1" }));
        assert!(sent[0].context.headers.is_empty());
    }
}
