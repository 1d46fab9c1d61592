//! HTTP transport: the terminating stage of the link chain

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::config::ClientConfig;
use crate::types::{GraphQLResponse, Operation};
use crate::{ClientError, Result};

/// Sends an operation to the API and returns its response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, operation: &Operation) -> Result<GraphQLResponse>;
}

/// GraphQL-over-HTTP POST transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// Build a transport for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        Ok(Self::with_http_client(http, config.api_url().clone()))
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    pub fn with_http_client(http: Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, operation: &Operation) -> Result<GraphQLResponse> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(operation.context.headers.clone())
            .json(&operation.body())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response.json::<GraphQLResponse>().await.map_err(Into::into);
        }

        // Servers often put GraphQL errors in the body of a 4xx/5xx
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            response: serde_json::from_str(&body).ok(),
        })
    }
}
