//! Authorization header injection
//!
//! Provides helpers for:
//! - Building the `Authorization: JWT <token>` value from the stored session
//! - Reading the token back out of a request's headers
//! - The [`AuthLink`] stage that stamps every outgoing operation

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::link::{Link, Next};
use crate::session::TokenStore;
use crate::types::{GraphQLResponse, Operation};
use crate::{ClientError, Result};

/// Scheme the API expects in front of the access token
pub const AUTH_SCHEME: &str = "JWT";

/// `Authorization` value for an optional token
///
/// With no token this is the literal `"JWT "`: the header is still sent, with an
/// empty credential, and the API answers as for an anonymous request.
pub fn authorization_value(token: Option<&str>) -> String {
    format!("{AUTH_SCHEME} {}", token.unwrap_or_default())
}

/// Set the `Authorization` header on `headers`
pub fn set_authorization(headers: &mut HeaderMap, token: Option<&str>) -> Result<()> {
    let value = HeaderValue::from_str(&authorization_value(token))
        .map_err(|e| ClientError::InvalidHeader(e.to_string()))?;
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

/// Extract the token from a `JWT <token>` Authorization header
///
/// Returns `None` when the header is missing, uses another scheme or carries an empty token.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix(AUTH_SCHEME))
        .and_then(|rest| rest.strip_prefix(' '))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Attaches the current access token to every operation
pub struct AuthLink {
    store: TokenStore,
}

impl AuthLink {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Link for AuthLink {
    async fn request(&self, mut operation: Operation, next: Next<'_>) -> Result<GraphQLResponse> {
        let token = self.store.access_token().await;
        set_authorization(&mut operation.context.headers, token.as_deref())?;
        next.run(operation).await
    }
}
