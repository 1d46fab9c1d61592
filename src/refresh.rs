//! Expired-token refresh and retry
//!
//! When the API reports an expired signature, [`RefreshLink`] exchanges the
//! stored refresh token for a new token pair, persists it and replays the
//! failed operation once. The replay runs through the links after this one
//! only, so an expiry on the replay is returned to the caller instead of
//! triggering another refresh.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::auth::{extract_token, set_authorization};
use crate::documents::{OperationContract, RefreshToken, RefreshTokenVariables};
use crate::link::{Link, Next};
use crate::session::TokenStore;
use crate::transport::Transport;
use crate::types::{GraphQLResponse, Operation, ResponseError};
use crate::{ClientError, Result};

/// Message the API uses for an expired access token
pub const EXPIRED_SIGNATURE: &str = "Signature has expired";

/// Recognizes the expired-credential signal in GraphQL errors
///
/// Matches on the exact error message by default. When the API exposes a
/// stable `extensions.code`, configure it with [`with_code`](Self::with_code).
#[derive(Debug, Clone)]
pub struct ExpirySignal {
    message: Option<String>,
    code: Option<String>,
}

impl Default for ExpirySignal {
    fn default() -> Self {
        Self {
            message: Some(EXPIRED_SIGNATURE.to_string()),
            code: None,
        }
    }
}

impl ExpirySignal {
    /// Match only on `extensions.code`
    pub fn code_only(code: impl Into<String>) -> Self {
        Self {
            message: None,
            code: Some(code.into()),
        }
    }

    /// Additionally match on `extensions.code`
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn matches(&self, error: &ResponseError) -> bool {
        let by_message = self.message.as_deref() == Some(error.message.as_str());
        let by_code = self.code.is_some() && self.code.as_deref() == error.code();
        by_message || by_code
    }

    pub fn matches_response(&self, response: &GraphQLResponse) -> bool {
        response.errors.iter().any(|e| self.matches(e))
    }
}

/// Token pair returned by the `refreshToken` mutation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

/// Runs the `refreshToken` mutation straight on the transport, outside the link chain
pub struct GraphQLRefresher {
    transport: Arc<dyn Transport>,
}

impl GraphQLRefresher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TokenRefresher for GraphQLRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let operation = RefreshToken::operation(&RefreshTokenVariables {
            refresh_token: refresh_token.to_string(),
        })?;

        let response = self
            .transport
            .execute(&operation)
            .await
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;

        if response.has_errors() {
            return Err(ClientError::RefreshFailed(
                ClientError::GraphQL(response.errors).to_string(),
            ));
        }

        let data = RefreshToken::decode(response.data)
            .map_err(|e| ClientError::RefreshFailed(e.to_string()))?;
        let payload = data
            .refresh_token
            .ok_or_else(|| ClientError::RefreshFailed("empty refreshToken payload".into()))?;

        match (payload.token, payload.refresh_token) {
            (Some(token), Some(refresh_token)) => Ok(TokenPair {
                token,
                refresh_token,
            }),
            _ => Err(ClientError::RefreshFailed(
                "refreshToken payload is missing a token".into(),
            )),
        }
    }
}

/// How concurrent expiries are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// One refresh at a time; requests that expired on a token that has since
    /// been replaced reuse the new token instead of refreshing again
    #[default]
    Coalesced,
    /// Every expired request refreshes on its own
    Independent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Normal,
    Refreshing,
}

/// Refresh-and-retry stage of the link chain
pub struct RefreshLink {
    store: TokenStore,
    refresher: Arc<dyn TokenRefresher>,
    signal: ExpirySignal,
    mode: RefreshMode,
    clear_session_on_failure: bool,
    gate: Mutex<Round>,
    generation: AtomicU64,
    in_flight: AtomicUsize,
}

/// Last completed coalesced refresh
#[derive(Default)]
struct Round {
    generation: u64,
    outcome: Option<RoundOutcome>,
}

/// What waiters that queued behind a round are handed
enum RoundOutcome {
    Refreshed(String),
    MissingRefreshToken,
    Failed(String),
}

impl RoundOutcome {
    fn record(result: &Result<String>) -> Self {
        match result {
            Ok(token) => Self::Refreshed(token.clone()),
            Err(ClientError::MissingRefreshToken) => Self::MissingRefreshToken,
            Err(ClientError::RefreshFailed(reason)) => Self::Failed(reason.clone()),
            Err(err) => Self::Failed(err.to_string()),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RefreshLink {
    pub fn new(store: TokenStore, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            signal: ExpirySignal::default(),
            mode: RefreshMode::default(),
            clear_session_on_failure: false,
            gate: Mutex::new(Round::default()),
            generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: ExpirySignal) -> Self {
        self.signal = signal;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    /// Remove the stored session when a refresh cannot be completed (off by default)
    #[must_use]
    pub fn clear_session_on_failure(mut self, clear: bool) -> Self {
        self.clear_session_on_failure = clear;
        self
    }

    pub fn state(&self) -> RefreshState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            RefreshState::Refreshing
        } else {
            RefreshState::Normal
        }
    }

    fn is_expired(&self, result: &Result<GraphQLResponse>) -> bool {
        match result {
            Ok(response) => self.signal.matches_response(response),
            Err(err) => err.is_expired_signature(&self.signal),
        }
    }

    /// Access token to retry with
    ///
    /// `seen` is the refresh generation observed when the request was sent. In
    /// coalesced mode a round that completed since then is shared: its new
    /// token is reused, or its failure is returned without another refresh call.
    async fn obtain_token(&self, failed_token: Option<&str>, seen: u64) -> Result<String> {
        if self.mode == RefreshMode::Independent {
            return self.refresh_now().await;
        }

        let mut round = self.gate.lock().await;
        let current = self.store.access_token().await;

        if round.generation != seen {
            match &round.outcome {
                Some(RoundOutcome::Refreshed(token)) => {
                    tracing::debug!("access token already refreshed by a concurrent request");
                    return Ok(current.unwrap_or_else(|| token.clone()));
                }
                Some(RoundOutcome::MissingRefreshToken) => {
                    return Err(ClientError::MissingRefreshToken);
                }
                Some(RoundOutcome::Failed(reason)) => {
                    tracing::debug!("concurrent token refresh already failed");
                    return Err(ClientError::RefreshFailed(reason.clone()));
                }
                None => {}
            }
        }

        if let Some(current) = current {
            if failed_token != Some(current.as_str()) {
                tracing::debug!("access token already refreshed by a concurrent request");
                return Ok(current);
            }
        }

        let result = self.refresh_now().await;
        round.generation += 1;
        round.outcome = Some(RoundOutcome::record(&result));
        self.generation.store(round.generation, Ordering::SeqCst);
        result
    }

    async fn refresh_now(&self) -> Result<String> {
        let refresh_token = self
            .store
            .refresh_token()
            .await
            .ok_or(ClientError::MissingRefreshToken)?;

        let pair = {
            let _in_flight = InFlight::enter(&self.in_flight);
            self.refresher.refresh(&refresh_token).await?
        };

        self.store
            .set_tokens(pair.token.clone(), pair.refresh_token)
            .await?;
        tracing::info!("session tokens refreshed");
        Ok(pair.token)
    }
}

#[async_trait]
impl Link for RefreshLink {
    async fn request(&self, operation: Operation, next: Next<'_>) -> Result<GraphQLResponse> {
        let mut retry = operation.clone();
        let seen = self.generation.load(Ordering::SeqCst);
        let result = next.run(operation).await;
        if !self.is_expired(&result) {
            return result;
        }

        tracing::info!(
            operation = retry.display_name(),
            request_id = %retry.context.request_id,
            "access token expired, refreshing"
        );

        let failed_token = extract_token(&retry.context.headers);
        let token = match self.obtain_token(failed_token.as_deref(), seen).await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(
                    operation = retry.display_name(),
                    error = %err,
                    "token refresh failed"
                );
                if self.clear_session_on_failure {
                    self.store.clear().await?;
                }
                return Err(err);
            }
        };

        set_authorization(&mut retry.context.headers, Some(token.as_str()))?;
        next.run(retry).await
    }
}
