//! Request/response client over the link chain
//!
//! Views call [`GraphQLClient::query`] / [`GraphQLClient::mutate`] with a typed
//! [`OperationContract`], or [`GraphQLClient::watch`] to keep a
//! [`ViewState`] up to date until the watch is dropped.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

use crate::cache::{MemoryCache, ResponseCache};
use crate::documents::{
    MarkNotificationRead, NotificationIdVariables, Notifications, OperationContract,
    UserVariables,
};
use crate::link::LinkChain;
use crate::refresh::GraphQLRefresher;
use crate::session::TokenStore;
use crate::transport::Transport;
use crate::types::{GraphQLResponse, Operation};
use crate::view::ViewState;
use crate::{ClientError, Result};

/// Where a query reads its result from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Serve a fresh cached result when there is one, otherwise fetch and cache
    #[default]
    CacheFirst,
    /// Always fetch, then cache
    NetworkOnly,
    /// Always fetch, leave the cache alone
    NoCache,
}

/// GraphQL client shared by all views
#[derive(Clone)]
pub struct GraphQLClient {
    chain: LinkChain,
    cache: Arc<dyn ResponseCache>,
    max_age: Option<chrono::Duration>,
}

impl GraphQLClient {
    /// Client over an arbitrary chain, with an in-memory cache
    pub fn new(chain: LinkChain) -> Self {
        Self {
            chain,
            cache: Arc::new(MemoryCache::new()),
            max_age: None,
        }
    }

    /// Client over the standard Log → Auth → Refresh → Error chain
    pub fn standard(store: TokenStore, transport: Arc<dyn Transport>) -> Self {
        let refresher = Arc::new(GraphQLRefresher::new(transport.clone()));
        Self::new(LinkChain::standard(store, transport, refresher))
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Cached results older than `max_age` are refetched under [`FetchPolicy::CacheFirst`]
    #[must_use]
    pub fn with_max_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn cache(&self) -> &Arc<dyn ResponseCache> {
        &self.cache
    }

    /// Run an operation through the chain, bypassing the cache
    pub async fn execute(&self, operation: Operation) -> Result<GraphQLResponse> {
        self.chain.execute(operation).await
    }

    /// `data` for an operation under `policy`
    ///
    /// A response carrying any GraphQL error is returned as [`ClientError::GraphQL`].
    pub async fn fetch_data(&self, operation: Operation, policy: FetchPolicy) -> Result<Value> {
        let key = operation.fingerprint();

        if policy == FetchPolicy::CacheFirst {
            if let Some(entry) = self.cache.get(&key).await {
                if entry.is_fresh(self.max_age, chrono::Utc::now()) {
                    tracing::debug!(operation = operation.display_name(), "cache hit");
                    return Ok(entry.data);
                }
            }
        }

        let response = self.chain.execute(operation).await?;
        if response.has_errors() {
            return Err(ClientError::GraphQL(response.errors));
        }
        let data = response.data.unwrap_or(Value::Null);

        if policy != FetchPolicy::NoCache {
            self.cache.put(&key, data.clone()).await;
        }
        Ok(data)
    }

    pub async fn query<C: OperationContract>(
        &self,
        variables: &C::Variables,
        policy: FetchPolicy,
    ) -> Result<C::Response> {
        let data = self.fetch_data(C::operation(variables)?, policy).await?;
        C::decode(Some(data))
    }

    /// Mutations never read or write the cache
    pub async fn mutate<C: OperationContract>(&self, variables: &C::Variables) -> Result<C::Response> {
        let data = self
            .fetch_data(C::operation(variables)?, FetchPolicy::NoCache)
            .await?;
        C::decode(Some(data))
    }

    /// Cache key of a contract call
    pub fn cache_key<C: OperationContract>(variables: &C::Variables) -> Result<String> {
        Ok(C::operation(variables)?.fingerprint())
    }

    /// Mark a notification read, then flip its flag in the user's cached notification list
    pub async fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> Result<bool> {
        let data = self
            .mutate::<MarkNotificationRead>(&NotificationIdVariables {
                id: notification_id.to_string(),
            })
            .await?;
        let success = data.mark_notification_read.is_some_and(|p| p.success);
        if !success {
            return Ok(false);
        }

        let key = Self::cache_key::<Notifications>(&UserVariables {
            user_id: user_id.to_string(),
        })?;
        let id = notification_id.to_string();
        self.cache
            .modify(
                &key,
                Box::new(move |data: &mut Value| {
                    if let Some(list) = data
                        .get_mut("notifications")
                        .and_then(Value::as_array_mut)
                    {
                        for item in list.iter_mut() {
                            if item.get("id").and_then(Value::as_str) == Some(id.as_str()) {
                                item["read"] = Value::Bool(true);
                            }
                        }
                    }
                }),
            )
            .await;
        Ok(true)
    }

    /// Fetch `C` in the background and keep publishing its state
    ///
    /// The first fetch is cache-first; [`QueryWatch::refetch`] goes to the network.
    /// Cache edits to this query's entry are republished. Dropping the watch cancels it.
    pub fn watch<C>(&self, variables: &C::Variables) -> Result<QueryWatch<C>>
    where
        C: OperationContract + 'static,
        C::Response: Clone + Send + Sync + 'static,
    {
        let operation = C::operation(variables)?;
        let (tx, rx) = watch::channel(ViewState::Loading);
        let refetch = Arc::new(Notify::new());
        let changes = self.cache.subscribe();

        let task = tokio::spawn(run_watch::<C>(
            self.clone(),
            operation,
            tx,
            refetch.clone(),
            changes,
        ));

        Ok(QueryWatch {
            state: rx,
            refetch,
            task,
            _contract: PhantomData,
        })
    }
}

async fn run_watch<C>(
    client: GraphQLClient,
    operation: Operation,
    tx: watch::Sender<ViewState<C::Response>>,
    refetch: Arc<Notify>,
    mut changes: broadcast::Receiver<String>,
) where
    C: OperationContract,
    C::Response: Clone + Send + Sync,
{
    let key = operation.fingerprint();
    let mut policy = FetchPolicy::CacheFirst;

    loop {
        tx.send_replace(ViewState::Loading);
        let state = match client.fetch_data(operation.clone(), policy).await {
            Ok(data) => decode_state::<C>(data),
            Err(err) => ViewState::Error(err.to_string()),
        };
        tx.send_replace(state);

        loop {
            tokio::select! {
                _ = refetch.notified() => {
                    policy = FetchPolicy::NetworkOnly;
                    break;
                }
                changed = changes.recv() => match changed {
                    Ok(changed_key) if changed_key != key => {}
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(entry) = client.cache.get(&key).await {
                            tx.send_replace(decode_state::<C>(entry.data));
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }
}

fn decode_state<C: OperationContract>(data: Value) -> ViewState<C::Response> {
    match C::decode(Some(data)) {
        Ok(response) => ViewState::Ready(response),
        Err(err) => ViewState::Error(err.to_string()),
    }
}

/// Live state of a watched query; cancels its fetch task on drop
pub struct QueryWatch<C: OperationContract> {
    state: watch::Receiver<ViewState<C::Response>>,
    refetch: Arc<Notify>,
    task: JoinHandle<()>,
    _contract: PhantomData<fn() -> C>,
}

impl<C> QueryWatch<C>
where
    C: OperationContract,
    C::Response: Clone,
{
    /// Current state
    pub fn state(&self) -> ViewState<C::Response> {
        self.state.borrow().clone()
    }

    /// Wait until the query is no longer loading
    pub async fn settled(&mut self) -> ViewState<C::Response> {
        match self.state.wait_for(|s| !s.is_loading()).await {
            Ok(state) => state.clone(),
            Err(_) => ViewState::Error("query watch stopped".to_string()),
        }
    }

    /// Wait for the next published state
    pub async fn changed(&mut self) -> ViewState<C::Response> {
        match self.state.changed().await {
            Ok(()) => self.state.borrow_and_update().clone(),
            Err(_) => ViewState::Error("query watch stopped".to_string()),
        }
    }

    /// Fetch again from the network
    pub fn refetch(&self) {
        self.refetch.notify_one();
    }
}

impl<C: OperationContract> Drop for QueryWatch<C> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{BusinessDashboard, BusinessVariables};
    use crate::link::testing::ScriptedTransport;
    use crate::types::ResponseError;
    use serde_json::json;

    fn dashboard_data(total: i64) -> Value {
        json!({ "businessDashboard": {
            "totalReferrals": total, "activeCampaigns": 3,
            "rewardsIssued": 120.5, "conversionRate": 0.25
        }})
    }

    fn business() -> BusinessVariables {
        BusinessVariables {
            business_id: "b1".into(),
        }
    }

    fn client_over(transport: Arc<ScriptedTransport>) -> GraphQLClient {
        GraphQLClient::new(LinkChain::new(transport))
    }

    #[tokio::test]
    async fn test_cache_first_serves_second_call_from_cache() {
        let transport = Arc::new(ScriptedTransport::ok(dashboard_data(10)));
        let client = client_over(transport.clone());

        for _ in 0..2 {
            let data = client
                .query::<BusinessDashboard>(&business(), FetchPolicy::CacheFirst)
                .await
                .unwrap();
            assert_eq!(data.business_dashboard.unwrap().total_referrals, 10);
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_network_only_always_fetches_and_updates_cache() {
        let transport = Arc::new(ScriptedTransport::ok(dashboard_data(11)));
        transport.push(Ok(GraphQLResponse::from_data(dashboard_data(10))));
        let client = client_over(transport.clone());

        client
            .query::<BusinessDashboard>(&business(), FetchPolicy::NetworkOnly)
            .await
            .unwrap();
        client
            .query::<BusinessDashboard>(&business(), FetchPolicy::NetworkOnly)
            .await
            .unwrap();
        let cached = client
            .query::<BusinessDashboard>(&business(), FetchPolicy::CacheFirst)
            .await
            .unwrap();

        assert_eq!(cached.business_dashboard.unwrap().total_referrals, 11);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_cache_leaves_cache_empty() {
        let transport = Arc::new(ScriptedTransport::ok(dashboard_data(1)));
        let client = client_over(transport);
        client
            .query::<BusinessDashboard>(&business(), FetchPolicy::NoCache)
            .await
            .unwrap();
        let key = GraphQLClient::cache_key::<BusinessDashboard>(&business()).unwrap();
        assert!(client.cache().get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_entries_are_refetched() {
        let transport = Arc::new(ScriptedTransport::ok(dashboard_data(5)));
        let cache = Arc::new(MemoryCache::new());
        let key = GraphQLClient::cache_key::<BusinessDashboard>(&business()).unwrap();
        cache
            .prime(
                &key,
                crate::cache::CacheEntry {
                    data: dashboard_data(1),
                    fetched_at: chrono::Utc::now() - chrono::Duration::minutes(10),
                },
            )
            .await;
        let client = client_over(transport.clone())
            .with_cache(cache)
            .with_max_age(chrono::Duration::minutes(5));

        let data = client
            .query::<BusinessDashboard>(&business(), FetchPolicy::CacheFirst)
            .await
            .unwrap();
        assert_eq!(data.business_dashboard.unwrap().total_referrals, 5);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_graphql_errors_become_client_errors() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(GraphQLResponse::from_errors(vec![ResponseError::new(
                "Business not found",
            )]))
        }));
        let client = client_over(transport);

        let err = client
            .query::<BusinessDashboard>(&business(), FetchPolicy::CacheFirst)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "GraphQL error: Business not found");
        let key = GraphQLClient::cache_key::<BusinessDashboard>(&business()).unwrap();
        assert!(client.cache().get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_partial_data_with_errors_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(GraphQLResponse {
                data: Some(dashboard_data(7)),
                errors: vec![ResponseError::new("conversionRate unavailable")],
            })
        }));
        let client = client_over(transport);

        let err = client
            .query::<BusinessDashboard>(&business(), FetchPolicy::NetworkOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::GraphQL(ref errors) if errors.len() == 1));
        let key = GraphQLClient::cache_key::<BusinessDashboard>(&business()).unwrap();
        assert!(client.cache().get(&key).await.is_none());

        let raw = client
            .execute(BusinessDashboard::operation(&business()).unwrap())
            .await
            .unwrap();
        assert_eq!(raw.data, Some(dashboard_data(7)));
    }

    #[tokio::test]
    async fn test_watch_settles_and_refetches() {
        let transport = Arc::new(ScriptedTransport::ok(dashboard_data(2)));
        transport.push(Ok(GraphQLResponse::from_data(dashboard_data(1))));
        let client = client_over(transport.clone());

        let mut watch = client.watch::<BusinessDashboard>(&business()).unwrap();
        let first = watch.settled().await;
        assert_eq!(
            first.ready().unwrap().business_dashboard.as_ref().unwrap().total_referrals,
            1
        );

        watch.refetch();
        loop {
            if let ViewState::Ready(data) = watch.changed().await {
                if data.business_dashboard.unwrap().total_referrals == 2 {
                    break;
                }
            }
        }
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_watch_reports_errors() {
        let transport = Arc::new(ScriptedTransport::new(crate::link::testing::network_down));
        let client = client_over(transport);

        let mut watch = client.watch::<BusinessDashboard>(&business()).unwrap();
        let state = watch.settled().await;
        assert_eq!(
            state.status_line().as_deref(),
            Some("Error: Network error: connection refused")
        );
    }

    #[tokio::test]
    async fn test_mark_notification_read_updates_watchers() {
        let transport = Arc::new(ScriptedTransport::new(|op| {
            let data = match op.operation_name.as_deref() {
                Some("MarkNotificationRead") => json!({ "markNotificationRead": { "success": true } }),
                _ => json!({ "notifications": [
                    { "id": "n1", "message": "New referral", "read": false,
                      "createdAt": "2024-03-01T12:00:00Z" },
                    { "id": "n2", "message": "Reward paid", "read": false,
                      "createdAt": "2024-03-02T12:00:00Z" }
                ]}),
            };
            Ok(GraphQLResponse::from_data(data))
        }));
        let client = client_over(transport.clone());
        let vars = UserVariables {
            user_id: "u1".into(),
        };

        let mut watch = client.watch::<Notifications>(&vars).unwrap();
        assert_eq!(watch.settled().await.ready().unwrap().unread_count(), 2);

        assert!(client.mark_notification_read("u1", "n1").await.unwrap());

        loop {
            if let ViewState::Ready(data) = watch.changed().await {
                if data.unread_count() == 1 {
                    assert!(data.notifications[0].read);
                    assert!(!data.notifications[1].read);
                    break;
                }
            }
        }
        // One query, one mutation: the cache edit did not refetch.
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_dropping_watch_cancels_task() {
        let transport = Arc::new(ScriptedTransport::ok(dashboard_data(1)));
        let client = client_over(transport);

        let mut watch = client.watch::<BusinessDashboard>(&business()).unwrap();
        watch.settled().await;
        let handle = watch.task.abort_handle();
        drop(watch);

        for _ in 0..10 {
            if handle.is_finished() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(handle.is_finished());
    }
}
