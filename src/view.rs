//! View lifecycle: per-call state and the dashboard mount guard

use crate::client::{GraphQLClient, QueryWatch};
use crate::documents::{
    BusinessDashboard, BusinessVariables, Notifications, UserRewards, UserVariables,
};
use crate::session::{Session, TokenStore};
use crate::Result;

/// Login page for end users (routes under `/user`)
pub const USER_LOGIN_ROUTE: &str = "/user/auth/login";

/// Login page for business admins
pub const BUSINESS_LOGIN_ROUTE: &str = "/auth/sign-in";

/// State of a single query or mutation as a view renders it
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Error(String),
    Ready(T),
}

impl<T> ViewState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Inline status text, `None` once data is ready
    pub fn status_line(&self) -> Option<String> {
        match self {
            Self::Loading => Some("Loading...".to_string()),
            Self::Error(message) => Some(format!("Error: {message}")),
            Self::Ready(_) => None,
        }
    }
}

fn is_user_path(path: &str) -> bool {
    path == "/user" || path.starts_with("/user/")
}

/// Login route for a page path
pub fn login_route(path: &str) -> &'static str {
    if is_user_path(path) {
        USER_LOGIN_ROUTE
    } else {
        BUSINESS_LOGIN_ROUTE
    }
}

/// Business admin dashboard
pub struct BusinessDashboardView {
    pub session: Session,
    pub stats: QueryWatch<BusinessDashboard>,
}

/// End-user rewards dashboard
pub struct UserDashboardView {
    pub session: Session,
    pub rewards: QueryWatch<UserRewards>,
    pub notifications: QueryWatch<Notifications>,
}

/// Outcome of mounting a dashboard page
pub enum Mount {
    /// No usable session; go to this login route
    Redirect(&'static str),
    Business(BusinessDashboardView),
    User(UserDashboardView),
}

impl Mount {
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            Self::Redirect(route) => Some(*route),
            _ => None,
        }
    }
}

/// Mount the dashboard at `path`.
///
/// Without a signed-in session this redirects to the login route for the path
/// and issues no GraphQL call. Otherwise it starts the dashboard's queries,
/// parameterized by the session's `businessId` (admin pages) or `id` (`/user` pages).
pub async fn mount_dashboard(client: &GraphQLClient, store: &TokenStore, path: &str) -> Result<Mount> {
    let session = match store.read().await {
        Ok(Some(session)) if session.access_token.is_some() => session,
        Ok(_) => return Ok(Mount::Redirect(login_route(path))),
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "unreadable session, redirecting to login");
            return Ok(Mount::Redirect(login_route(path)));
        }
    };

    if is_user_path(path) {
        let Some(user_id) = session.user_id() else {
            return Ok(Mount::Redirect(USER_LOGIN_ROUTE));
        };
        let vars = UserVariables { user_id };
        let rewards = client.watch::<UserRewards>(&vars)?;
        let notifications = client.watch::<Notifications>(&vars)?;
        return Ok(Mount::User(UserDashboardView {
            session,
            rewards,
            notifications,
        }));
    }

    let Some(business_id) = session.business_id() else {
        return Ok(Mount::Redirect(BUSINESS_LOGIN_ROUTE));
    };
    let stats = client.watch::<BusinessDashboard>(&BusinessVariables { business_id })?;
    Ok(Mount::Business(BusinessDashboardView { session, stats }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::ScriptedTransport;
    use crate::session::MemoryBackend;
    use crate::types::GraphQLResponse;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<ScriptedTransport>, GraphQLClient, TokenStore) {
        let transport = Arc::new(ScriptedTransport::new(|op| {
            let data = match op.operation_name.as_deref() {
                Some("BusinessDashboard") => json!({ "businessDashboard": {
                    "totalReferrals": 40, "activeCampaigns": 2,
                    "rewardsIssued": 300.0, "conversionRate": 0.1
                }}),
                Some("UserRewards") => json!({ "userRewards": [
                    { "id": "r1", "campaignName": "Spring", "amount": 10.0, "status": "PAID" }
                ]}),
                _ => json!({ "notifications": [] }),
            };
            Ok(GraphQLResponse::from_data(data))
        }));
        let store = TokenStore::new(Arc::new(MemoryBackend::default()));
        let client = GraphQLClient::standard(store.clone(), transport.clone());
        (transport, client, store)
    }

    #[test]
    fn test_login_route_by_prefix() {
        assert_eq!(login_route("/user/dashboard"), "/user/auth/login");
        assert_eq!(login_route("/user"), "/user/auth/login");
        assert_eq!(login_route("/dashboard"), "/auth/sign-in");
        assert_eq!(login_route("/users-report"), "/auth/sign-in");
    }

    #[test]
    fn test_status_line() {
        assert_eq!(ViewState::<()>::Loading.status_line().as_deref(), Some("Loading..."));
        assert_eq!(
            ViewState::<()>::Error("boom".into()).status_line().as_deref(),
            Some("Error: boom")
        );
        assert_eq!(ViewState::Ready(1).status_line(), None);
    }

    #[tokio::test]
    async fn test_mount_without_session_redirects_without_calls() {
        let (transport, client, store) = setup();

        let mount = mount_dashboard(&client, &store, "/user/dashboard").await.unwrap();
        assert_eq!(mount.redirect_target(), Some("/user/auth/login"));

        let mount = mount_dashboard(&client, &store, "/dashboard").await.unwrap();
        assert_eq!(mount.redirect_target(), Some("/auth/sign-in"));

        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_mount_with_malformed_session_redirects() {
        let (transport, client, _) = setup();
        let backend = Arc::new(MemoryBackend::default());
        crate::session::SessionBackend::save(backend.as_ref(), "userData", "oops")
            .await
            .unwrap();
        let store = TokenStore::new(backend);

        let mount = mount_dashboard(&client, &store, "/campaigns").await.unwrap();
        assert_eq!(mount.redirect_target(), Some("/auth/sign-in"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_mount_business_dashboard() {
        let (transport, client, store) = setup();
        store
            .save(&Session::new("access", "refresh").with_profile("businessId", json!("b9")))
            .await
            .unwrap();

        let Mount::Business(mut view) = mount_dashboard(&client, &store, "/dashboard").await.unwrap()
        else {
            panic!("expected business dashboard");
        };
        let stats = view.stats.settled().await;
        assert_eq!(
            stats.ready().unwrap().business_dashboard.as_ref().unwrap().total_referrals,
            40
        );

        let sent = transport.operations();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].variables, json!({ "businessId": "b9" }));
        assert_eq!(sent[0].context.headers["authorization"], "JWT access");
    }

    #[tokio::test]
    async fn test_mount_user_dashboard() {
        let (transport, client, store) = setup();
        store
            .save(&Session::new("access", "refresh").with_profile("id", json!("u5")))
            .await
            .unwrap();

        let Mount::User(mut view) = mount_dashboard(&client, &store, "/user/dashboard").await.unwrap()
        else {
            panic!("expected user dashboard");
        };
        let rewards = view.rewards.settled().await;
        assert_eq!(rewards.ready().unwrap().user_rewards.len(), 1);
        let notifications = view.notifications.settled().await;
        assert_eq!(notifications.ready().unwrap().unread_count(), 0);
        assert_eq!(view.session.user_id().as_deref(), Some("u5"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_admin_session_without_business_redirects() {
        let (transport, client, store) = setup();
        store.save(&Session::new("access", "refresh")).await.unwrap();

        let mount = mount_dashboard(&client, &store, "/dashboard").await.unwrap();
        assert_eq!(mount.redirect_target(), Some("/auth/sign-in"));
        assert_eq!(transport.calls(), 0);
    }
}
