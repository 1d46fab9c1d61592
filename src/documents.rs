//! GraphQL documents used by the dashboards
//!
//! Each contract pairs a static document with the shape of its variables and
//! of its `data` payload.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pagination::{Connection, PaginationInput};
use crate::types::Operation;
use crate::Result;

/// A typed query or mutation
pub trait OperationContract {
    const NAME: &'static str;
    const DOCUMENT: &'static str;

    type Variables: Serialize + Send + Sync;
    type Response: DeserializeOwned + Send;

    /// Build the operation for a call
    fn operation(variables: &Self::Variables) -> Result<Operation> {
        Ok(Operation::new(Self::DOCUMENT)
            .with_operation_name(Self::NAME)
            .with_variables(serde_json::to_value(variables)?))
    }

    /// Decode the `data` member of a response
    fn decode(data: Option<Value>) -> Result<Self::Response> {
        Ok(serde_json::from_value(data.unwrap_or(Value::Null))?)
    }
}

/// Variables of an operation that takes none; serializes as `{}`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NoVariables {}

// --- refreshToken -----------------------------------------------------------

pub struct RefreshToken;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenVariables {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenData {
    pub refresh_token: Option<RefreshTokenPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenPayload {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
}

impl OperationContract for RefreshToken {
    const NAME: &'static str = "RefreshToken";
    const DOCUMENT: &'static str = r#"mutation RefreshToken($refreshToken: String!) {
  refreshToken(refreshToken: $refreshToken) {
    token
    refreshToken
  }
}"#;

    type Variables = RefreshTokenVariables;
    type Response = RefreshTokenData;
}

// --- current user -----------------------------------------------------------

pub struct CurrentUser;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub business: Option<BusinessSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUserData {
    pub me: Option<User>,
}

impl OperationContract for CurrentUser {
    const NAME: &'static str = "CurrentUser";
    const DOCUMENT: &'static str = r#"query CurrentUser {
  me {
    id
    email
    firstName
    lastName
    business {
      id
      name
    }
  }
}"#;

    type Variables = NoVariables;
    type Response = CurrentUserData;
}

// --- business dashboard -----------------------------------------------------

pub struct BusinessDashboard;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessVariables {
    pub business_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_referrals: i64,
    pub active_campaigns: i64,
    pub rewards_issued: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDashboardData {
    pub business_dashboard: Option<DashboardStats>,
}

impl OperationContract for BusinessDashboard {
    const NAME: &'static str = "BusinessDashboard";
    const DOCUMENT: &'static str = r#"query BusinessDashboard($businessId: ID!) {
  businessDashboard(businessId: $businessId) {
    totalReferrals
    activeCampaigns
    rewardsIssued
    conversionRate
  }
}"#;

    type Variables = BusinessVariables;
    type Response = BusinessDashboardData;
}

// --- end-user rewards -------------------------------------------------------

pub struct UserRewards;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserVariables {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub campaign_name: String,
    pub amount: f64,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRewardsData {
    #[serde(default)]
    pub user_rewards: Vec<Reward>,
}

impl OperationContract for UserRewards {
    const NAME: &'static str = "UserRewards";
    const DOCUMENT: &'static str = r#"query UserRewards($userId: ID!) {
  userRewards(userId: $userId) {
    id
    campaignName
    amount
    status
  }
}"#;

    type Variables = UserVariables;
    type Response = UserRewardsData;
}

// --- notifications ----------------------------------------------------------

pub struct Notifications;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsData {
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl NotificationsData {
    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}

impl OperationContract for Notifications {
    const NAME: &'static str = "Notifications";
    const DOCUMENT: &'static str = r#"query Notifications($userId: ID!) {
  notifications(userId: $userId) {
    id
    message
    read
    createdAt
  }
}"#;

    type Variables = UserVariables;
    type Response = NotificationsData;
}

pub struct MarkNotificationRead;

#[derive(Debug, Clone, Serialize)]
pub struct NotificationIdVariables {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationReadData {
    pub mark_notification_read: Option<MarkNotificationReadPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkNotificationReadPayload {
    pub success: bool,
}

impl OperationContract for MarkNotificationRead {
    const NAME: &'static str = "MarkNotificationRead";
    const DOCUMENT: &'static str = r#"mutation MarkNotificationRead($id: ID!) {
  markNotificationRead(id: $id) {
    success
  }
}"#;

    type Variables = NotificationIdVariables;
    type Response = MarkNotificationReadData;
}

// --- referrals table --------------------------------------------------------

pub struct Referrals;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralsVariables {
    pub campaign_id: String,
    #[serde(flatten)]
    pub page: PaginationInput,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: String,
    pub referred_email: String,
    pub status: String,
    #[serde(default)]
    pub reward_amount: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralsData {
    pub referrals: Connection<Referral>,
}

impl OperationContract for Referrals {
    const NAME: &'static str = "Referrals";
    const DOCUMENT: &'static str = r#"query Referrals($campaignId: ID!, $first: Int, $after: String, $last: Int, $before: String) {
  referrals(campaignId: $campaignId, first: $first, after: $after, last: $last, before: $before) {
    edges {
      cursor
      node {
        id
        referredEmail
        status
        rewardAmount
        createdAt
      }
    }
    pageInfo {
      hasNextPage
      hasPreviousPage
      startCursor
      endCursor
    }
  }
}"#;

    type Variables = ReferralsVariables;
    type Response = ReferralsData;

    fn operation(variables: &Self::Variables) -> Result<Operation> {
        variables.page.validate()?;
        Ok(Operation::new(Self::DOCUMENT)
            .with_operation_name(Self::NAME)
            .with_variables(serde_json::to_value(variables)?))
    }
}
