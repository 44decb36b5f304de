use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "connected_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: String,
    /// Provider identifier, e.g. "battlenet"
    pub provider: String,
    /// The provider's stable identifier for this account
    pub external_id: String,
    /// Display name as reported by the provider, may change over time
    pub name: String,
    pub friend_sync: bool,
    pub verified: bool,
    /// Token payload for providers that retain it, never exposed in events
    pub token_data: Option<Json>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Connected account info without the stored token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedAccountInfo {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub provider: String,
    pub external_id: String,
    pub name: String,
    pub friend_sync: bool,
    pub verified: bool,
}

impl From<&Model> for ConnectedAccountInfo {
    fn from(account: &Model) -> Self {
        Self {
            id: account.id,
            user_id: account.user_id.clone(),
            provider: account.provider.clone(),
            external_id: account.external_id.clone(),
            name: account.name.clone(),
            friend_sync: account.friend_sync,
            verified: account.verified,
        }
    }
}

impl Model {
    /// Create a new link record for an external account
    pub fn new(
        user_id: impl Into<String>,
        provider: impl Into<String>,
        external_id: impl Into<String>,
        name: impl Into<String>,
        friend_sync: bool,
        token_data: Option<Json>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            provider: provider.into(),
            external_id: external_id.into(),
            name: name.into(),
            friend_sync,
            verified: true,
            token_data,
            created_at: now,
            updated_at: now,
        }
    }
}
