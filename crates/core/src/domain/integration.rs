use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationId(pub String);

/// Channel credential for one connected Instagram account.
///
/// The access token never leaves this struct into an event payload; async
/// consumers carry only the [`IntegrationId`] and re-fetch the token from
/// storage at the point of use.
#[derive(Clone, Debug)]
pub struct Integration {
    pub id: IntegrationId,
    pub owner_id: String,
    /// The provider-side user id events arrive under.
    pub external_user_id: String,
    pub access_token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
    pub sync_interval_hours: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
