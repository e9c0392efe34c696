//! Identity lookup - resolves a session's user id to a display identity

use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::Result;
use crate::models::domain::{Identity, UserId};

/// Resolves user ids carried by session tokens. `Ok(None)` means the user does not exist.
pub trait IdentityLookup: Send + Sync {
    fn find_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<Identity>>>;
}

// ============================================================================
// StaticDirectory - fixed set of users from configuration
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    users: HashMap<UserId, Identity>,
}

impl StaticDirectory {
    pub fn new(users: impl IntoIterator<Item = Identity>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|identity| (identity.user_id.clone(), identity))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl IdentityLookup for StaticDirectory {
    fn find_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<Identity>>> {
        async move { Ok(self.users.get(user_id).cloned()) }.boxed()
    }
}

// ============================================================================
// HttpDirectory - user service over HTTP
// ============================================================================

/// User record as returned by `GET {base_url}/users/{id}`
#[derive(Debug, Deserialize)]
struct UserRecord {
    #[serde(alias = "_id")]
    id: UserId,
    name: String,
    #[serde(default)]
    role: Option<String>,
}

impl From<UserRecord> for Identity {
    fn from(record: UserRecord) -> Self {
        Identity {
            user_id: record.id,
            display_name: record.name,
            privileged: record.role.as_deref() == Some("admin"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl IdentityLookup for HttpDirectory {
    fn find_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<Identity>>> {
        async move {
            let url = format!("{}/users/{}", self.base_url, user_id);
            let response = self.client.get(&url).send().await?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }

            let record: UserRecord = response.error_for_status()?.json().await?;
            Ok(Some(record.into()))
        }
        .boxed()
    }
}
