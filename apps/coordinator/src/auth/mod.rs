//! Handshake authentication
//!
//! A connection is admitted only after its session token verifies and the
//! user it names resolves through an [`IdentityLookup`]. Nothing about a
//! connection exists before that point.

pub mod identity;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{CoordinatorError, Result};
use crate::models::domain::{Identity, UserId};

pub use identity::{HttpDirectory, IdentityLookup, StaticDirectory};

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<UserId>,
    pub exp: u64,
}

impl SessionClaims {
    fn user_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or(self.sub.as_deref())
            .filter(|id| !id.is_empty())
    }
}

pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    cookie_name: String,
    identities: Arc<dyn IdentityLookup>,
}

impl Authenticator {
    pub fn new(
        jwt_secret: &str,
        cookie_name: impl Into<String>,
        identities: Arc<dyn IdentityLookup>,
    ) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            cookie_name: cookie_name.into(),
            identities,
        }
    }

    /// Verify the handshake credential and resolve it to an identity
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<Identity> {
        let token = extract_credential(headers, &self.cookie_name, query_token)
            .ok_or_else(|| CoordinatorError::authentication("Authentication token not found"))?;

        let claims = decode::<SessionClaims>(&token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                log::debug!("Rejected session token: {}", e);
                CoordinatorError::authentication("Invalid or expired token")
            })?
            .claims;

        let user_id = claims
            .user_id()
            .ok_or_else(|| CoordinatorError::authentication("Token carries no user id"))?;

        match self.identities.find_user(user_id).await {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => {
                log::info!("User not found for token: {}", user_id);
                Err(CoordinatorError::authentication("User not found"))
            }
            Err(e) => {
                log::error!("Identity lookup failed for {}: {}", user_id, e);
                Err(CoordinatorError::authentication("Identity lookup failed"))
            }
        }
    }
}

/// Find the session token: cookie first, then bearer header, then query parameter
pub fn extract_credential(
    headers: &HeaderMap,
    cookie_name: &str,
    query_token: Option<&str>,
) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
        })
        .or_else(|| query_token.map(str::to_string))
        .filter(|token| !token.is_empty())
}
