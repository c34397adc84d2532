//! Bearer-token issuance and request identity.

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::convert::Infallible;
use tokio::sync::RwLock;
use tracker_core::{Scope, TrackerError, User};
use uuid::Uuid;

/// One year.
const MAX_TTL_MINS: u64 = 60 * 24 * 365;

/// The authenticated caller, attached to the request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    identity: Identity,
    expires_at: DateTime<Utc>,
}

/// In-memory registry of live access tokens.
pub struct TokenRegistry {
    ttl: Duration,
    tokens: RwLock<HashMap<String, IssuedToken>>,
}

impl TokenRegistry {
    pub fn new(ttl_mins: u64) -> Self {
        Self {
            ttl: Duration::minutes(ttl_mins.min(MAX_TTL_MINS) as i64),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a fresh token for `user`. Expired tokens are purged on the way.
    pub async fn issue(&self, user: &User) -> (String, DateTime<Utc>) {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let token = generate_token();

        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, t| t.expires_at > now);
        tokens.insert(
            token.clone(),
            IssuedToken {
                identity: Identity {
                    user_id: user.id,
                    username: user.username.clone(),
                },
                expires_at,
            },
        );
        tracing::debug!(user_id = user.id, live = tokens.len(), "Issued access token");

        (token, expires_at)
    }

    /// Resolve a token to its identity, if it exists and has not expired.
    pub async fn verify(&self, token: &str) -> Option<Identity> {
        let expired = {
            let tokens = self.tokens.read().await;
            match tokens.get(token) {
                Some(t) if t.expires_at > Utc::now() => return Some(t.identity.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.tokens.write().await.remove(token);
        }
        None
    }

    /// Drop every token held by a user.
    pub async fn revoke_user(&self, user_id: i64) {
        self.tokens
            .write()
            .await
            .retain(|_, t| t.identity.user_id != user_id);
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The record scope for the current request.
///
/// `Scope::Owner` when the auth middleware attached an [`Identity`],
/// `Scope::All` otherwise.
pub struct RequestScope(pub Scope);

impl<S: Send + Sync> FromRequestParts<S> for RequestScope {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scope = match parts.extensions.get::<Identity>() {
            Some(identity) => Scope::Owner(identity.user_id),
            None => Scope::All,
        };
        Ok(RequestScope(scope))
    }
}

/// Extractor that requires an authenticated caller.
pub struct CurrentUser(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| TrackerError::Unauthorized("Not authenticated".into()).into())
    }
}
