use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api_error::ApiError;
use crate::auth::password;
use crate::auth::token::TokenCodec;
use crate::models::session::SessionSummary;
use crate::models::user::{
    AuthResponse, LoginRequest, NewUser, RegisterRequest, User, UserProfile,
};
use crate::store::{AuthStore, NewSession};

/// The verified subject of a request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub token_id: String,
}

/// Orchestrates the token codec, revocation ledger, session registry, and
/// credential store. Owns none of the storage; only sequences calls.
#[derive(Clone)]
pub struct SessionService {
    codec: TokenCodec,
    store: Arc<dyn AuthStore>,
    token_ttl: Duration,
}

impl SessionService {
    pub fn new(codec: TokenCodec, store: Arc<dyn AuthStore>, token_ttl: Duration) -> Self {
        Self {
            codec,
            store,
            token_ttl,
        }
    }

    /// Create a user, then open a session exactly like a login would.
    /// Expects an already validated, normalized request.
    pub async fn register(
        &self,
        request: RegisterRequest,
        device_info: Option<String>,
        origin_address: Option<String>,
    ) -> Result<AuthResponse, ApiError> {
        let password_hash = password::hash_password(&request.password).map_err(|e| {
            error!(error = %e, "password hashing failed");
            ApiError::InternalServerError
        })?;

        let user = self
            .store
            .create_user(NewUser {
                username: request.username,
                email: request.email,
                mobile_number: request.mobile_number,
                password_hash,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "user registered");

        self.open_session(user, device_info, origin_address).await
    }

    pub async fn login(
        &self,
        request: LoginRequest,
        device_info: Option<String>,
        origin_address: Option<String>,
    ) -> Result<AuthResponse, ApiError> {
        let user = self
            .store
            .find_by_identifier(request.identifier.trim())
            .await?;

        // One failure path for both an unknown identifier and a wrong
        // password: the response must not reveal which it was.
        let user = match user {
            Some(user) if password::verify_password(&request.password, &user.password_hash) => {
                user
            }
            _ => {
                warn!("login rejected");
                return Err(ApiError::Unauthorized);
            }
        };

        info!(user_id = user.id, username = %user.username, "login succeeded");

        self.open_session(user, device_info, origin_address).await
    }

    /// Validate a bearer token: signature and expiry, then revocation, then
    /// a liveness touch on the matching session. The touch is advisory: a
    /// session deactivated by a racing logout is accepted for this request
    /// and rejected on the next, since logout revokes before deactivating.
    pub async fn verify(&self, token: &str) -> Result<Identity, ApiError> {
        let claims = match self.codec.parse(token) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "token rejected");
                return Err(ApiError::Unauthorized);
            }
        };

        if self.store.is_revoked(&claims.token_id).await? {
            debug!(token_id = %claims.token_id, "token is revoked");
            return Err(ApiError::Unauthorized);
        }

        if !self.store.touch(&claims.token_id).await? {
            debug!(token_id = %claims.token_id, "no active session for token");
        }

        Ok(Identity {
            user_id: claims.user_id,
            username: claims.username,
            token_id: claims.token_id,
        })
    }

    /// Revoke the token, then deactivate its session. If the revocation
    /// write fails the logout fails and the session stays active; losing
    /// the revocation record would be worse than looking logged in.
    pub async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let claims = self.codec.parse(token).map_err(|e| {
            debug!(error = %e, "logout with unparseable token");
            ApiError::Unauthorized
        })?;

        self.store.revoke(&claims.token_id, claims.user_id).await?;
        self.store.deactivate(&claims.token_id).await?;

        info!(user_id = claims.user_id, token_id = %claims.token_id, "logged out");

        Ok(())
    }

    pub async fn list_sessions(&self, user_id: i64) -> Result<Vec<SessionSummary>, ApiError> {
        let sessions = self.store.list_active(user_id).await?;
        Ok(sessions.into_iter().map(SessionSummary::from).collect())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User, ApiError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::NotFound)
    }

    async fn open_session(
        &self,
        user: User,
        device_info: Option<String>,
        origin_address: Option<String>,
    ) -> Result<AuthResponse, ApiError> {
        let issued = self
            .codec
            .issue(user.id, &user.username, self.token_ttl)
            .map_err(|e| {
                error!(error = %e, "token issuance failed");
                ApiError::InternalServerError
            })?;

        let session = self
            .store
            .create_session(NewSession {
                user_id: user.id,
                token_id: &issued.token_id,
                device_info: device_info.as_deref(),
                origin_address: origin_address.as_deref(),
            })
            .await?;

        info!(user_id = user.id, session_id = session.id, "session opened");

        Ok(AuthResponse {
            access_token: issued.token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_ttl.num_seconds(),
            user: UserProfile::from(user),
        })
    }
}
