//! Password hashing, bearer tokens and credential resolution.

use std::sync::Arc;

use argon2::password_hash::{PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Argon2, PasswordHash};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::db::Store;
use crate::domain::{Identity, Role, User};
use crate::error::AppError;

pub const TOKEN_TTL_HOURS: i64 = 24;

/// Bearer token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
    pub exp: i64,
}

/// Whatever the caller presented to prove who they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// User id stored in the signed session cookie.
    Session(i32),
    Bearer(String),
}

impl Credential {
    /// The session wins when both are present.
    pub fn pick(session_user: Option<i32>, authorization: Option<&str>) -> Option<Credential> {
        session_user.map(Credential::Session).or_else(|| {
            authorization
                .and_then(|header| header.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| Credential::Bearer(token.to_string()))
        })
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

pub struct AuthService {
    store: Arc<dyn Store>,
    secret: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, secret: String) -> Self {
        Self { store, secret }
    }

    pub fn issue_token(&self, user: &User, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| AppError::Internal(format!("token encoding failed: {}", e)))
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            AppError::Auth("Invalid or expired token".to_string())
        })
    }

    /// Check username and password, returning the user and a fresh token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<(User, String), AppError> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .filter(|user| verify_password(&user.password_hash, password))
            .ok_or_else(|| AppError::Auth("Invalid username or password".to_string()))?;

        if !user.is_active {
            warn!(user_id = user.id, "Login refused for deactivated account");
            return Err(AppError::Forbidden("Account is deactivated".to_string()));
        }

        let token = self.issue_token(&user, Utc::now())?;
        info!(user_id = user.id, role = %user.role, "User logged in");
        Ok((user, token))
    }

    /// Turn any credential into the one identity handlers work with.
    pub async fn resolve(&self, credential: &Credential) -> Result<Identity, AppError> {
        let user_id = match credential {
            Credential::Session(user_id) => *user_id,
            Credential::Bearer(token) => self.decode_token(token)?.user_id,
        };

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::Auth("Account no longer exists".to_string()))?;
        if !user.is_active {
            return Err(AppError::Forbidden("Account is deactivated".to_string()));
        }

        Ok(Identity {
            user_id: user.id,
            username: user.username,
            role: user.role,
        })
    }
}
