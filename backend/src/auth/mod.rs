//! Identity provider: password hashing, bearer tokens, and the request
//! middleware that turns a token into a [`Caller`].

use std::collections::HashSet;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, MarketResult};
use crate::models::UserId;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // User id
    exp: usize,  // Expiration time
}

/// Authenticated identity attached to a request by [`authenticate`].
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
    pub token: String,
}

pub fn create_token(user_id: UserId, jwt_secret: &str, ttl_minutes: i64) -> MarketResult<String> {
    let expiration = Duration::try_minutes(ttl_minutes)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| MarketError::Internal("token expiry out of range".to_string()))?
        .timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_bytes()))
        .map_err(|e| MarketError::Internal(format!("failed to sign token: {}", e)))
}

pub fn validate_token(token: &str, jwt_secret: &str) -> MarketResult<UserId> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| MarketError::Unauthorized("invalid or expired token".to_string()))?;
    token_data
        .claims
        .sub
        .parse()
        .map_err(|_| MarketError::Unauthorized("token payload invalid".to_string()))
}

pub fn hash_password(password: &str) -> MarketResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MarketError::Internal(format!("failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Tokens revoked by logout. Lives for the life of the process.
#[derive(Debug, Default)]
pub struct RevokedTokens {
    tokens: RwLock<HashSet<String>>,
}

impl RevokedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.write().insert(token.to_string());
    }

    pub fn is_revoked(&self, token: &str) -> bool {
        self.tokens.read().contains(token)
    }
}

fn bearer_token(headers: &HeaderMap) -> MarketResult<String> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| MarketError::Unauthorized("missing Authorization header".to_string()))?;
    let value = auth_header
        .to_str()
        .map_err(|_| MarketError::Unauthorized("invalid Authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| MarketError::Unauthorized("invalid Authorization header format".to_string()))
}

pub async fn authenticate(
    headers: HeaderMap,
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, MarketError> {
    let token = bearer_token(&headers)?;
    if state.revoked.is_revoked(&token) {
        return Err(MarketError::Unauthorized("token has been revoked".to_string()));
    }
    let user_id = validate_token(&token, &state.config.jwt_secret)?;
    let user = state.with_store(move |store| store.find_user(user_id)).await?;
    if user.is_none() {
        return Err(MarketError::Unauthorized("user not found".to_string()));
    }

    log::debug!("Authenticated user: {}", user_id);
    request.extensions_mut().insert(Caller { user_id, token });
    Ok(next.run(request).await)
}
