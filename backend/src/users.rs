use log::{info, warn};
use validator::Validate;

use crate::auth;
use crate::config::AppConfig;
use crate::error::{MarketError, MarketResult};
use crate::models::{LoginRequest, NewUser, RegisterRequest, TokenResponse, User};
use crate::store::MarketStore;

pub fn register(store: &dyn MarketStore, request: RegisterRequest) -> MarketResult<User> {
    request.validate()?;
    let hashed_password = auth::hash_password(&request.password)?;
    let user = store.insert_user(NewUser {
        username: request.username,
        email: request.email,
        hashed_password,
    })?;
    info!("Registered user {} ({})", user.id, user.email);
    Ok(user)
}

pub fn login(store: &dyn MarketStore, config: &AppConfig, request: LoginRequest) -> MarketResult<TokenResponse> {
    let user = store
        .find_user_by_email(&request.email)?
        .filter(|user| auth::verify_password(&request.password, &user.hashed_password));
    let Some(user) = user else {
        warn!("Failed login for {}", request.email);
        return Err(MarketError::Unauthorized("incorrect email or password".to_string()));
    };

    let access_token = auth::create_token(user.id, &config.jwt_secret, config.token_ttl_minutes)?;
    Ok(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    })
}
