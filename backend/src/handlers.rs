use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{middleware, Extension, Json, Router};
use serde_json::{json, Value};

use crate::auth::{self, Caller};
use crate::error::{MarketError, MarketResult};
use crate::models::{
    Category, CreateListingRequest, Listing, ListingChanges, ListingFilter, ListingSummary, LoginRequest,
    NewCategory, PurchaseRequest, Rating, RatingRequest, RegisterRequest, StatusChangeRequest, TokenResponse,
    Transaction, User, UserId,
};
use crate::{listings, ratings, transactions, users, AppState};

async fn health() -> &'static str {
    "Hello, Marketplace!"
}

// Identity

async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> MarketResult<Json<User>> {
    let user = state.with_store(move |store| users::register(store, request)).await?;
    Ok(Json(user))
}

async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> MarketResult<Json<TokenResponse>> {
    let config = state.config.clone();
    let token = state
        .with_store(move |store| users::login(store, &config, request))
        .await?;
    Ok(Json(token))
}

async fn logout(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> Json<Value> {
    state.revoked.revoke(&caller.token);
    log::info!("User {} logged out", caller.user_id);
    Json(json!({"detail": "Successfully logged out"}))
}

async fn me(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> MarketResult<Json<User>> {
    let user = state
        .with_store(move |store| store.find_user(caller.user_id))
        .await?
        .ok_or_else(|| MarketError::Unauthorized("user not found".to_string()))?;
    Ok(Json(user))
}

// Categories and advertisements

async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<NewCategory>,
) -> MarketResult<(StatusCode, Json<Category>)> {
    let category = state
        .with_store(move |store| listings::create_category(store, request))
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn all_categories(State(state): State<AppState>) -> MarketResult<Json<Vec<Category>>> {
    let categories = state.with_store(|store| store.list_categories()).await?;
    Ok(Json(categories))
}

async fn create_listing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateListingRequest>,
) -> MarketResult<(StatusCode, Json<Listing>)> {
    let listing = state
        .with_store(move |store| listings::create_listing(store, caller.user_id, request))
        .await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn get_listing(State(state): State<AppState>, Path(id): Path<i32>) -> MarketResult<Json<Listing>> {
    let listing = state.with_store(move |store| listings::get_listing(store, id)).await?;
    Ok(Json(listing))
}

async fn edit_listing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(changes): Json<ListingChanges>,
) -> MarketResult<Json<Listing>> {
    let listing = state
        .with_store(move |store| listings::edit_listing(store, id, caller.user_id, changes))
        .await?;
    Ok(Json(listing))
}

async fn change_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
    Json(request): Json<StatusChangeRequest>,
) -> MarketResult<Json<Listing>> {
    let listing = state
        .with_store(move |store| listings::change_status(store, id, caller.user_id, request.status))
        .await?;
    Ok(Json(listing))
}

async fn delete_listing(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> MarketResult<StatusCode> {
    state
        .with_store(move |store| listings::delete_listing(store, id, caller.user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn all_listings(State(state): State<AppState>) -> MarketResult<Json<Vec<ListingSummary>>> {
    let rows = state
        .with_store(|store| listings::search(store, &ListingFilter::default()))
        .await?;
    Ok(Json(rows))
}

async fn search_listings(
    State(state): State<AppState>,
    Query(filter): Query<ListingFilter>,
) -> MarketResult<Json<Vec<ListingSummary>>> {
    let rows = state.with_store(move |store| listings::search(store, &filter)).await?;
    Ok(Json(rows))
}

// Transactions and ratings

async fn create_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<PurchaseRequest>,
) -> MarketResult<(StatusCode, Json<Transaction>)> {
    let tx = state
        .with_store(move |store| transactions::purchase(store, caller.user_id, request))
        .await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn get_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> MarketResult<Json<Transaction>> {
    let tx = state
        .with_store(move |store| transactions::get_transaction(store, id, caller.user_id))
        .await?;
    Ok(Json(tx))
}

async fn complete_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i32>,
) -> MarketResult<Json<Transaction>> {
    let tx = state
        .with_store(move |store| transactions::complete(store, id, caller.user_id))
        .await?;
    Ok(Json(tx))
}

async fn create_rating(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<RatingRequest>,
) -> MarketResult<(StatusCode, Json<Rating>)> {
    let rating = state
        .with_store(move |store| ratings::rate(store, caller.user_id, request))
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

async fn ratings_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> MarketResult<Json<Vec<Rating>>> {
    let rows = state
        .with_store(move |store| ratings::ratings_for_user(store, user_id))
        .await?;
    Ok(Json(rows))
}

pub fn routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/categories/create", post(create_category))
        .route("/advertisements/create", post(create_listing))
        .route("/advertisements/:id/edit", patch(edit_listing))
        .route("/advertisements/:id/status", patch(change_status))
        .route("/advertisements/:id", delete(delete_listing))
        .route("/purchase/transactions", post(create_transaction))
        .route("/purchase/transactions/:id", get(get_transaction))
        .route("/purchase/transactions/:id/complete", patch(complete_transaction))
        .route("/ratings", post(create_rating))
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate));

    Router::new()
        .route("/", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/categories/all", get(all_categories))
        .route("/advertisements/all", get(all_listings))
        .route("/advertisements/search", get(search_listings))
        .route("/advertisements/:id", get(get_listing))
        .route("/ratings/user/:user_id", get(ratings_for_user))
        .merge(protected_routes)
        .with_state(state)
}
