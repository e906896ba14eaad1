use chrono::Utc;
use log::info;
use validator::Validate;

use crate::error::{MarketError, MarketResult};
use crate::models::{
    Category, CreateListingRequest, Listing, ListingChanges, ListingFilter, ListingStatus,
    ListingSummary, NewCategory, NewListing, StatusChange, UserId,
};
use crate::rules;
use crate::store::MarketStore;

pub fn create_category(store: &dyn MarketStore, request: NewCategory) -> MarketResult<Category> {
    request.validate()?;
    let category = store.insert_category(request)?;
    info!("Created category {} ({})", category.id, category.title);
    Ok(category)
}

pub fn create_listing(store: &dyn MarketStore, owner_id: UserId, request: CreateListingRequest) -> MarketResult<Listing> {
    rules::check_price(request.price)?;
    rules::check_title(&request.title)?;
    let listing = store.insert_listing(NewListing {
        title: request.title,
        content: request.content,
        price: request.price,
        status: ListingStatus::Open,
        owner_id,
        category_id: request.category_id,
        created_at: Utc::now().naive_utc(),
    })?;
    info!("User {} listed advertisement {}", owner_id, listing.id);
    Ok(listing)
}

pub fn get_listing(store: &dyn MarketStore, id: i32) -> MarketResult<Listing> {
    store
        .find_listing(id)?
        .ok_or_else(|| MarketError::NotFound(format!("advertisement with id {} does not exist", id)))
}

pub fn edit_listing(store: &dyn MarketStore, id: i32, caller: UserId, changes: ListingChanges) -> MarketResult<Listing> {
    let listing = store.update_listing(id, caller, changes)?;
    info!("User {} edited advertisement {}", caller, id);
    Ok(listing)
}

pub fn change_status(store: &dyn MarketStore, id: i32, caller: UserId, status: StatusChange) -> MarketResult<Listing> {
    let changes = ListingChanges {
        status: Some(status.into()),
        ..Default::default()
    };
    let listing = store.update_listing(id, caller, changes)?;
    info!("Advertisement {} is now {}", id, listing.status);
    Ok(listing)
}

pub fn delete_listing(store: &dyn MarketStore, id: i32, caller: UserId) -> MarketResult<()> {
    store.delete_listing(id, caller)?;
    info!("User {} deleted advertisement {}", caller, id);
    Ok(())
}

/// Filtered listings ranked by recency, then by the seller's average received rating.
pub fn search(store: &dyn MarketStore, filter: &ListingFilter) -> MarketResult<Vec<ListingSummary>> {
    let listings = store.search_listings(filter)?;
    let mut sellers: Vec<UserId> = listings.iter().map(|l| l.owner_id).collect();
    sellers.sort_unstable();
    sellers.dedup();

    let averages = rules::seller_averages(&store.seller_scores(&sellers)?);
    Ok(rules::rank_listings(listings, &averages))
}
