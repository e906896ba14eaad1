//! Marketplace rules shared by every store backend.
//!
//! Stores call these while holding whatever lock makes the surrounding
//! read-validate-write sequence atomic, so the checks here never perform I/O.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{MarketError, MarketResult};
use crate::models::{Listing, ListingChanges, ListingStatus, ListingSummary, Transaction, UserId};

/// Purchase checks, first violation wins: listing must be OPEN, buyer must not own it.
pub fn check_purchase(listing: &Listing, buyer_id: UserId) -> MarketResult<()> {
    if listing.status != ListingStatus::Open {
        return Err(MarketError::InvalidState(
            "advertisement is not available for sale".to_string(),
        ));
    }
    if listing.owner_id == buyer_id {
        return Err(MarketError::SelfPurchase);
    }
    Ok(())
}

/// Transaction details are private to buyer and seller.
pub fn ensure_participant(tx: &Transaction, caller: UserId) -> MarketResult<()> {
    if !tx.involves(caller) {
        return Err(MarketError::Forbidden(
            "not authorized to view this transaction".to_string(),
        ));
    }
    Ok(())
}

/// Validates a rating attempt and returns the ratee: the counterparty of `rater`.
pub fn resolve_ratee(tx: &Transaction, rater: UserId) -> MarketResult<UserId> {
    if !tx.completed {
        return Err(MarketError::InvalidState("transaction not completed".to_string()));
    }
    if rater == tx.buyer_id {
        Ok(tx.seller_id)
    } else if rater == tx.seller_id {
        Ok(tx.buyer_id)
    } else {
        Err(MarketError::Forbidden(
            "user not involved in this transaction".to_string(),
        ))
    }
}

pub const DUPLICATE_RATING: &str = "rating already exists for this transaction by this user";

pub fn duplicate_rating() -> MarketError {
    MarketError::Conflict(DUPLICATE_RATING.to_string())
}

pub fn ensure_owner(listing: &Listing, caller: UserId) -> MarketResult<()> {
    if listing.owner_id != caller {
        return Err(MarketError::Forbidden(format!(
            "user {} has no write access to advertisement {}",
            caller, listing.id
        )));
    }
    Ok(())
}

pub fn check_price(price: f64) -> MarketResult<()> {
    if !price.is_finite() || price <= 0.0 {
        return Err(MarketError::Validation("price must be more than 0".to_string()));
    }
    Ok(())
}

pub fn check_title(title: &str) -> MarketResult<()> {
    if title.trim().is_empty() {
        return Err(MarketError::Validation("title must not be empty".to_string()));
    }
    Ok(())
}

/// Owners may only move a listing out of OPEN; same-status edits are no-ops.
pub fn check_status_change(current: ListingStatus, next: ListingStatus) -> MarketResult<()> {
    match (current, next) {
        (a, b) if a == b => Ok(()),
        (ListingStatus::Open, ListingStatus::Reserved) | (ListingStatus::Open, ListingStatus::Sold) => Ok(()),
        (from, to) => Err(MarketError::InvalidState(format!(
            "advertisement status cannot change from {} to {}",
            from, to
        ))),
    }
}

/// Owner-only edit validation. Category existence is checked by the store.
pub fn check_listing_edit(listing: &Listing, caller: UserId, changes: &ListingChanges) -> MarketResult<()> {
    ensure_owner(listing, caller)?;
    if let Some(title) = changes.title.as_deref() {
        check_title(title)?;
    }
    if let Some(price) = changes.price {
        check_price(price)?;
    }
    if let Some(status) = changes.status {
        check_status_change(listing.status, status)?;
    }
    Ok(())
}

/// Average score per seller from `(seller_id, score)` pairs of ratings received in the seller role.
pub fn seller_averages(scores: &[(UserId, i32)]) -> HashMap<UserId, f64> {
    let mut sums: HashMap<UserId, (i64, u32)> = HashMap::new();
    for &(seller, score) in scores {
        let entry = sums.entry(seller).or_insert((0, 0));
        entry.0 += i64::from(score);
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(seller, (sum, count))| (seller, sum as f64 / f64::from(count)))
        .collect()
}

/// Orders search results: newest first, then best-rated seller, unrated sellers last.
pub fn rank_listings(listings: Vec<Listing>, averages: &HashMap<UserId, f64>) -> Vec<ListingSummary> {
    let mut rows: Vec<ListingSummary> = listings
        .into_iter()
        .map(|listing| {
            let average_rating = averages.get(&listing.owner_id).copied();
            ListingSummary { listing, average_rating }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.listing
            .created_at
            .cmp(&a.listing.created_at)
            .then_with(|| rating_desc_nulls_last(a.average_rating, b.average_rating))
            .then_with(|| b.listing.id.cmp(&a.listing.id))
    });
    rows
}

fn rating_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
