//! Transaction ledger: purchases of OPEN advertisements and their completion.

use log::{info, warn};

use crate::error::{MarketError, MarketResult};
use crate::models::{PurchaseRequest, Transaction, UserId};
use crate::rules;
use crate::store::MarketStore;

/// Buys the advertisement for `buyer`. The listing flips to SOLD in the same
/// atomic step that records the transaction.
pub fn purchase(store: &dyn MarketStore, buyer: UserId, request: PurchaseRequest) -> MarketResult<Transaction> {
    match store.create_transaction(request.advertisement_id, buyer, request.completed) {
        Ok(tx) => {
            info!(
                "Transaction {} created: advertisement {} sold by {} to {}",
                tx.id, tx.listing_id, tx.seller_id, tx.buyer_id
            );
            Ok(tx)
        }
        Err(e) => {
            warn!("Purchase of advertisement {} by {} rejected: {}", request.advertisement_id, buyer, e);
            Err(e)
        }
    }
}

pub fn get_transaction(store: &dyn MarketStore, id: i32, caller: UserId) -> MarketResult<Transaction> {
    let tx = store
        .find_transaction(id)?
        .ok_or_else(|| MarketError::NotFound("transaction not found".to_string()))?;
    rules::ensure_participant(&tx, caller)?;
    Ok(tx)
}

pub fn complete(store: &dyn MarketStore, id: i32, caller: UserId) -> MarketResult<Transaction> {
    let tx = store.complete_transaction(id, caller)?;
    info!("Transaction {} marked completed by {}", id, caller);
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingStatus, NewCategory, NewListing, NewUser};
    use crate::store::MemoryStore;
    use chrono::Utc;

    const A: UserId = 1;
    const B: UserId = 2;
    const C: UserId = 3;

    fn store_with_listing() -> (MemoryStore, i32) {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store
                .insert_user(NewUser {
                    username: name.to_string(),
                    email: format!("{}@example.com", name),
                    hashed_password: "x".to_string(),
                })
                .unwrap();
        }
        let category = store.insert_category(NewCategory { title: "misc".to_string() }).unwrap();
        let listing = store
            .insert_listing(NewListing {
                title: "guitar".to_string(),
                content: "barely used".to_string(),
                price: 120.0,
                status: ListingStatus::Open,
                owner_id: A,
                category_id: category.id,
                created_at: Utc::now().naive_utc(),
            })
            .unwrap();
        (store, listing.id)
    }

    fn buy(listing: i32, completed: bool) -> PurchaseRequest {
        PurchaseRequest {
            advertisement_id: listing,
            completed,
        }
    }

    #[test]
    fn second_buyer_sees_listing_sold() {
        let (store, listing) = store_with_listing();

        let tx = purchase(&store, B, buy(listing, true)).unwrap();
        assert_eq!((tx.buyer_id, tx.seller_id, tx.listing_id), (B, A, listing));
        assert!(tx.completed);
        assert_eq!(store.find_listing(listing).unwrap().unwrap().status, ListingStatus::Sold);

        let err = purchase(&store, C, buy(listing, true)).unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
        assert_eq!(store.transactions_for_listing(listing).len(), 1);
    }

    #[test]
    fn owner_cannot_buy_own_listing() {
        let (store, listing) = store_with_listing();
        let err = purchase(&store, A, buy(listing, true)).unwrap_err();
        assert!(matches!(err, MarketError::SelfPurchase));
        assert_eq!(store.find_listing(listing).unwrap().unwrap().status, ListingStatus::Open);
    }

    #[test]
    fn reserved_listing_cannot_be_bought() {
        let (store, listing) = store_with_listing();
        store.force_status(listing, ListingStatus::Reserved).unwrap();
        assert!(matches!(
            purchase(&store, B, buy(listing, true)),
            Err(MarketError::InvalidState(_))
        ));
    }

    #[test]
    fn unknown_listing_is_not_found() {
        let (store, _) = store_with_listing();
        assert!(matches!(purchase(&store, B, buy(404, true)), Err(MarketError::NotFound(_))));
    }

    #[test]
    fn transaction_is_private_to_participants() {
        let (store, listing) = store_with_listing();
        let tx = purchase(&store, B, buy(listing, false)).unwrap();

        assert_eq!(get_transaction(&store, tx.id, A).unwrap(), tx);
        assert_eq!(get_transaction(&store, tx.id, B).unwrap(), tx);
        assert!(matches!(get_transaction(&store, tx.id, C), Err(MarketError::Forbidden(_))));
        assert!(matches!(get_transaction(&store, 99, A), Err(MarketError::NotFound(_))));
    }

    #[test]
    fn participant_can_complete_once_and_repeat_harmlessly() {
        let (store, listing) = store_with_listing();
        let tx = purchase(&store, B, buy(listing, false)).unwrap();

        assert!(matches!(complete(&store, tx.id, C), Err(MarketError::Forbidden(_))));
        assert!(complete(&store, tx.id, A).unwrap().completed);
        assert!(complete(&store, tx.id, B).unwrap().completed);
    }
}
