use log::{info, warn};

use crate::error::MarketResult;
use crate::models::{Rating, RatingRequest, UserId};
use crate::store::MarketStore;

/// Rates the counterparty of a completed transaction.
pub fn rate(store: &dyn MarketStore, rater: UserId, request: RatingRequest) -> MarketResult<Rating> {
    let transaction_id = request.transaction_id;
    let rating = store
        .create_rating(transaction_id, rater, request.score, request.comment)
        .map_err(|e| {
            warn!("Rating on transaction {} by {} rejected: {}", transaction_id, rater, e);
            e
        })?;
    info!(
        "User {} rated user {} with {} on transaction {}",
        rating.rater_id, rating.ratee_id, rating.score, transaction_id
    );
    Ok(rating)
}

pub fn ratings_for_user(store: &dyn MarketStore, user: UserId) -> MarketResult<Vec<Rating>> {
    store.ratings_for_user(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketError;
    use crate::models::{ListingStatus, NewCategory, NewListing, NewUser};
    use crate::store::MemoryStore;
    use chrono::Utc;

    const A: UserId = 1;
    const B: UserId = 2;
    const C: UserId = 3;

    /// A sells to B; returns the transaction id.
    fn sold(completed: bool) -> (MemoryStore, i32) {
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
        let category = store.insert_category(NewCategory { title: "books".to_string() }).unwrap();
        let listing = store
            .insert_listing(NewListing {
                title: "atlas".to_string(),
                content: String::new(),
                price: 15.5,
                status: ListingStatus::Open,
                owner_id: A,
                category_id: category.id,
                created_at: Utc::now().naive_utc(),
            })
            .unwrap();
        let tx = store.create_transaction(listing.id, B, completed).unwrap();
        (store, tx.id)
    }

    fn score(transaction_id: i32, score: i32) -> RatingRequest {
        RatingRequest {
            transaction_id,
            score,
            comment: None,
        }
    }

    #[test]
    fn each_side_rates_the_other_exactly_once() {
        let (store, tx) = sold(true);

        let by_buyer = rate(&store, B, score(tx, 5)).unwrap();
        assert_eq!((by_buyer.rater_id, by_buyer.ratee_id, by_buyer.score), (B, A, 5));

        assert!(matches!(rate(&store, B, score(tx, 4)), Err(MarketError::Conflict(_))));

        let by_seller = rate(&store, A, score(tx, 3)).unwrap();
        assert_eq!((by_seller.rater_id, by_seller.ratee_id, by_seller.score), (A, B, 3));

        let received = ratings_for_user(&store, A).unwrap();
        assert_eq!(received, vec![by_buyer]);
    }

    #[test]
    fn incomplete_transaction_cannot_be_rated() {
        let (store, tx) = sold(false);
        for caller in [A, B, C] {
            assert!(matches!(rate(&store, caller, score(tx, 5)), Err(MarketError::InvalidState(_))));
        }
    }

    #[test]
    fn outsider_cannot_rate() {
        let (store, tx) = sold(true);
        assert!(matches!(rate(&store, C, score(tx, 1)), Err(MarketError::Forbidden(_))));
        assert!(ratings_for_user(&store, A).unwrap().is_empty());
    }

    #[test]
    fn missing_transaction_is_not_found() {
        let (store, _) = sold(true);
        assert!(matches!(rate(&store, B, score(77, 5)), Err(MarketError::NotFound(_))));
    }

    #[test]
    fn comment_is_kept() {
        let (store, tx) = sold(true);
        let rating = rate(
            &store,
            B,
            RatingRequest {
                transaction_id: tx,
                score: 4,
                comment: Some("smooth handover".to_string()),
            },
        )
        .unwrap();
        assert_eq!(rating.comment.as_deref(), Some("smooth handover"));
    }
}
