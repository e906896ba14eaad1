use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::{MarketError, MarketResult};
use crate::models::{
    Category, Listing, ListingChanges, ListingFilter, ListingStatus, NewCategory, NewListing,
    NewUser, Rating, Transaction, User, UserId,
};
use crate::rules;

use super::MarketStore;

#[derive(Default)]
struct Tables {
    users: BTreeMap<i32, User>,
    categories: BTreeMap<i32, Category>,
    listings: BTreeMap<i32, Listing>,
    transactions: BTreeMap<i32, Transaction>,
    ratings: BTreeMap<i32, Rating>,
    sequences: Sequences,
}

/// Last id handed out per table. Ids are never reused, even after a delete.
#[derive(Default)]
struct Sequences {
    users: i32,
    categories: i32,
    listings: i32,
    transactions: i32,
    ratings: i32,
}

fn next_id(sequence: &mut i32) -> i32 {
    *sequence += 1;
    *sequence
}

impl Tables {
    fn listing_mut(&mut self, id: i32) -> MarketResult<&mut Listing> {
        self.listings
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound(format!("advertisement with id {} not found", id)))
    }

    fn transaction(&self, id: i32) -> MarketResult<&Transaction> {
        self.transactions
            .get(&id)
            .ok_or_else(|| MarketError::NotFound("transaction not found".to_string()))
    }

    fn category_exists(&self, id: i32) -> MarketResult<()> {
        if !self.categories.contains_key(&id) {
            return Err(MarketError::NotFound(format!("category with id {} not found", id)));
        }
        Ok(())
    }
}

/// In-process store behind a single mutex, so every call is serialized.
///
/// Intended for tests and local runs without PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a listing's status without the owner/transition checks.
    #[cfg(test)]
    pub(crate) fn force_status(&self, listing_id: i32, status: ListingStatus) -> MarketResult<()> {
        let mut tables = self.tables.lock();
        tables.listing_mut(listing_id)?.status = status;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn transactions_for_listing(&self, listing_id: i32) -> Vec<Transaction> {
        let tables = self.tables.lock();
        tables
            .transactions
            .values()
            .filter(|tx| tx.listing_id == listing_id)
            .cloned()
            .collect()
    }
}

impl MarketStore for MemoryStore {
    fn insert_user(&self, new_user: NewUser) -> MarketResult<User> {
        let mut tables = self.tables.lock();
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(MarketError::Conflict("email already registered".to_string()));
        }
        let user = User {
            id: next_id(&mut tables.sequences.users),
            username: new_user.username,
            email: new_user.email,
            hashed_password: new_user.hashed_password,
            address: None,
            phone: None,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn find_user(&self, id: UserId) -> MarketResult<Option<User>> {
        Ok(self.tables.lock().users.get(&id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> MarketResult<Option<User>> {
        let tables = self.tables.lock();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    fn insert_category(&self, new_category: NewCategory) -> MarketResult<Category> {
        let mut tables = self.tables.lock();
        let category = Category {
            id: next_id(&mut tables.sequences.categories),
            title: new_category.title,
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    fn find_category(&self, id: i32) -> MarketResult<Option<Category>> {
        Ok(self.tables.lock().categories.get(&id).cloned())
    }

    fn list_categories(&self) -> MarketResult<Vec<Category>> {
        Ok(self.tables.lock().categories.values().cloned().collect())
    }

    fn insert_listing(&self, new_listing: NewListing) -> MarketResult<Listing> {
        let mut tables = self.tables.lock();
        tables.category_exists(new_listing.category_id)?;
        let listing = Listing {
            id: next_id(&mut tables.sequences.listings),
            title: new_listing.title,
            content: new_listing.content,
            price: new_listing.price,
            status: new_listing.status,
            owner_id: new_listing.owner_id,
            category_id: new_listing.category_id,
            created_at: new_listing.created_at,
        };
        tables.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    fn find_listing(&self, id: i32) -> MarketResult<Option<Listing>> {
        Ok(self.tables.lock().listings.get(&id).cloned())
    }

    fn search_listings(&self, filter: &ListingFilter) -> MarketResult<Vec<Listing>> {
        let tables = self.tables.lock();
        let mut found: Vec<Listing> = tables
            .listings
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    fn update_listing(&self, id: i32, caller: UserId, changes: ListingChanges) -> MarketResult<Listing> {
        let mut tables = self.tables.lock();
        rules::check_listing_edit(tables.listing_mut(id)?, caller, &changes)?;
        if let Some(category_id) = changes.category_id {
            tables.category_exists(category_id)?;
        }
        let listing = tables.listing_mut(id)?;
        changes.apply(listing);
        Ok(listing.clone())
    }

    fn delete_listing(&self, id: i32, caller: UserId) -> MarketResult<()> {
        let mut tables = self.tables.lock();
        let listing = tables.listing_mut(id)?;
        rules::ensure_owner(listing, caller)?;
        if tables.transactions.values().any(|tx| tx.listing_id == id) {
            return Err(MarketError::InvalidState(
                "advertisement has purchase records and cannot be deleted".to_string(),
            ));
        }
        tables.listings.remove(&id);
        Ok(())
    }

    fn create_transaction(&self, listing_id: i32, buyer_id: UserId, completed: bool) -> MarketResult<Transaction> {
        let mut tables = self.tables.lock();
        let listing = tables.listing_mut(listing_id)?;
        rules::check_purchase(listing, buyer_id)?;
        listing.status = ListingStatus::Sold;
        let seller_id = listing.owner_id;

        let tx = Transaction {
            id: next_id(&mut tables.sequences.transactions),
            listing_id,
            buyer_id,
            seller_id,
            completed,
            created_at: Utc::now().naive_utc(),
        };
        tables.transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    fn find_transaction(&self, id: i32) -> MarketResult<Option<Transaction>> {
        Ok(self.tables.lock().transactions.get(&id).cloned())
    }

    fn complete_transaction(&self, id: i32, caller: UserId) -> MarketResult<Transaction> {
        let mut tables = self.tables.lock();
        rules::ensure_participant(tables.transaction(id)?, caller)?;
        let tx = tables
            .transactions
            .get_mut(&id)
            .ok_or_else(|| MarketError::NotFound("transaction not found".to_string()))?;
        tx.completed = true;
        Ok(tx.clone())
    }

    fn create_rating(
        &self,
        transaction_id: i32,
        rater_id: UserId,
        score: i32,
        comment: Option<String>,
    ) -> MarketResult<Rating> {
        let mut tables = self.tables.lock();
        let ratee_id = rules::resolve_ratee(tables.transaction(transaction_id)?, rater_id)?;
        if tables
            .ratings
            .values()
            .any(|r| r.transaction_id == transaction_id && r.rater_id == rater_id)
        {
            return Err(rules::duplicate_rating());
        }

        let rating = Rating {
            id: next_id(&mut tables.sequences.ratings),
            transaction_id,
            rater_id,
            ratee_id,
            score,
            comment,
        };
        tables.ratings.insert(rating.id, rating.clone());
        Ok(rating)
    }

    fn ratings_for_user(&self, ratee_id: UserId) -> MarketResult<Vec<Rating>> {
        let tables = self.tables.lock();
        Ok(tables
            .ratings
            .values()
            .filter(|r| r.ratee_id == ratee_id)
            .cloned()
            .collect())
    }

    fn seller_scores(&self, sellers: &[UserId]) -> MarketResult<Vec<(UserId, i32)>> {
        let tables = self.tables.lock();
        Ok(tables
            .ratings
            .values()
            .filter_map(|r| {
                let tx = tables.transactions.get(&r.transaction_id)?;
                (r.ratee_id == tx.seller_id && sellers.contains(&tx.seller_id))
                    .then_some((tx.seller_id, r.score))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn seeded() -> (MemoryStore, i32) {
        let store = MemoryStore::new();
        for (name, email) in [("seller", "a@example.com"), ("buyer", "b@example.com"), ("other", "c@example.com")] {
            store
                .insert_user(NewUser {
                    username: name.to_string(),
                    email: email.to_string(),
                    hashed_password: "x".to_string(),
                })
                .unwrap();
        }
        let category = store
            .insert_category(NewCategory { title: "bikes".to_string() })
            .unwrap();
        let listing = store
            .insert_listing(NewListing {
                title: "bike".to_string(),
                content: "red bike".to_string(),
                price: 50.0,
                status: ListingStatus::Open,
                owner_id: 1,
                category_id: category.id,
                created_at: Utc::now().naive_utc(),
            })
            .unwrap();
        (store, listing.id)
    }

    #[test]
    fn duplicate_email_conflicts() {
        let (store, _) = seeded();
        let err = store
            .insert_user(NewUser {
                username: "again".to_string(),
                email: "a@example.com".to_string(),
                hashed_password: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
    }

    #[test]
    fn listing_requires_existing_category() {
        let store = MemoryStore::new();
        let err = store
            .insert_listing(NewListing {
                title: "lamp".to_string(),
                content: String::new(),
                price: 5.0,
                status: ListingStatus::Open,
                owner_id: 1,
                category_id: 42,
                created_at: Utc::now().naive_utc(),
            })
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound(_)));
    }

    #[test]
    fn purchase_flips_listing_and_records_seller() {
        let (store, listing_id) = seeded();
        let tx = store.create_transaction(listing_id, 2, true).unwrap();
        assert_eq!(tx.seller_id, 1);
        assert_eq!(tx.buyer_id, 2);
        let listing = store.find_listing(listing_id).unwrap().unwrap();
        assert_eq!(listing.status, ListingStatus::Sold);
    }

    #[test]
    fn failed_purchase_leaves_no_trace() {
        let (store, listing_id) = seeded();
        let err = store.create_transaction(listing_id, 1, true).unwrap_err();
        assert!(matches!(err, MarketError::SelfPurchase));
        assert_eq!(store.find_listing(listing_id).unwrap().unwrap().status, ListingStatus::Open);
        assert!(store.transactions_for_listing(listing_id).is_empty());
    }

    #[test]
    fn concurrent_purchases_yield_exactly_one_transaction() {
        let (store, listing_id) = seeded();
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [2, 3]
            .into_iter()
            .map(|buyer| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.create_transaction(listing_id, buyer, true)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(MarketError::InvalidState(_)))));
        assert_eq!(store.transactions_for_listing(listing_id).len(), 1);
        assert_eq!(store.find_listing(listing_id).unwrap().unwrap().status, ListingStatus::Sold);
    }

    #[test]
    fn concurrent_ratings_by_same_rater_yield_one_conflict() {
        let (store, listing_id) = seeded();
        let tx_id = store.create_transaction(listing_id, 2, true).unwrap().id;
        let store = Arc::new(store);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [5, 4]
            .into_iter()
            .map(|score| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.create_rating(tx_id, 2, score, None)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(MarketError::Conflict(_)))));
        assert_eq!(store.ratings_for_user(1).unwrap().len(), 1);
    }

    #[test]
    fn edit_rejects_non_owner_and_bad_transition() {
        let (store, listing_id) = seeded();
        let changes = ListingChanges {
            title: Some("stolen".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.update_listing(listing_id, 2, changes),
            Err(MarketError::Forbidden(_))
        ));

        store.force_status(listing_id, ListingStatus::Sold).unwrap();
        let reopen = ListingChanges {
            status: Some(ListingStatus::Open),
            ..Default::default()
        };
        assert!(matches!(
            store.update_listing(listing_id, 1, reopen),
            Err(MarketError::InvalidState(_))
        ));
    }

    #[test]
    fn edit_to_unknown_category_is_not_found() {
        let (store, listing_id) = seeded();
        let changes = ListingChanges {
            category_id: Some(99),
            ..Default::default()
        };
        assert!(matches!(
            store.update_listing(listing_id, 1, changes),
            Err(MarketError::NotFound(_))
        ));
    }

    #[test]
    fn purchased_listing_cannot_be_deleted() {
        let (store, listing_id) = seeded();
        store.create_transaction(listing_id, 2, false).unwrap();
        assert!(matches!(
            store.delete_listing(listing_id, 1),
            Err(MarketError::InvalidState(_))
        ));
    }

    #[test]
    fn deleted_listing_id_is_not_reused() {
        let (store, listing_id) = seeded();
        let listing = store.find_listing(listing_id).unwrap().unwrap();
        store.delete_listing(listing_id, 1).unwrap();

        let replacement = store
            .insert_listing(NewListing {
                title: "another bike".to_string(),
                content: listing.content,
                price: listing.price,
                status: ListingStatus::Open,
                owner_id: 1,
                category_id: listing.category_id,
                created_at: Utc::now().naive_utc(),
            })
            .unwrap();
        assert!(replacement.id > listing_id);
        assert!(store.find_listing(listing_id).unwrap().is_none());
    }

    #[test]
    fn keyword_wildcards_match_literally() {
        let (store, listing_id) = seeded();
        let listing = store.find_listing(listing_id).unwrap().unwrap();
        store
            .insert_listing(NewListing {
                title: "100% cotton_shirt".to_string(),
                content: String::new(),
                price: 12.0,
                status: ListingStatus::Open,
                owner_id: 1,
                category_id: listing.category_id,
                created_at: Utc::now().naive_utc(),
            })
            .unwrap();

        let search = |kw: &str| {
            store
                .search_listings(&ListingFilter {
                    keyword: Some(kw.to_string()),
                    category_id: None,
                })
                .unwrap()
        };
        assert_eq!(search("%").len(), 1);
        assert_eq!(search("n_s").len(), 1);
        assert!(search("b_ke").is_empty());
    }

    #[test]
    fn seller_scores_ignore_ratings_received_as_buyer() {
        let (store, listing_id) = seeded();
        let tx = store.create_transaction(listing_id, 2, true).unwrap();
        store.create_rating(tx.id, 2, 5, None).unwrap();
        store.create_rating(tx.id, 1, 2, None).unwrap();

        assert_eq!(store.seller_scores(&[1, 2]).unwrap(), vec![(1, 5)]);
    }
}
