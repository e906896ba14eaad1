use crate::error::MarketResult;
use crate::models::{
    Category, Listing, ListingChanges, ListingFilter, NewCategory, NewListing, NewUser, Rating,
    Transaction, User, UserId,
};

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Persistent marketplace state.
///
/// Methods that validate and then write run as one atomic unit against the
/// backing store, so concurrent callers never observe a partially applied
/// purchase or rating.
pub trait MarketStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    fn insert_user(&self, new_user: NewUser) -> MarketResult<User>;

    fn find_user(&self, id: UserId) -> MarketResult<Option<User>>;

    fn find_user_by_email(&self, email: &str) -> MarketResult<Option<User>>;

    fn insert_category(&self, new_category: NewCategory) -> MarketResult<Category>;

    fn find_category(&self, id: i32) -> MarketResult<Option<Category>>;

    fn list_categories(&self) -> MarketResult<Vec<Category>>;

    /// Fails with `NotFound` when the category does not exist.
    fn insert_listing(&self, new_listing: NewListing) -> MarketResult<Listing>;

    fn find_listing(&self, id: i32) -> MarketResult<Option<Listing>>;

    /// Listings matching the filter, newest first.
    fn search_listings(&self, filter: &ListingFilter) -> MarketResult<Vec<Listing>>;

    /// Owner-only partial update, validated while the row is locked.
    fn update_listing(&self, id: i32, caller: UserId, changes: ListingChanges) -> MarketResult<Listing>;

    /// Owner-only delete. Listings with purchase records are kept.
    fn delete_listing(&self, id: i32, caller: UserId) -> MarketResult<()>;

    /// Checks that the listing is OPEN and not owned by `buyer_id`, then flips it
    /// to SOLD and records the transaction, all in one indivisible step.
    fn create_transaction(&self, listing_id: i32, buyer_id: UserId, completed: bool) -> MarketResult<Transaction>;

    fn find_transaction(&self, id: i32) -> MarketResult<Option<Transaction>>;

    /// Sets `completed` on a transaction the caller participates in.
    fn complete_transaction(&self, id: i32, caller: UserId) -> MarketResult<Transaction>;

    /// Validates the transaction and inserts the rating; a second rating by the
    /// same rater on the same transaction fails with `Conflict`.
    fn create_rating(
        &self,
        transaction_id: i32,
        rater_id: UserId,
        score: i32,
        comment: Option<String>,
    ) -> MarketResult<Rating>;

    fn ratings_for_user(&self, ratee_id: UserId) -> MarketResult<Vec<Rating>>;

    /// `(seller_id, score)` for every rating a seller in `sellers` received in the seller role.
    fn seller_scores(&self, sellers: &[UserId]) -> MarketResult<Vec<(UserId, i32)>>;
}
