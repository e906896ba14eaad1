use chrono::Utc;
use diesel::prelude::*;
use diesel::PgTextExpressionMethods;
use diesel::r2d2::{ConnectionManager, PooledConnection};

use crate::db::PgPool;
use crate::error::{MarketError, MarketResult};
use crate::models::{
    Category, Listing, ListingChanges, ListingFilter, ListingStatus, NewCategory, NewListing,
    NewRating, NewTransaction, NewUser, Rating, Transaction, User, UserId,
};
use crate::rules;
use crate::schema::{categories, listings, ratings, transactions, users};

type PgConn = PooledConnection<ConnectionManager<PgConnection>>;

/// PostgreSQL-backed store. Every call checks out its own pooled connection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> MarketResult<PgConn> {
        Ok(self.pool.get()?)
    }
}

fn lock_listing(conn: &mut PgConnection, id: i32) -> MarketResult<Listing> {
    listings::table
        .find(id)
        .select(Listing::as_select())
        .for_update()
        .get_result(conn)
        .optional()?
        .ok_or_else(|| MarketError::NotFound(format!("advertisement with id {} not found", id)))
}

fn lock_transaction(conn: &mut PgConnection, id: i32) -> MarketResult<Transaction> {
    transactions::table
        .find(id)
        .select(Transaction::as_select())
        .for_update()
        .get_result(conn)
        .optional()?
        .ok_or_else(|| MarketError::NotFound("transaction not found".to_string()))
}

fn category_exists(conn: &mut PgConnection, id: i32) -> MarketResult<()> {
    let found = diesel::select(diesel::dsl::exists(categories::table.find(id))).get_result::<bool>(conn)?;
    if !found {
        return Err(MarketError::NotFound(format!("category with id {} not found", id)));
    }
    Ok(())
}

/// `%keyword%` with LIKE metacharacters escaped, so the keyword matches literally.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl super::MarketStore for PgStore {
    fn insert_user(&self, new_user: NewUser) -> MarketResult<User> {
        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .map_err(|e| MarketError::unique_violation(e, "email already registered"))
    }

    fn find_user(&self, id: UserId) -> MarketResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn find_user_by_email(&self, email: &str) -> MarketResult<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn insert_category(&self, new_category: NewCategory) -> MarketResult<Category> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(categories::table)
            .values(&new_category)
            .returning(Category::as_returning())
            .get_result(&mut conn)?)
    }

    fn find_category(&self, id: i32) -> MarketResult<Option<Category>> {
        let mut conn = self.conn()?;
        Ok(categories::table
            .find(id)
            .select(Category::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn list_categories(&self) -> MarketResult<Vec<Category>> {
        let mut conn = self.conn()?;
        Ok(categories::table
            .order(categories::id.asc())
            .select(Category::as_select())
            .load(&mut conn)?)
    }

    fn insert_listing(&self, new_listing: NewListing) -> MarketResult<Listing> {
        let mut conn = self.conn()?;
        conn.transaction::<_, MarketError, _>(|conn| {
            category_exists(conn, new_listing.category_id)?;
            Ok(diesel::insert_into(listings::table)
                .values(&new_listing)
                .returning(Listing::as_returning())
                .get_result(conn)?)
        })
    }

    fn find_listing(&self, id: i32) -> MarketResult<Option<Listing>> {
        let mut conn = self.conn()?;
        Ok(listings::table
            .find(id)
            .select(Listing::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn search_listings(&self, filter: &ListingFilter) -> MarketResult<Vec<Listing>> {
        let mut conn = self.conn()?;
        let mut query = listings::table.select(Listing::as_select()).into_boxed();

        if let Some(keyword) = filter.keyword.as_deref().filter(|k| !k.is_empty()) {
            let pattern = like_pattern(keyword);
            query = query.filter(
                listings::title
                    .ilike(pattern.clone())
                    .or(listings::content.ilike(pattern)),
            );
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(listings::category_id.eq(category_id));
        }

        Ok(query
            .order((listings::created_at.desc(), listings::id.desc()))
            .load(&mut conn)?)
    }

    fn update_listing(&self, id: i32, caller: UserId, changes: ListingChanges) -> MarketResult<Listing> {
        let mut conn = self.conn()?;
        conn.transaction::<_, MarketError, _>(|conn| {
            let listing = lock_listing(conn, id)?;
            rules::check_listing_edit(&listing, caller, &changes)?;
            if let Some(category_id) = changes.category_id {
                category_exists(conn, category_id)?;
            }
            if changes.is_empty() {
                return Ok(listing);
            }
            Ok(diesel::update(listings::table.find(id))
                .set(&changes)
                .returning(Listing::as_returning())
                .get_result(conn)?)
        })
    }

    fn delete_listing(&self, id: i32, caller: UserId) -> MarketResult<()> {
        let mut conn = self.conn()?;
        conn.transaction::<_, MarketError, _>(|conn| {
            let listing = lock_listing(conn, id)?;
            rules::ensure_owner(&listing, caller)?;
            let purchased = diesel::select(diesel::dsl::exists(
                transactions::table.filter(transactions::listing_id.eq(id)),
            ))
            .get_result::<bool>(conn)?;
            if purchased {
                return Err(MarketError::InvalidState(
                    "advertisement has purchase records and cannot be deleted".to_string(),
                ));
            }
            diesel::delete(listings::table.find(id)).execute(conn)?;
            Ok(())
        })
    }

    fn create_transaction(&self, listing_id: i32, buyer_id: UserId, completed: bool) -> MarketResult<Transaction> {
        let mut conn = self.conn()?;
        conn.transaction::<_, MarketError, _>(|conn| {
            // Row lock: a concurrent purchase blocks here and then sees SOLD.
            let listing = lock_listing(conn, listing_id)?;
            rules::check_purchase(&listing, buyer_id)?;

            diesel::update(listings::table.find(listing_id))
                .set(listings::status.eq(ListingStatus::Sold))
                .execute(conn)?;

            let new_tx = NewTransaction {
                listing_id,
                buyer_id,
                seller_id: listing.owner_id,
                completed,
                created_at: Utc::now().naive_utc(),
            };
            Ok(diesel::insert_into(transactions::table)
                .values(&new_tx)
                .returning(Transaction::as_returning())
                .get_result(conn)?)
        })
    }

    fn find_transaction(&self, id: i32) -> MarketResult<Option<Transaction>> {
        let mut conn = self.conn()?;
        Ok(transactions::table
            .find(id)
            .select(Transaction::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn complete_transaction(&self, id: i32, caller: UserId) -> MarketResult<Transaction> {
        let mut conn = self.conn()?;
        conn.transaction::<_, MarketError, _>(|conn| {
            let tx = lock_transaction(conn, id)?;
            rules::ensure_participant(&tx, caller)?;
            if tx.completed {
                return Ok(tx);
            }
            Ok(diesel::update(transactions::table.find(id))
                .set(transactions::completed.eq(true))
                .returning(Transaction::as_returning())
                .get_result(conn)?)
        })
    }

    fn create_rating(
        &self,
        transaction_id: i32,
        rater_id: UserId,
        score: i32,
        comment: Option<String>,
    ) -> MarketResult<Rating> {
        let mut conn = self.conn()?;
        conn.transaction::<_, MarketError, _>(|conn| {
            let tx = transactions::table
                .find(transaction_id)
                .select(Transaction::as_select())
                .for_share()
                .get_result(conn)
                .optional()?
                .ok_or_else(|| MarketError::NotFound("transaction not found".to_string()))?;
            let ratee_id = rules::resolve_ratee(&tx, rater_id)?;

            let already_rated = diesel::select(diesel::dsl::exists(
                ratings::table
                    .filter(ratings::transaction_id.eq(transaction_id))
                    .filter(ratings::rater_id.eq(rater_id)),
            ))
            .get_result::<bool>(conn)?;
            if already_rated {
                return Err(rules::duplicate_rating());
            }

            let new_rating = NewRating {
                transaction_id,
                rater_id,
                ratee_id,
                score,
                comment,
            };
            // The unique index settles races the EXISTS check cannot see.
            diesel::insert_into(ratings::table)
                .values(&new_rating)
                .returning(Rating::as_returning())
                .get_result(conn)
                .map_err(|e| MarketError::unique_violation(e, rules::DUPLICATE_RATING))
        })
    }

    fn ratings_for_user(&self, ratee_id: UserId) -> MarketResult<Vec<Rating>> {
        let mut conn = self.conn()?;
        Ok(ratings::table
            .filter(ratings::ratee_id.eq(ratee_id))
            .order(ratings::id.asc())
            .select(Rating::as_select())
            .load(&mut conn)?)
    }

    fn seller_scores(&self, sellers: &[UserId]) -> MarketResult<Vec<(UserId, i32)>> {
        if sellers.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        Ok(ratings::table
            .inner_join(transactions::table)
            .filter(ratings::ratee_id.eq(transactions::seller_id))
            .filter(transactions::seller_id.eq_any(sellers))
            .select((transactions::seller_id, ratings::score))
            .load(&mut conn)?)
    }
}
