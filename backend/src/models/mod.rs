use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Stable user identifier handed out by the identity provider.
pub type UserId = i32;

/// Lifecycle of a listing. Only OPEN listings can be purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListingStatus {
    Open,
    Reserved,
    Sold,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Open => "OPEN",
            ListingStatus::Reserved => "RESERVED",
            ListingStatus::Sold => "SOLD",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(ListingStatus::Open),
            "RESERVED" => Ok(ListingStatus::Reserved),
            "SOLD" => Ok(ListingStatus::Sold),
            other => Err(format!("unrecognized listing status: {}", other)),
        }
    }
}

impl ToSql<Text, Pg> for ListingStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ListingStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let raw = std::str::from_utf8(bytes.as_bytes())?;
        raw.parse().map_err(Into::into)
    }
}

/// Status values an owner may set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusChange {
    Sold,
    Reserved,
}

impl From<StatusChange> for ListingStatus {
    fn from(change: StatusChange) -> Self {
        match change {
            StatusChange::Sold => ListingStatus::Sold,
            StatusChange::Reserved => ListingStatus::Reserved,
        }
    }
}

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Category {
    pub id: i32,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize, Insertable, Validate)]
#[diesel(table_name = crate::schema::categories)]
pub struct NewCategory {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub title: String,
}

/// An advertisement offered for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::listings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Listing {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub price: f64,
    pub status: ListingStatus,
    pub owner_id: UserId,
    pub category_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::listings)]
pub struct NewListing {
    pub title: String,
    pub content: String,
    pub price: f64,
    pub status: ListingStatus,
    pub owner_id: UserId,
    pub category_id: i32,
    pub created_at: NaiveDateTime,
}

/// Partial update of a listing. Owner and creation time are not editable.
#[derive(Debug, Clone, Default, Deserialize, AsChangeset)]
#[diesel(table_name = crate::schema::listings)]
pub struct ListingChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub price: Option<f64>,
    pub status: Option<ListingStatus>,
    pub category_id: Option<i32>,
}

impl ListingChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.price.is_none()
            && self.status.is_none()
            && self.category_id.is_none()
    }

    pub fn apply(self, listing: &mut Listing) {
        if let Some(title) = self.title {
            listing.title = title;
        }
        if let Some(content) = self.content {
            listing.content = content;
        }
        if let Some(price) = self.price {
            listing.price = price;
        }
        if let Some(status) = self.status {
            listing.status = status;
        }
        if let Some(category_id) = self.category_id {
            listing.category_id = category_id;
        }
    }
}

/// Keyword / category filter for listing search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingFilter {
    #[serde(rename = "search")]
    pub keyword: Option<String>,
    pub category_id: Option<i32>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        let keyword_ok = match self.keyword.as_deref() {
            Some(kw) if !kw.is_empty() => {
                let kw = kw.to_lowercase();
                listing.title.to_lowercase().contains(&kw)
                    || listing.content.to_lowercase().contains(&kw)
            }
            _ => true,
        };
        keyword_ok && self.category_id.map_or(true, |c| listing.category_id == c)
    }
}

/// Search / browse row: the listing plus its seller's average received rating.
#[derive(Debug, Clone, Serialize)]
pub struct ListingSummary {
    #[serde(rename = "advertisement")]
    pub listing: Listing,
    pub average_rating: Option<f64>,
}

/// A purchase linking buyer, seller and listing.
#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Transaction {
    pub id: i32,
    #[serde(rename = "advertisement_id")]
    pub listing_id: i32,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub completed: bool,
    pub created_at: NaiveDateTime,
}

impl Transaction {
    pub fn involves(&self, user: UserId) -> bool {
        user == self.buyer_id || user == self.seller_id
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::transactions)]
pub struct NewTransaction {
    pub listing_id: i32,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub completed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = crate::schema::ratings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Rating {
    pub id: i32,
    pub transaction_id: i32,
    pub rater_id: UserId,
    pub ratee_id: UserId,
    pub score: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::ratings)]
pub struct NewRating {
    pub transaction_id: i32,
    pub rater_id: UserId,
    pub ratee_id: UserId,
    pub score: i32,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,
    #[validate(
        length(min = 8, max = 20, message = "password must be 8-20 characters"),
        custom = "mixed_case"
    )]
    pub password: String,
}

fn mixed_case(password: &str) -> Result<(), ValidationError> {
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        let mut err = ValidationError::new("uppercase");
        err.message = Some("password must contain an uppercase letter".into());
        return Err(err);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        let mut err = ValidationError::new("lowercase");
        err.message = Some("password must contain a lowercase letter".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub price: f64,
    pub category_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: StatusChange,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub advertisement_id: i32,
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub transaction_id: i32,
    pub score: i32,
    pub comment: Option<String>,
}
