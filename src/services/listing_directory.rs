//! Marketplace catalog lookups used by order creation, ownership checks and
//! the TAT estimator.

use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    sea_query::{Expr, Func},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

use crate::entities::{listings, prelude::Listings};
use crate::error::EscrowError;

lazy_static! {
    static ref SCHEME_RE: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").unwrap();
    static ref WWW_RE: Regex = Regex::new(r"^www\.").unwrap();
}

/// Canonical form of a site URL: no scheme, no leading `www.`, no query,
/// fragment or trailing slash, lowercase host.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = SCHEME_RE.replace(trimmed, "");
    let without_www = WWW_RE.replace(&without_scheme, "");
    let cut = without_www
        .find(|c| c == '?' || c == '#')
        .map(|i| &without_www[..i])
        .unwrap_or(&without_www[..]);
    let cut = cut.trim_end_matches('/');

    match cut.split_once('/') {
        Some((host, path)) => format!("{}/{}", host.to_lowercase(), path),
        None => cut.to_lowercase(),
    }
}

/// Host part of a normalized URL
fn host_of(normalized: &str) -> &str {
    normalized.split('/').next().unwrap_or(normalized)
}

#[async_trait]
pub trait ListingDirectory: Send + Sync {
    async fn find_by_id(&self, listing_id: i32) -> Result<Option<listings::Model>, EscrowError>;

    async fn find_by_url(&self, url: &str) -> Result<Option<listings::Model>, EscrowError>;

    async fn find_by_publisher_email(
        &self,
        email: &str,
    ) -> Result<Vec<listings::Model>, EscrowError>;

    async fn update_tat(
        &self,
        listing_id: i32,
        tat: i32,
        placement_speed: &str,
    ) -> Result<(), EscrowError>;
}

/// Resolve a listing reference: a numeric id, or a site URL
pub async fn resolve_listing(
    directory: &dyn ListingDirectory,
    listing_ref: &str,
) -> Result<listings::Model, EscrowError> {
    let listing_ref = listing_ref.trim();
    if listing_ref.is_empty() {
        return Err(EscrowError::validation("listing reference is required"));
    }

    let found = match listing_ref.parse::<i32>() {
        Ok(id) => directory.find_by_id(id).await?,
        Err(_) => directory.find_by_url(listing_ref).await?,
    };

    found.ok_or_else(|| EscrowError::not_found(format!("listing {}", listing_ref)))
}

#[derive(Clone)]
pub struct DbListingDirectory {
    db: DatabaseConnection,
}

impl DbListingDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ListingDirectory for DbListingDirectory {
    async fn find_by_id(&self, listing_id: i32) -> Result<Option<listings::Model>, EscrowError> {
        Ok(Listings::find_by_id(listing_id).one(&self.db).await?)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<listings::Model>, EscrowError> {
        let wanted = normalize_url(url);
        if wanted.is_empty() {
            return Ok(None);
        }

        // Narrow by host in SQL, compare canonical forms here
        let candidates = Listings::find()
            .filter(listings::Column::Url.contains(host_of(&wanted)))
            .order_by_asc(listings::Column::Id)
            .all(&self.db)
            .await?;

        Ok(candidates
            .into_iter()
            .find(|listing| normalize_url(&listing.url) == wanted))
    }

    async fn find_by_publisher_email(
        &self,
        email: &str,
    ) -> Result<Vec<listings::Model>, EscrowError> {
        let email = email.trim().to_lowercase();
        Ok(Listings::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(listings::Column::PublisherEmail))).eq(email),
            )
            .order_by_asc(listings::Column::Id)
            .all(&self.db)
            .await?)
    }

    async fn update_tat(
        &self,
        listing_id: i32,
        tat: i32,
        placement_speed: &str,
    ) -> Result<(), EscrowError> {
        let result = Listings::update_many()
            .col_expr(listings::Column::Tat, Expr::value(Some(tat)))
            .col_expr(
                listings::Column::PlacementSpeed,
                Expr::value(Some(placement_speed.to_string())),
            )
            .col_expr(listings::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(listings::Column::Id.eq(listing_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(EscrowError::not_found(format!("listing {}", listing_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("https://www.Example.com/"), "example.com");
        assert_eq!(normalize_url("http://example.com/blog/?utm=1"), "example.com/blog");
        assert_eq!(normalize_url("  example.com#top "), "example.com");
        assert_eq!(normalize_url("EXAMPLE.com/Path"), "example.com/Path");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("example.com/blog"), "example.com");
        assert_eq!(host_of("example.com"), "example.com");
    }
}
