//! Listing store and reconciliation.
//!
//! The persistent store is the dedup boundary: `item_code` is the sole
//! identity key, so reconciliation is pure set membership and never compares
//! descriptions or prices. Inserts are single atomic statements; a primary
//! key collision fails that one insert and leaves the existing row untouched.

use std::str::FromStr as _;

use indexmap::IndexSet;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::ListingRecord;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS listings (
    item_code TEXT PRIMARY KEY,
    description TEXT,
    price REAL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum ListingStatus {
    Pending,
    Posted,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredListing {
    pub item_code: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub status: ListingStatus,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The item_code already exists; the stored row was not altered.
    Conflict,
}

pub struct ListingStore {
    pool: sqlx::SqlitePool,
}

impl ListingStore {
    /// Open (creating if missing) the store and ensure the schema exists.
    ///
    /// A single connection is enough: the store sees one operation at a time
    /// across ingestion and posting.
    pub async fn open(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Load the full set of already-known item codes, once per run.
    pub async fn known_codes(&self) -> Result<IndexSet<String>, Error> {
        let codes = sqlx::query_scalar::<_, String>("SELECT item_code FROM listings")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes.into_iter().collect())
    }

    /// Insert one listing with status `pending`. A duplicate primary key
    /// reports `Conflict` instead of overwriting.
    pub async fn insert(
        &self,
        item_code: &str,
        description: &str,
        price: Option<f64>,
    ) -> Result<InsertOutcome, Error> {
        let result = sqlx::query("INSERT INTO listings (item_code, description, price) VALUES (?, ?, ?)")
            .bind(item_code)
            .bind(description)
            .bind(price)
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::Conflict)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Flip a listing to `posted` after a confirmed successful post.
    pub async fn mark_posted(&self, item_code: &str) -> Result<bool, Error> {
        let result = sqlx::query("UPDATE listings SET status = 'posted' WHERE item_code = ?")
            .bind(item_code)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, item_code: &str) -> Result<Option<StoredListing>, Error> {
        let listing =
            sqlx::query_as::<_, StoredListing>("SELECT * FROM listings WHERE item_code = ?")
                .bind(item_code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(listing)
    }

    /// Listings awaiting a post, in insertion order.
    pub async fn pending(&self) -> Result<Vec<StoredListing>, Error> {
        let listings = sqlx::query_as::<_, StoredListing>(
            "SELECT * FROM listings WHERE status = 'pending' ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(listings)
    }
}

/// Partition decoded records into (unseen, already-known) by item code
/// membership. Only the unseen half flows forward to content generation and
/// storage.
pub fn partition_new(
    records: Vec<ListingRecord>,
    known: &IndexSet<String>,
) -> (Vec<ListingRecord>, Vec<ListingRecord>) {
    records
        .into_iter()
        .partition(|record| !known.contains(&record.item_code))
}
