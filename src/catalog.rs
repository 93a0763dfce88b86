//! Catalog book model and filters.

use serde::{Deserialize, Serialize};

/// Book status: offered in the store or withdrawn.
pub const STATUS_AVAILABLE: &str = "available";
/// Book status for titles withdrawn from sale and rental.
pub const STATUS_UNAVAILABLE: &str = "unavailable";

/// Price tiers for a book, in the store's minor currency unit.
///
/// Non-negative by construction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceTiers {
    /// Purchase price (permanent entitlement).
    pub purchase: u32,
    /// Two-week rental price.
    pub rent_2_weeks: u32,
    /// One-month rental price.
    pub rent_1_month: u32,
    /// Three-month rental price.
    pub rent_3_months: u32,
}

/// A book in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier for the book.
    pub id: String,

    /// Book title.
    pub title: String,

    /// Author name.
    pub author: String,

    /// Category (e.g. "fiction", "science").
    pub category: String,

    /// Year of publication.
    pub year: i32,

    /// Book description or summary.
    pub description: String,

    /// Cover image URL (reference only, never fetched by the server).
    pub cover_url: String,

    /// Path to the PDF file, relative to the configured books directory.
    pub pdf_path: String,

    /// Price tiers.
    pub price: PriceTiers,

    /// Status: "available" or "unavailable".
    pub status: String,

    /// Creation timestamp.
    pub created_at: i64,

    /// Last update timestamp.
    pub updated_at: i64,
}

impl Book {
    /// Whether the book can currently be purchased or rented.
    pub fn is_available(&self) -> bool {
        self.status == STATUS_AVAILABLE
    }
}

/// Check that a status string is one of the known values.
pub fn valid_status(status: &str) -> bool {
    status == STATUS_AVAILABLE || status == STATUS_UNAVAILABLE
}

/// Catalog listing filter. Empty filter matches every book.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookFilter {
    /// Exact category match.
    pub category: Option<String>,

    /// Case-insensitive author substring match.
    pub author: Option<String>,

    /// Exact publication year match.
    pub year: Option<i32>,

    /// Only books with status "available".
    #[serde(default)]
    pub only_available: bool,
}
