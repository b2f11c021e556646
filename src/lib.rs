pub mod config;
pub mod content;
pub mod ingest;
pub mod post;
pub mod progress;
pub mod store;
pub mod warning;

#[cfg(test)]
mod tests;

use std::path::PathBuf;

/// A decoded spreadsheet row, optionally bound to its extracted image.
///
/// `sheet_row` is the 0-based worksheet row the data came from; it is the key
/// the anchor-row binding strategy uses to attach an image.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub sheet_row: u32,
    pub item_code: String,
    pub description: String,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub total: Option<f64>,
    /// `None` means "no image bound"; the listing is not yet postable.
    pub image_path: Option<PathBuf>,
}
