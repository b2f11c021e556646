//! Content generation boundary.
//!
//! Title/description generation is an external collaborator (an LLM call in
//! production); the core only fixes its interface and the length limits the
//! posting surface enforces. `TemplateGenerator` is the shipped deterministic
//! implementation.

use crate::ListingRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingContent {
    pub title: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("content generation failed: {0}")]
    Generation(String),
}

pub trait ContentGenerator {
    fn generate(
        &self,
        record: &ListingRecord,
    ) -> impl Future<Output = Result<ListingContent, Error>>;
}

/// Deterministic generator that reworks the row's own text into a title and
/// description, clipped to the configured limits.
pub struct TemplateGenerator {
    pub max_title_len: usize,
    pub max_description_len: usize,
}

impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, record: &ListingRecord) -> Result<ListingContent, Error> {
        let title = if record.description.is_empty() {
            format!("Listing {}", record.item_code)
        } else {
            record.description.clone()
        };
        let mut description = record.description.clone();
        if let Some(quantity) = record.quantity {
            description.push_str(&format!(" Quantity available: {quantity}."));
        }
        Ok(ListingContent {
            title: truncate_chars(title.trim(), self.max_title_len),
            description: truncate_chars(description.trim(), self.max_description_len),
        })
    }
}

/// Clip to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((offset, _)) => text[..offset].to_owned(),
        None => text.to_owned(),
    }
}
