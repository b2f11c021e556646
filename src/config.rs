use std::path::PathBuf;

use serde::Deserialize;

/// How extracted images are paired with data rows.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BindStrategy {
    /// Key each anchor's row number into the data row at the same sheet row.
    #[default]
    AnchorRow,
    /// Zip anchored images (in visual order) with data rows index-for-index.
    /// Only valid when the sheet carries exactly one image per row.
    Positional,
}

/// How bound images are named inside the image directory.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageNaming {
    /// `image_<item_code>.<ext>`, stable across runs once codes are known.
    #[default]
    ItemCode,
    /// `image_<rank:03>.<ext>`, usable before codes are resolved.
    VisualRank,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Connection URL for the listing store, e.g. `sqlite://data/listings.db`.
    pub database: String,
    /// Directory the binder writes extracted images into.
    pub images_dir: PathBuf,
    #[serde(default)]
    pub binding: BindStrategy,
    #[serde(default)]
    pub image_naming: ImageNaming,
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,
    #[serde(default = "default_max_description_len")]
    pub max_description_len: usize,
}

fn default_max_title_len() -> usize {
    100
}

fn default_max_description_len() -> usize {
    500
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        if self.database.is_empty() {
            return Err("database url must not be empty".to_owned());
        }
        if self.max_title_len == 0 || self.max_description_len == 0 {
            return Err("title/description limits must be non-zero".to_owned());
        }
        Ok(())
    }

    /// Legal-but-surprising combinations worth telling the operator about.
    pub fn caveats(&self) -> Vec<String> {
        let mut caveats = Vec::new();
        if self.image_naming == ImageNaming::VisualRank {
            caveats.push(
                "image_naming = visual_rank stores images under rank names; the posting \
                 queue looks images up by item code and will skip every listing bound \
                 this run"
                    .to_owned(),
            );
        }
        caveats
    }
}
