//! Row-Image Binder.
//!
//! Merges the two independent orderings, archive sequence (what the
//! container declares) and visual rank (what the anchors say), with the
//! decoded rows. Two strategies exist because captured layouts differ in how
//! reliably anchors line up with data rows: keying the anchor's row number
//! into the sheet handles arbitrary interleaving, while positional zipping is
//! the fallback for the strict one-image-per-row shape.

use std::{collections::HashSet, path::Path};

use indexmap::IndexMap;
use itertools::{EitherOrBoth, Itertools as _};

use crate::{
    ListingRecord,
    config::{BindStrategy, ImageNaming},
    ingest::{anchor::RankMap, extract::RawImage},
    warn_run,
    warning::Stage,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write image file: {0}")]
    Io(#[from] std::io::Error),
}

/// (record index, archive sequence, visual rank) for every resolvable pair.
fn pair_rows(
    records: &[ListingRecord],
    ranks: &RankMap,
    strategy: BindStrategy,
) -> Vec<(usize, u32, u32)> {
    match strategy {
        BindStrategy::AnchorRow => {
            let mut used = HashSet::new();
            let mut pairs = Vec::new();
            for (rank, anchor) in ranks.iter() {
                let Some(index) = records
                    .iter()
                    .position(|record| record.sheet_row == anchor.row)
                else {
                    warn_run!(
                        Stage::Bind,
                        "image at rank {rank} anchors row {} which holds no data row; left unbound",
                        anchor.row
                    );
                    continue;
                };
                if !used.insert(index) {
                    warn_run!(
                        Stage::Bind,
                        "row {} anchors more than one image; keeping the first",
                        anchor.row
                    );
                    continue;
                }
                pairs.push((index, anchor.archive_sequence, rank));
            }
            pairs
        }
        BindStrategy::Positional => ranks
            .iter()
            .zip_longest(0..records.len())
            .filter_map(|pair| match pair {
                EitherOrBoth::Both((rank, anchor), index) => {
                    Some((index, anchor.archive_sequence, rank))
                }
                EitherOrBoth::Left((rank, _)) => {
                    warn_run!(Stage::Bind, "image at rank {rank} has no matching data row; left unbound");
                    None
                }
                EitherOrBoth::Right(index) => {
                    warn_run!(Stage::Bind, "data row at index {index} has no matching image");
                    None
                }
            })
            .collect(),
    }
}

/// Bind extracted images to decoded rows and write each bound image to the
/// image directory. Returns how many records received an image. Rows that
/// bind nothing keep `image_path = None`; downstream treats them as not yet
/// postable, never as errors.
pub async fn bind_images(
    records: &mut [ListingRecord],
    images: Vec<RawImage>,
    ranks: &RankMap,
    strategy: BindStrategy,
    naming: ImageNaming,
    images_dir: &Path,
) -> Result<usize, Error> {
    if ranks.len() != images.len() {
        warn_run!(
            Stage::Bind,
            "{} extracted images but {} carry anchors; unanchored images stay unbound",
            images.len(),
            ranks.len()
        );
    }
    let by_sequence = images
        .into_iter()
        .map(|image| (image.archive_sequence, image))
        .collect::<IndexMap<_, _>>();

    let pairs = pair_rows(records, ranks, strategy);
    if pairs.is_empty() {
        return Ok(0);
    }

    tokio::fs::create_dir_all(images_dir).await?;
    let mut bound = 0;
    for (index, archive_sequence, rank) in pairs {
        let Some(image) = by_sequence.get(&archive_sequence) else {
            warn_run!(Stage::Bind, "anchored media image{archive_sequence} is missing from the archive");
            continue;
        };
        let filename = match naming {
            ImageNaming::ItemCode => {
                format!("image_{}.{}", records[index].item_code, image.format.extension())
            }
            ImageNaming::VisualRank => {
                format!("image_{rank:03}.{}", image.format.extension())
            }
        };
        let destination = images_dir.join(filename);
        tokio::fs::write(&destination, &image.bytes).await?;
        records[index].image_path = Some(destination);
        bound += 1;
    }
    tracing::debug!(bound, "bound images to rows");
    Ok(bound)
}
