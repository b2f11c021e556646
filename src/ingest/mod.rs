//! The ingestion pipeline: container → anchors → rows → binding →
//! reconciliation. One spreadsheet file is processed start-to-finish,
//! single-threaded; only the store and image writes are async.

pub mod anchor;
pub mod bind;
pub mod extract;
pub mod rows;

use std::path::Path;

use crate::{
    ListingRecord, warn_run,
    config::Config,
    content::ContentGenerator,
    progress::{ProgressReporter, RunPhase},
    store::{self, InsertOutcome, ListingStore},
    warning::{self, Stage, Warning},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image extraction: {0}")]
    Extract(#[from] extract::Error),
    #[error("anchor resolution: {0}")]
    Anchor(#[from] anchor::Error),
    #[error("row decoding: {0}")]
    Rows(#[from] rows::Error),
    #[error("image binding: {0}")]
    Bind(#[from] bind::Error),
    #[error("listing store: {0}")]
    Store(#[from] store::Error),
}

/// What one ingestion run did, for the operator summary.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub images_extracted: usize,
    pub anchored: usize,
    pub rows_decoded: usize,
    pub bound: usize,
    /// Listings actually stored this run (successful inserts only).
    pub new_listings: usize,
    pub already_known: usize,
    pub conflicts: usize,
    pub warnings: Vec<Warning>,
}

impl IngestReport {
    /// Degraded-unit counts grouped by pipeline stage.
    pub fn warnings_by_stage(&self) -> indexmap::IndexMap<Stage, usize> {
        warning::count_by_stage(&self.warnings)
    }
}

#[derive(Debug)]
pub struct IngestOutcome {
    /// All decoded records in sheet order, with bound image paths filled in.
    pub records: Vec<ListingRecord>,
    pub report: IngestReport,
}

/// Ingest one spreadsheet file.
///
/// Fatal-to-file errors (unopenable archive, unparsable sheet) abort before
/// the store is touched; everything degraded lands in the report's warnings.
pub async fn run<G: ContentGenerator>(
    file: &Path,
    config: &Config,
    listings: &ListingStore,
    generator: &G,
    reporter: &dyn ProgressReporter,
) -> Result<IngestOutcome, Error> {
    let (result, warnings) =
        warning::scoped(run_inner(file, config, listings, generator, reporter)).await;
    let mut outcome = result?;
    outcome.report.warnings = warnings;
    Ok(outcome)
}

async fn run_inner<G: ContentGenerator>(
    file: &Path,
    config: &Config,
    listings: &ListingStore,
    generator: &G,
    reporter: &dyn ProgressReporter,
) -> Result<IngestOutcome, Error> {
    reporter.set_phase(RunPhase::ExtractingImages);
    let images = extract::extract_images(file)?;
    let images_extracted = images.len();

    reporter.set_phase(RunPhase::ResolvingAnchors);
    let ranks = anchor::resolve_anchors(file)?;
    let anchored = ranks.len();

    reporter.set_phase(RunPhase::DecodingRows);
    let records = rows::decode_rows(file)?;
    let rows_decoded = records.len();

    reporter.set_phase(RunPhase::BindingImages);
    let mut records = records;
    let bound = bind::bind_images(
        &mut records,
        images,
        &ranks,
        config.binding,
        config.image_naming,
        &config.images_dir,
    )
    .await?;

    reporter.set_phase(RunPhase::Reconciling);
    let known = listings.known_codes().await?;
    let (new, seen) = store::partition_new(records, &known);
    let already_known = seen.len();

    let mut new_listings = 0;
    let mut conflicts = 0;
    for record in &new {
        let content = match generator.generate(record).await {
            Ok(content) => content,
            Err(error) => {
                warn_run!(
                    Stage::Store,
                    "{}: content generation failed, listing skipped: {error}",
                    record.item_code
                );
                continue;
            }
        };
        match listings
            .insert(&record.item_code, &content.description, record.price)
            .await?
        {
            InsertOutcome::Inserted => {
                new_listings += 1;
                tracing::debug!(code = %record.item_code, "stored new listing");
            }
            InsertOutcome::Conflict => {
                conflicts += 1;
                warn_run!(Stage::Store, "{}: already stored, insertion skipped", record.item_code);
            }
        }
    }

    reporter.set_phase(RunPhase::Completed);
    let mut records = new;
    records.extend(seen);
    records.sort_by_key(|record| record.sheet_row);

    Ok(IngestOutcome {
        records,
        report: IngestReport {
            images_extracted,
            anchored,
            rows_decoded,
            bound,
            new_listings,
            already_known,
            conflicts,
            warnings: Vec::new(),
        },
    })
}
