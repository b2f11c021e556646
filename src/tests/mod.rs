
use std::path::Path;

use crate::{
    ListingRecord,
    config::{BindStrategy, Config, ImageNaming},
    content::{self, ContentGenerator, ListingContent, TemplateGenerator},
    ingest,
    progress::NullReporter,
    store::{ListingStatus, ListingStore},
    warning::Stage,
};
use fixture::{ImageSpec, RowSpec, WorkbookFixture};

fn config(images_dir: &Path, binding: BindStrategy) -> Config {
    Config {
        database: "sqlite::memory:".to_owned(),
        images_dir: images_dir.to_owned(),
        binding,
        image_naming: ImageNaming::ItemCode,
        max_title_len: 100,
        max_description_len: 500,
    }
}

fn generator() -> TemplateGenerator {
    TemplateGenerator {
        max_title_len: 100,
        max_description_len: 500,
    }
}

/// Three data rows at sheet rows 6/10/14 (1-based), anchors at 0-based rows
/// 5/9/13. The archive declares the images out of visual order.
fn shuffled_workbook() -> WorkbookFixture {
    WorkbookFixture {
        rows: vec![
            RowSpec::new(6, "Oak dining table", "A1", 1.0, 120.0),
            RowSpec::new(10, "Brass floor lamp", "A2", 2.0, 35.5),
            RowSpec::new(14, "Velvet sofa", "A3", 1.0, 450.0),
        ],
        images: vec![
            ImageSpec::anchored(3, 13, 1, b"img-three"),
            ImageSpec::anchored(1, 5, 1, b"img-one"),
            ImageSpec::anchored(2, 9, 1, b"img-two"),
        ],
    }
}

#[tokio::test]
async fn binds_by_anchor_geometry_regardless_of_archive_order() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("listings.xlsx");
    shuffled_workbook().write_to(&file);

    let config = config(&dir.path().join("images"), BindStrategy::AnchorRow);
    let listings = ListingStore::open(&config.database).await.unwrap();
    let outcome = ingest::run(&file, &config, &listings, &generator(), &NullReporter)
        .await
        .unwrap();

    let report = &outcome.report;
    assert_eq!(report.images_extracted, 3);
    assert_eq!(report.anchored, 3);
    assert_eq!(report.rows_decoded, 3);
    assert_eq!(report.bound, 3);
    assert_eq!(report.new_listings, 3);
    assert_eq!(report.already_known, 0);
    assert_eq!(report.conflicts, 0);

    // image1 (anchored highest) belongs to A1, image3 (lowest) to A3.
    let expectations = [("A1", b"img-one" as &[u8]), ("A2", b"img-two"), ("A3", b"img-three")];
    for (record, (code, bytes)) in outcome.records.iter().zip(expectations) {
        assert_eq!(record.item_code, code);
        let path = record.image_path.as_ref().unwrap();
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("image_{code}.png"));
        assert_eq!(std::fs::read(path).unwrap(), bytes);
    }

    let stored = listings.get("A2").await.unwrap().unwrap();
    assert_eq!(stored.status, ListingStatus::Pending);
    assert_eq!(stored.price, Some(35.5));
    assert!(stored.description.unwrap().starts_with("Brass floor lamp"));
}

#[tokio::test]
async fn positional_binding_pairs_visual_order_with_sheet_order() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("listings.xlsx");
    // Anchor rows drift off the data rows; positional zipping still pairs
    // the i-th image with the i-th row.
    let workbook = WorkbookFixture {
        rows: vec![
            RowSpec::new(3, "First crate", "B1", 1.0, 10.0),
            RowSpec::new(5, "Second crate", "B2", 1.0, 20.0),
        ],
        images: vec![
            ImageSpec::anchored(2, 6, 0, b"second"),
            ImageSpec::anchored(1, 2, 0, b"first"),
        ],
    };
    workbook.write_to(&file);

    let config = config(&dir.path().join("images"), BindStrategy::Positional);
    let listings = ListingStore::open(&config.database).await.unwrap();
    let outcome = ingest::run(&file, &config, &listings, &generator(), &NullReporter)
        .await
        .unwrap();
    assert_eq!(outcome.report.bound, 2);
    assert_eq!(
        std::fs::read(outcome.records[0].image_path.as_ref().unwrap()).unwrap(),
        b"first"
    );
    assert_eq!(
        std::fs::read(outcome.records[1].image_path.as_ref().unwrap()).unwrap(),
        b"second"
    );
}

#[tokio::test]
async fn reingestion_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("listings.xlsx");
    shuffled_workbook().write_to(&file);

    let config = config(&dir.path().join("images"), BindStrategy::AnchorRow);
    let listings = ListingStore::open(&config.database).await.unwrap();
    let first = ingest::run(&file, &config, &listings, &generator(), &NullReporter)
        .await
        .unwrap();
    assert_eq!(first.report.new_listings, 3);

    let second = ingest::run(&file, &config, &listings, &generator(), &NullReporter)
        .await
        .unwrap();
    assert_eq!(second.report.new_listings, 0);
    assert_eq!(second.report.already_known, 3);
    assert_eq!(second.report.conflicts, 0);
}

#[tokio::test]
async fn duplicate_item_codes_in_one_sheet_report_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("listings.xlsx");
    let workbook = WorkbookFixture {
        rows: vec![
            RowSpec::new(2, "Original entry", "C1", 1.0, 10.0),
            RowSpec::new(3, "Duplicate entry", "C1", 1.0, 99.0),
        ],
        images: Vec::new(),
    };
    workbook.write_to(&file);

    let config = config(&dir.path().join("images"), BindStrategy::AnchorRow);
    let listings = ListingStore::open(&config.database).await.unwrap();
    let outcome = ingest::run(&file, &config, &listings, &generator(), &NullReporter)
        .await
        .unwrap();
    assert_eq!(outcome.report.conflicts, 1);
    // The conflicting duplicate is not counted as a stored listing.
    assert_eq!(outcome.report.new_listings, 1);
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|warning| warning.stage == Stage::Store)
    );

    let stored = listings.get("C1").await.unwrap().unwrap();
    assert!(stored.description.unwrap().starts_with("Original entry"));
    assert_eq!(stored.price, Some(10.0));
}

#[tokio::test]
async fn zero_embedded_images_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("listings.xlsx");
    let workbook = WorkbookFixture {
        rows: vec![
            RowSpec::new(2, "Bare listing", "D1", 1.0, 5.0),
            RowSpec::new(3, "Another bare listing", "D2", 1.0, 6.0),
        ],
        images: Vec::new(),
    };
    workbook.write_to(&file);

    let config = config(&dir.path().join("images"), BindStrategy::AnchorRow);
    let listings = ListingStore::open(&config.database).await.unwrap();
    let outcome = ingest::run(&file, &config, &listings, &generator(), &NullReporter)
        .await
        .unwrap();
    assert_eq!(outcome.report.images_extracted, 0);
    assert_eq!(outcome.report.bound, 0);
    assert!(outcome.records.iter().all(|record| record.image_path.is_none()));
    assert_eq!(outcome.report.new_listings, 2);
}

#[tokio::test]
async fn unanchored_images_degrade_to_warnings_not_errors() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("listings.xlsx");
    let workbook = WorkbookFixture {
        rows: vec![RowSpec::new(6, "Lone listing", "E1", 1.0, 15.0)],
        images: vec![
            ImageSpec::anchored(1, 5, 1, b"anchored"),
            ImageSpec {
                sequence: 2,
                anchor: None,
                bytes: b"floating".to_vec(),
                ext: "png",
            },
        ],
    };
    workbook.write_to(&file);

    let config = config(&dir.path().join("images"), BindStrategy::AnchorRow);
    let listings = ListingStore::open(&config.database).await.unwrap();
    let outcome = ingest::run(&file, &config, &listings, &generator(), &NullReporter)
        .await
        .unwrap();
    assert_eq!(outcome.report.images_extracted, 2);
    assert_eq!(outcome.report.anchored, 1);
    assert_eq!(outcome.report.bound, 1);
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|warning| warning.stage == Stage::Bind && warning.message.contains("anchors")),
        "count mismatch should be reported: {:?}",
        outcome.report.warnings
    );
    assert_eq!(outcome.report.warnings_by_stage().get(&Stage::Bind), Some(&1));
}

/// Delegates to the template generator except for one item code it refuses.
struct FlakyGenerator {
    fail_code: &'static str,
}

impl ContentGenerator for FlakyGenerator {
    async fn generate(&self, record: &ListingRecord) -> Result<ListingContent, content::Error> {
        if record.item_code == self.fail_code {
            return Err(content::Error::Generation("model unavailable".to_owned()));
        }
        generator().generate(record).await
    }
}

#[tokio::test]
async fn generation_failure_skips_the_listing_and_is_not_counted_as_new() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("listings.xlsx");
    shuffled_workbook().write_to(&file);

    let config = config(&dir.path().join("images"), BindStrategy::AnchorRow);
    let listings = ListingStore::open(&config.database).await.unwrap();
    let generator = FlakyGenerator { fail_code: "A2" };
    let outcome = ingest::run(&file, &config, &listings, &generator, &NullReporter)
        .await
        .unwrap();

    assert_eq!(outcome.report.new_listings, 2);
    assert!(listings.get("A2").await.unwrap().is_none());
    assert!(listings.get("A1").await.unwrap().is_some());
    assert!(
        outcome
            .report
            .warnings
            .iter()
            .any(|warning| warning.stage == Stage::Store
                && warning.message.contains("content generation failed"))
    );
}
