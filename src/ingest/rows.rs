//! Row Decoder.
//!
//! The tabular region has one fixed layout: description, image placeholder,
//! item code, quantity, price, total. The header row repeats the all-caps
//! column label in its item-code cell, which is the sentinel used to skip it.

use std::path::Path;

use calamine::{Data, Reader as _, Xlsx, open_workbook};

use crate::{ListingRecord, warn_run, warning::Stage};

/// Literal content of the header row's item-code cell.
pub const HEADER_SENTINEL: &str = "ITEM CODE";

const COL_DESCRIPTION: usize = 0;
const COL_ITEM_CODE: usize = 2;
const COL_QUANTITY: usize = 3;
const COL_PRICE: usize = 4;
const COL_TOTAL: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),
    #[error("workbook has no sheets")]
    NoSheet,
}

/// Decode the first sheet's tabular region into listing records, in sheet
/// row order. An unparsable workbook is fatal for the file; a malformed
/// individual cell degrades to `None` without dropping the row.
pub fn decode_rows(path: &Path) -> Result<Vec<ListingRecord>, Error> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet = workbook.sheet_names().first().cloned().ok_or(Error::NoSheet)?;
    let range = workbook.worksheet_range(&sheet)?;
    let start_row = range.start().map(|(row, _)| row).unwrap_or(0);
    let records = decode_cells(
        range
            .rows()
            .enumerate()
            .map(|(offset, cells)| (start_row + offset as u32, cells)),
    );
    tracing::debug!(count = records.len(), %sheet, "decoded listing rows");
    Ok(records)
}

/// Core decoding over raw cell rows, keyed by 0-based sheet row.
pub fn decode_cells<'a>(
    rows: impl Iterator<Item = (u32, &'a [Data])>,
) -> Vec<ListingRecord> {
    rows.filter_map(|(sheet_row, cells)| {
        let item_code = cell_text(cells.get(COL_ITEM_CODE))?;
        if item_code.is_empty() || item_code == HEADER_SENTINEL {
            return None;
        }
        Some(ListingRecord {
            sheet_row,
            description: clean_description(&cell_text(cells.get(COL_DESCRIPTION)).unwrap_or_default()),
            quantity: cell_number(sheet_row, "quantity", cells.get(COL_QUANTITY)),
            price: cell_number(sheet_row, "price", cells.get(COL_PRICE)),
            total: cell_number(sheet_row, "total", cells.get(COL_TOTAL)),
            item_code,
            image_path: None,
        })
    })
    .collect()
}

/// Trim and collapse embedded newlines into single spaces.
fn clean_description(raw: &str) -> String {
    raw.split(['\n', '\r'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell_text(cell: Option<&Data>) -> Option<String> {
    let text = match cell? {
        Data::String(text) => text.trim().to_owned(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) => {
            if value.fract() == 0.0 {
                format!("{}", *value as i64)
            } else {
                value.to_string()
            }
        }
        Data::Bool(value) => value.to_string(),
        Data::DateTimeIso(text) | Data::DurationIso(text) => text.trim().to_owned(),
        Data::DateTime(_) | Data::Empty | Data::Error(_) => return None,
    };
    Some(text)
}

fn cell_number(sheet_row: u32, field: &str, cell: Option<&Data>) -> Option<f64> {
    match cell? {
        Data::Float(value) => Some(*value),
        Data::Int(value) => Some(*value as f64),
        Data::String(text) => {
            let parsed = text.trim().parse().ok();
            if parsed.is_none() && !text.trim().is_empty() {
                warn_run!(Stage::Rows, "row {sheet_row}: {field} cell {text:?} is not numeric; kept as null");
            }
            parsed
        }
        Data::Empty => None,
        other => {
            warn_run!(Stage::Rows, "row {sheet_row}: {field} cell {other:?} is not numeric; kept as null");
            None
        }
    }
}
