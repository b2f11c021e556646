//! Anchor Resolver.
//!
//! DrawingML parts (`xl/drawings/drawing*.xml`) carry the only geometry that
//! reflects what a human sees: each picture anchor records the (row, column)
//! cell its top-left corner sits in. The editor assigns this geometry
//! independently of the order images were inserted into the archive, so the
//! two orderings can disagree. Visual rank, derived here, is the authoritative
//! order for row association.

use std::{collections::HashMap, io::Read as _, path::Path, sync::LazyLock};

use indexmap::IndexMap;
use regex::Regex;

use crate::{warn_run, warning::Stage};

const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

static DRAWING_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^xl/drawings/drawing\d+\.xml$").unwrap());
static MEDIA_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"image(\d+)\.").unwrap());

/// Layout origin of one embedded image, in 0-based sheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPosition {
    pub archive_sequence: u32,
    pub row: u32,
    pub column: u32,
}

/// The total order over anchored images: visual rank 1..N by (row, column),
/// ties broken by archive sequence, plus the mapping back to archive
/// sequence numbers.
#[derive(Debug, Default)]
pub struct RankMap {
    /// Anchors in visual order; index + 1 is the rank.
    ranked: Vec<AnchorPosition>,
    by_sequence: IndexMap<u32, u32>,
}

impl RankMap {
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Visual rank (1-based) of the image with the given archive sequence.
    pub fn rank_of(&self, archive_sequence: u32) -> Option<u32> {
        self.by_sequence.get(&archive_sequence).copied()
    }

    /// Anchors in visual order, paired with their 1-based rank.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &AnchorPosition)> {
        self.ranked
            .iter()
            .enumerate()
            .map(|(index, anchor)| (index as u32 + 1, anchor))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read spreadsheet file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open spreadsheet container: {0}")]
    Open(#[from] zip::result::ZipError),
}

/// Sort anchors into visual order and assign ranks.
///
/// Anchors sharing a cell are ordered by archive sequence, so the earlier
/// media entry wins the tie. A duplicate archive sequence (two anchors
/// pointing at the same media entry) keeps the last anchor's rank only.
pub fn rank_anchors(mut anchors: Vec<AnchorPosition>) -> RankMap {
    anchors.sort_by_key(|anchor| (anchor.row, anchor.column, anchor.archive_sequence));
    let mut by_sequence = IndexMap::new();
    for (index, anchor) in anchors.iter().enumerate() {
        if by_sequence
            .insert(anchor.archive_sequence, index as u32 + 1)
            .is_some()
        {
            warn_run!(
                Stage::Anchor,
                "media image{} is anchored more than once; keeping the last anchor's rank",
                anchor.archive_sequence
            );
        }
    }
    RankMap {
        ranked: anchors,
        by_sequence,
    }
}

/// Read every drawing part in the container and resolve anchored images.
///
/// Input files carry a single active sheet, so all drawing parts belong
/// to it. Malformed drawing XML degrades the run (those images simply
/// stay unbound) rather than failing it; only an unopenable container is
/// fatal.
pub fn resolve_anchors(path: &Path) -> Result<RankMap, Error> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut parts = archive
        .file_names()
        .filter(|name| DRAWING_PART.is_match(name))
        .map(str::to_owned)
        .collect::<Vec<_>>();
    parts.sort();

    let mut anchors = Vec::new();
    for part in parts {
        let Some(xml) = read_entry(&mut archive, &part) else {
            continue;
        };
        let rels_path = rels_path_for(&part);
        let relationships = read_entry(&mut archive, &rels_path)
            .map(|xml| parse_relationships(&rels_path, &xml))
            .unwrap_or_default();
        collect_anchors(&part, &xml, &relationships, &mut anchors);
    }
    tracing::debug!(count = anchors.len(), "resolved image anchors");
    Ok(rank_anchors(anchors))
}

fn read_entry(archive: &mut zip::ZipArchive<std::fs::File>, name: &str) -> Option<String> {
    let mut content = String::new();
    match archive.by_name(name) {
        Ok(mut entry) => {
            if let Err(error) = entry.read_to_string(&mut content) {
                warn_run!(Stage::Anchor, "skipping unreadable drawing part {name}: {error}");
                return None;
            }
        }
        Err(zip::result::ZipError::FileNotFound) => return None,
        Err(error) => {
            warn_run!(Stage::Anchor, "skipping unreadable drawing part {name}: {error}");
            return None;
        }
    }
    Some(content)
}

fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Relationship id → archive sequence of the media target.
fn parse_relationships(part: &str, xml: &str) -> HashMap<String, u32> {
    let document = match roxmltree::Document::parse(xml) {
        Ok(document) => document,
        Err(error) => {
            warn_run!(Stage::Anchor, "malformed relationships in {part}: {error}");
            return HashMap::new();
        }
    };
    document
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "Relationship")
        .filter_map(|node| {
            let id = node.attribute("Id")?;
            let target = node.attribute("Target")?;
            let sequence: u32 = MEDIA_SEQUENCE.captures(target)?[1].parse().ok()?;
            Some((id.to_owned(), sequence))
        })
        .collect()
}

fn collect_anchors(
    part: &str,
    xml: &str,
    relationships: &HashMap<String, u32>,
    anchors: &mut Vec<AnchorPosition>,
) {
    let document = match roxmltree::Document::parse(xml) {
        Ok(document) => document,
        Err(error) => {
            warn_run!(Stage::Anchor, "malformed drawing part {part}: {error}");
            return;
        }
    };
    for node in document
        .root_element()
        .children()
        .filter(|node| node.is_element())
    {
        // absoluteAnchor carries no cell origin; such images exist in the
        // archive but cannot be row-bound.
        let tag = node.tag_name().name();
        if tag != "oneCellAnchor" && tag != "twoCellAnchor" {
            continue;
        }
        let Some(from) = node
            .children()
            .find(|child| child.is_element() && child.tag_name().name() == "from")
        else {
            warn_run!(Stage::Anchor, "anchor in {part} has no origin; image left unbound");
            continue;
        };
        let (Some(row), Some(column)) = (child_u32(&from, "row"), child_u32(&from, "col")) else {
            warn_run!(Stage::Anchor, "anchor in {part} has an unreadable origin; image left unbound");
            continue;
        };
        let Some(embed) = node
            .descendants()
            .find(|child| child.is_element() && child.tag_name().name() == "blip")
            .and_then(|blip| blip.attribute((REL_NS, "embed")).or(blip.attribute("embed")))
        else {
            // Shapes and charts anchor the same way but embed no raster.
            continue;
        };
        let Some(archive_sequence) = relationships.get(embed).copied() else {
            warn_run!(Stage::Anchor, "anchor in {part} references unknown relationship {embed}");
            continue;
        };
        anchors.push(AnchorPosition {
            archive_sequence,
            row,
            column,
        });
    }
}

fn child_u32(node: &roxmltree::Node, name: &str) -> Option<u32> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == name)
        .and_then(|child| child.text())
        .and_then(|text| text.trim().parse().ok())
}
