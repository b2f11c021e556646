//! Container Image Extractor.
//!
//! An xlsx file is a zip archive; every embedded raster lives under
//! `xl/media/imageN.ext`. The numeric suffix N is the archive sequence and is
//! the only ordering the container itself declares. It says nothing about
//! which row the image sits next to; that is the anchor resolver's job.

use std::{io::Read as _, path::Path, sync::LazyLock};

use regex::Regex;

use crate::{warn_run, warning::Stage};

static MEDIA_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^xl/media/image(\d+)\.(png|jpe?g)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// An embedded raster recovered from the container, keyed by the numeric
/// suffix of its internal filename.
#[derive(Clone)]
pub struct RawImage {
    pub archive_sequence: u32,
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("archive_sequence", &self.archive_sequence)
            .field("bytes", &self.bytes.len())
            .field("format", &self.format)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read spreadsheet file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to open spreadsheet container: {0}")]
    Open(#[from] zip::result::ZipError),
}

/// Recover every embedded image, ordered by archive sequence.
///
/// `image2` sorts before `image10`: ordering is by the parsed numeric suffix,
/// never by the lexical entry name. An unopenable archive is fatal for the
/// file; a single unreadable entry is skipped with a warning.
pub fn extract_images(path: &Path) -> Result<Vec<RawImage>, Error> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut entries = archive
        .file_names()
        .filter_map(|name| {
            let captures = MEDIA_IMAGE.captures(name)?;
            let sequence: u32 = captures[1].parse().ok()?;
            let format = ImageFormat::from_extension(&captures[2])?;
            Some((sequence, name.to_owned(), format))
        })
        .collect::<Vec<_>>();
    entries.sort_by_key(|(sequence, ..)| *sequence);

    let mut images = Vec::with_capacity(entries.len());
    for (archive_sequence, name, format) in entries {
        let mut bytes = Vec::new();
        match archive.by_name(&name) {
            Ok(mut entry) => {
                if let Err(error) = entry.read_to_end(&mut bytes) {
                    warn_run!(Stage::Extract, "skipping unreadable media entry {name}: {error}");
                    continue;
                }
            }
            Err(error) => {
                warn_run!(Stage::Extract, "skipping unreadable media entry {name}: {error}");
                continue;
            }
        }
        images.push(RawImage {
            archive_sequence,
            bytes,
            format,
        });
    }
    tracing::debug!(count = images.len(), "extracted embedded images");
    Ok(images)
}
