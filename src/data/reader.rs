use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::model::{FeatureValue, ImageArray, Label, Sample};
use crate::error::{LoaderError, Result};

/// Dataset names stored as folders of labelled images.
pub const IMAGE_DATASETS: &[&str] = &["MNIST", "CIFAR-10", "CIFAR-100"];

/// Recognised image extensions (case-insensitive).
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Lazy, finite stream of raw samples. `Err` items are fatal for the read.
pub type SampleIter = Box<dyn Iterator<Item = Result<Sample>>>;

// ---------------------------------------------------------------------------
// SourceKind – storage shape picked from the dataset name
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `root/<int label>/*.png|jpg|jpeg`
    Image,
    /// A single comma-separated file, label in the last column.
    Csv,
    /// `root/<label>/<any file>`; the file content is the feature.
    Text,
}

impl SourceKind {
    pub fn detect(dataset_name: &str) -> Self {
        if IMAGE_DATASETS.contains(&dataset_name) {
            SourceKind::Image
        } else if dataset_name.to_ascii_lowercase().ends_with(".csv") {
            SourceKind::Csv
        } else {
            SourceKind::Text
        }
    }
}

// ---------------------------------------------------------------------------
// SourceReader
// ---------------------------------------------------------------------------

/// Reads raw samples from a local dataset path.
///
/// Every call to [`SourceReader::samples`] starts a fresh pass, so the reader
/// can be drained more than once. It never buffers decoded samples itself.
#[derive(Debug, Clone)]
pub struct SourceReader {
    kind: SourceKind,
    root: PathBuf,
}

impl SourceReader {
    pub fn new(kind: SourceKind, root: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            root: root.into(),
        }
    }

    /// Reader for `root`, with the kind picked from `dataset_name`.
    pub fn for_dataset(dataset_name: &str, root: impl Into<PathBuf>) -> Self {
        Self::new(SourceKind::detect(dataset_name), root)
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new pass over the source.
    pub fn samples(&self) -> Result<SampleIter> {
        match self.kind {
            SourceKind::Image => read_images(&self.root),
            SourceKind::Csv => read_csv(&self.root),
            SourceKind::Text => read_text(&self.root),
        }
    }
}

// ---------------------------------------------------------------------------
// Image folders
// ---------------------------------------------------------------------------

fn read_images(root: &Path) -> Result<SampleIter> {
    let files: Vec<PathBuf> = walk_files(root)?
        .into_iter()
        .filter(|p| is_image(p))
        .collect();
    debug!("found {} image files under {}", files.len(), root.display());

    Ok(Box::new(files.into_iter().filter_map(|path| {
        match decode_image(&path) {
            Ok(sample) => Some(Ok(sample)),
            Err(reason) => {
                warn!("skipping image {}: {reason}", path.display());
                None
            }
        }
    })))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn decode_image(path: &Path) -> std::result::Result<Sample, String> {
    let dir = parent_name(path).ok_or("no parent directory")?;
    let label: i64 = dir
        .parse()
        .map_err(|_| format!("parent directory '{dir}' is not an integer label"))?;
    let img = image::open(path).map_err(|e| e.to_string())?;
    Ok(Sample::new(
        FeatureValue::Image(ImageArray::from_dynamic(&img)),
        label,
    ))
}

// ---------------------------------------------------------------------------
// CSV rows
// ---------------------------------------------------------------------------

/// Rows are `f, f, ..., label` with no header. Row lengths may differ and
/// blank lines are skipped. The first bad row aborts the read.
fn read_csv(path: &Path) -> Result<SampleIter> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoaderError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let path = path.to_path_buf();
    Ok(Box::new(reader.into_records().enumerate().map(
        move |(row, record)| {
            let record = record.map_err(|source| LoaderError::Csv {
                path: path.clone(),
                source,
            })?;
            parse_row(&path, row, &record)
        },
    )))
}

fn parse_row(path: &Path, row: usize, record: &csv::StringRecord) -> Result<Sample> {
    let bad = |column: usize, value: &str| LoaderError::CsvParse {
        path: path.to_path_buf(),
        row,
        column,
        value: value.to_string(),
    };

    let last = record.len().saturating_sub(1);
    let label_field = record.get(last).unwrap_or("");
    let label: i64 = label_field.parse().map_err(|_| bad(last, label_field))?;

    let features = record
        .iter()
        .take(last)
        .enumerate()
        .map(|(col, field)| field.parse::<f32>().map_err(|_| bad(col, field)))
        .collect::<Result<Vec<f32>>>()?;

    Ok(Sample::new(FeatureValue::Numeric(features), label))
}

// ---------------------------------------------------------------------------
// Text trees
// ---------------------------------------------------------------------------

fn read_text(root: &Path) -> Result<SampleIter> {
    let files = walk_files(root)?;
    debug!("found {} text files under {}", files.len(), root.display());

    Ok(Box::new(files.into_iter().filter_map(|path| {
        let label = parent_name(&path).unwrap_or_default();
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(Ok(Sample::new(
                FeatureValue::Text(content),
                Label::Text(label),
            ))),
            Err(e) => {
                warn!("skipping file {}: {e}", path.display());
                None
            }
        }
    })))
}

// ---------------------------------------------------------------------------
// Directory walk
// ---------------------------------------------------------------------------

/// All regular files below `root`, sorted by path. Only a failure to list
/// `root` itself is an error; unreadable subdirectories are skipped.
fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![list_dir(root).map_err(|source| LoaderError::Io {
        path: root.to_path_buf(),
        source,
    })?];

    while let Some(entries) = pending.pop() {
        for path in entries {
            if path.is_dir() {
                match list_dir(&path) {
                    Ok(children) => pending.push(children),
                    Err(e) => warn!("skipping directory {}: {e}", path.display()),
                }
            } else if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn list_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect()
}

fn parent_name(path: &Path) -> Option<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string)
}
