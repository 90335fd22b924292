use std::path::PathBuf;

use thiserror::Error;

use crate::data::model::FeatureKind;

/// Errors surfaced by loading, downloading and summarising a dataset.
///
/// Per-file failures inside a directory scan never show up here: the reader
/// logs and skips them. Everything in this enum aborts the operation that
/// produced it.
#[derive(Debug, Error)]
pub enum LoaderError {
    // -- configuration --
    #[error("batch size must be positive, got {0}")]
    InvalidBatchSize(usize),

    #[error("no download URL known for dataset '{0}'")]
    UnknownDataset(String),

    // -- file level --
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reading CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}, row {row}, column {column}: '{value}' is not a valid number")]
    CsvParse {
        path: PathBuf,
        row: usize,
        column: usize,
        value: String,
    },

    // -- network --
    #[error("downloading {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("reading response body from {url}: {source}")]
    DownloadBody {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("building HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("downloading {url}: HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    // -- statistics --
    #[error("statistics need numeric features, sample {index} holds {kind}")]
    NonNumericFeatures { index: usize, kind: FeatureKind },

    #[error("sample {index} has {actual} features, expected {expected}")]
    FeatureLengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
}

/// A preprocessing step was applied to a feature kind it does not support.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("{op} does not apply to {kind} features")]
    UnsupportedFeature { op: &'static str, kind: FeatureKind },

    #[error("{op}: pixel buffer holds {actual} values, {width}x{height}x{channels} expected")]
    MalformedImage {
        op: &'static str,
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },
}

pub type Result<T, E = LoaderError> = std::result::Result<T, E>;
