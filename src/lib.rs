//! # batch-loader
//!
//! Loads labelled datasets into memory and hands them out in fixed-size
//! batches.
//!
//! - [`data::reader`]: image folders, CSV rows and text trees as lazy sample
//!   streams
//! - [`data::preprocess`]: `normalize`, `augment`, `tokenize` and composition
//! - [`data::loader`]: [`DataLoader`] with batching, transform/filter and
//!   cached statistics
//! - [`download`]: fetches known datasets that are missing locally
//! - [`inventory`]: nested category/item inventory

pub mod data;
pub mod download;
pub mod error;
pub mod inventory;

pub use data::loader::{Batch, BatchContext, Batches, DataLoader, LoaderConfig};
pub use data::model::{FeatureKind, FeatureValue, ImageArray, Label, Sample, Stats};
pub use data::preprocess::{Preprocessor, PreprocessResult};
pub use data::reader::{SourceKind, SourceReader};
pub use error::{LoaderError, PreprocessError};
