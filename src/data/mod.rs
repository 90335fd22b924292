/// Data layer: sample types, reading, preprocessing, batching.
///
/// Architecture:
/// ```text
///  image folders / .csv / text trees
///        │
///        ▼
///   ┌──────────┐
///   │  reader   │  lazy stream of raw Samples
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ preprocess │  Sample → Sample (normalize, augment, tokenize)
///   └────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  Vec<Sample>, batches, transform/filter, stats
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  label predicates for filter_data
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod preprocess;
pub mod reader;
