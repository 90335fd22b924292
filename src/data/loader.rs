use std::cell::{Cell, RefCell};
use std::ops::Deref;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::model::{Sample, Stats};
use super::preprocess::{identity, PreprocessResult, Preprocessor};
use super::reader::{SourceKind, SourceReader};
use crate::download::{dataset_url, Downloader};
use crate::error::{LoaderError, Result};

// ---------------------------------------------------------------------------
// LoaderConfig
// ---------------------------------------------------------------------------

/// Loader settings. Deserializable so the CLI can read them from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Picks both the source kind and the local path `<data_root>/<name>`.
    pub dataset_name: String,
    /// Samples per batch; must be positive.
    pub batch_size: usize,
    /// Visit samples in a fresh random order on every pass.
    pub shuffle: bool,
    /// Seed for shuffling. `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Directory holding local datasets.
    pub data_root: PathBuf,
    /// Network timeout for downloads. `None` waits indefinitely.
    pub download_timeout_secs: Option<u64>,
    /// Extra download attempts after a transient failure.
    pub download_retries: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dataset_name: "MNIST".to_string(),
            batch_size: 32,
            shuffle: true,
            seed: None,
            data_root: PathBuf::from("datasets"),
            download_timeout_secs: Some(300),
            download_retries: 0,
        }
    }
}

impl LoaderConfig {
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            ..Self::default()
        }
    }

    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }

    pub fn shuffle(mut self, s: bool) -> Self {
        self.shuffle = s;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    pub fn data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }

    pub fn download_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.download_timeout_secs = timeout.map(|t| t.as_secs());
        self
    }

    pub fn download_retries(mut self, n: u32) -> Self {
        self.download_retries = n;
        self
    }

    /// Where the dataset lives locally. For CSV datasets this is the file.
    pub fn dataset_path(&self) -> PathBuf {
        self.data_root.join(&self.dataset_name)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(LoaderError::InvalidBatchSize(self.batch_size));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DataLoader
// ---------------------------------------------------------------------------

/// One batch: up to `batch_size` consecutive samples of a pass.
pub type Batch<'a> = Vec<&'a Sample>;

/// Materialized dataset with batch iteration.
///
/// The whole dataset is held in memory. Iteration state lives in a `Cell`,
/// so a loader is neither `Sync` nor safe to share across threads; callers
/// that need that must wrap it in their own lock.
pub struct DataLoader {
    config: LoaderConfig,
    reader: SourceReader,
    preprocess: Preprocessor,
    data: Vec<Sample>,
    cursor: Cell<usize>,
    rng: RefCell<StdRng>,
    cached_statistics: Option<Stats>,
}

impl DataLoader {
    /// Build a loader and load the dataset right away, downloading it first
    /// if `<data_root>/<dataset_name>` does not exist.
    pub fn new<F>(config: LoaderConfig, preprocess: F) -> Result<Self>
    where
        F: Fn(Sample) -> PreprocessResult + 'static,
    {
        let mut loader = Self::empty(config, Box::new(preprocess))?;
        loader.load_data()?;
        Ok(loader)
    }

    /// [`DataLoader::new`] without preprocessing.
    pub fn with_defaults(config: LoaderConfig) -> Result<Self> {
        Self::new(config, identity)
    }

    /// Wrap samples that are already in memory. Nothing is read or
    /// downloaded; [`DataLoader::reload`] will go to disk.
    pub fn from_samples(config: LoaderConfig, samples: Vec<Sample>) -> Result<Self> {
        let mut loader = Self::empty(config, Box::new(identity))?;
        loader.data = samples;
        Ok(loader)
    }

    fn empty(config: LoaderConfig, preprocess: Preprocessor) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            reader: SourceReader::for_dataset(&config.dataset_name, config.dataset_path()),
            config,
            preprocess,
            data: Vec::new(),
            cursor: Cell::new(0),
            rng: RefCell::new(rng),
            cached_statistics: None,
        })
    }

    /// Read every sample through the preprocessor into memory, replacing
    /// the current data. A fatal read or preprocessing error leaves the
    /// previous data in place.
    pub fn load_data(&mut self) -> Result<()> {
        let started = Instant::now();
        if !self.config.dataset_path().exists() {
            self.download_dataset()?;
        }

        let preprocess = &self.preprocess;
        let data = self
            .reader
            .samples()?
            .map(|raw| raw.and_then(|s| preprocess(s).map_err(LoaderError::from)))
            .collect::<Result<Vec<Sample>>>()?;

        info!(
            "loaded {} samples from {} in {:.2}s",
            data.len(),
            self.reader.root().display(),
            started.elapsed().as_secs_f64()
        );
        self.data = data;
        self.cursor.set(0);
        Ok(())
    }

    /// [`DataLoader::load_data`] followed by dropping cached statistics.
    pub fn reload(&mut self) -> Result<()> {
        self.load_data()?;
        self.cached_statistics = None;
        Ok(())
    }

    /// Fetch the dataset into `<data_root>/<dataset_name>`.
    pub fn download_dataset(&self) -> Result<()> {
        let url = dataset_url(&self.config.dataset_name);
        if url.is_empty() {
            return Err(LoaderError::UnknownDataset(self.config.dataset_name.clone()));
        }
        info!("downloading {} dataset from {url}", self.config.dataset_name);
        let timeout = self.config.download_timeout_secs.map(Duration::from_secs);
        Downloader::new(timeout)?
            .with_retries(self.config.download_retries, Duration::from_millis(500))
            .download(url, &self.config.dataset_path())?;
        Ok(())
    }

    // -- iteration --

    /// Start a pass: rewind the cursor and, when shuffling, draw a new visit
    /// order. The stored data keeps its order.
    pub fn iter(&self) -> Batches<'_> {
        self.cursor.set(0);
        let order = self.config.shuffle.then(|| {
            let mut order: Vec<usize> = (0..self.data.len()).collect();
            order.shuffle(&mut *self.rng.borrow_mut());
            order
        });
        Batches {
            loader: self,
            order,
        }
    }

    /// Scope in which the cursor is rewound to 0 when the guard drops,
    /// including on early return or unwinding.
    pub fn batch_context(&self) -> BatchContext<'_> {
        BatchContext { loader: self }
    }

    /// A shuffled copy of the data; the loader itself is untouched.
    pub fn shuffled_view(&self) -> Vec<Sample> {
        let mut view = self.data.clone();
        view.shuffle(&mut *self.rng.borrow_mut());
        view
    }

    // -- in-place edits --

    /// Replace every sample with `f(sample)`, keeping order.
    pub fn apply_transformation<F>(&mut self, f: F)
    where
        F: FnMut(Sample) -> Sample,
    {
        self.data = std::mem::take(&mut self.data).into_iter().map(f).collect();
    }

    /// Keep only samples matching `predicate`, keeping order.
    pub fn filter_data<P>(&mut self, mut predicate: P)
    where
        P: FnMut(&Sample) -> bool,
    {
        self.data.retain(|s| predicate(s));
    }

    // -- statistics --

    /// Summary statistics, computed on first call and then cached.
    ///
    /// The cache is not refreshed by [`apply_transformation`] or
    /// [`filter_data`]; call [`invalidate_statistics`] for that. An empty
    /// dataset yields `None`, which is not cached.
    ///
    /// [`apply_transformation`]: DataLoader::apply_transformation
    /// [`filter_data`]: DataLoader::filter_data
    /// [`invalidate_statistics`]: DataLoader::invalidate_statistics
    pub fn data_statistics(&mut self) -> Result<Option<&Stats>> {
        if self.cached_statistics.is_none() {
            self.cached_statistics = Stats::compute(&self.data)?;
        }
        Ok(self.cached_statistics.as_ref())
    }

    pub fn invalidate_statistics(&mut self) {
        self.cached_statistics = None;
    }

    // -- accessors --

    pub fn data(&self) -> &[Sample] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        self.data.len().div_ceil(self.config.batch_size)
    }

    pub fn cursor(&self) -> usize {
        self.cursor.get()
    }

    pub fn dataset_name(&self) -> &str {
        &self.config.dataset_name
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn source_kind(&self) -> SourceKind {
        self.reader.kind()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = Batch<'a>;
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// One pass over a loader. Advances the loader's cursor by `batch_size` per
/// step; the last batch may be short.
pub struct Batches<'a> {
    loader: &'a DataLoader,
    order: Option<Vec<usize>>,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let loader: &'a DataLoader = self.loader;
        let data = &loader.data;
        let start = loader.cursor.get();
        if start >= data.len() {
            return None;
        }
        let end = (start + loader.config.batch_size).min(data.len());
        loader.cursor.set(start + loader.config.batch_size);

        let batch: Batch<'a> = match &self.order {
            Some(order) => order[start..end].iter().map(|&i| &data[i]).collect(),
            None => data[start..end].iter().collect(),
        };
        debug!("batch [{start}, {end}) of {}", data.len());
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .loader
            .data
            .len()
            .saturating_sub(self.loader.cursor.get())
            .div_ceil(self.loader.config.batch_size);
        (remaining, Some(remaining))
    }
}

// ---------------------------------------------------------------------------
// BatchContext
// ---------------------------------------------------------------------------

/// Guard returned by [`DataLoader::batch_context`].
pub struct BatchContext<'a> {
    loader: &'a DataLoader,
}

impl Deref for BatchContext<'_> {
    type Target = DataLoader;

    fn deref(&self) -> &DataLoader {
        self.loader
    }
}

impl Drop for BatchContext<'_> {
    fn drop(&mut self) {
        self.loader.cursor.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{FeatureValue, Label};

    fn rows(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample::new(FeatureValue::Numeric(vec![i as f32]), i as i64))
            .collect()
    }

    fn loader(n: usize, batch_size: usize, shuffle: bool) -> DataLoader {
        let config = LoaderConfig::new("toy.csv")
            .batch_size(batch_size)
            .shuffle(shuffle)
            .seed(11);
        DataLoader::from_samples(config, rows(n)).unwrap()
    }

    fn labels(batch: &[&Sample]) -> Vec<i64> {
        batch.iter().map(|s| s.label().as_int().unwrap()).collect()
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = LoaderConfig::new("toy.csv").batch_size(0);
        assert!(matches!(
            DataLoader::from_samples(config, rows(3)),
            Err(LoaderError::InvalidBatchSize(0))
        ));
    }

    #[test]
    fn batches_cover_data_in_order() {
        let dl = loader(7, 3, false);
        let batches: Vec<Vec<i64>> = dl.iter().map(|b| labels(&b)).collect();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
        assert_eq!(dl.num_batches(), 3);
    }

    #[test]
    fn exact_multiple_has_no_short_batch() {
        let dl = loader(6, 3, false);
        let sizes: Vec<usize> = dl.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 3]);
    }

    #[test]
    fn shuffle_leaves_data_untouched() {
        let dl = loader(50, 8, true);
        let seen: Vec<i64> = dl.iter().flat_map(|b| labels(&b)).collect();
        let stored: Vec<i64> = dl.data().iter().map(|s| s.label().as_int().unwrap()).collect();

        assert_eq!(stored, (0..50).collect::<Vec<_>>());
        assert_ne!(seen, stored);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(sorted, stored);
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let a: Vec<i64> = loader(20, 4, true).iter().flat_map(|b| labels(&b)).collect();
        let b: Vec<i64> = loader(20, 4, true).iter().flat_map(|b| labels(&b)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn cursor_advances_and_new_pass_rewinds() {
        let dl = loader(5, 2, false);
        let mut pass = dl.iter();
        pass.next();
        assert_eq!(dl.cursor(), 2);
        pass.next();
        assert_eq!(dl.cursor(), 4);
        let mut again = dl.iter();
        assert_eq!(dl.cursor(), 0);
        assert_eq!(labels(&again.next().unwrap()), vec![0, 1]);
    }

    #[test]
    fn batch_context_rewinds_on_exit() {
        let dl = loader(10, 3, false);
        assert_eq!(dl.cursor(), 0);
        {
            let ctx = dl.batch_context();
            let taken = ctx.iter().take(2).count();
            assert_eq!(taken, 2);
            assert_eq!(ctx.cursor(), 6);
        }
        assert_eq!(dl.cursor(), 0);
    }

    #[test]
    fn batch_context_rewinds_on_early_error() {
        fn consume(dl: &DataLoader) -> std::result::Result<(), String> {
            let ctx = dl.batch_context();
            for batch in ctx.iter() {
                if batch.iter().any(|s| s.label() == &Label::Int(4)) {
                    return Err("label 4".into());
                }
            }
            Ok(())
        }

        let dl = loader(10, 3, false);
        assert!(consume(&dl).is_err());
        assert_eq!(dl.cursor(), 0);
    }

    #[test]
    fn transform_and_filter_keep_order() {
        let mut dl = loader(6, 4, false);
        dl.apply_transformation(|s| {
            let (features, label) = s.into_parts();
            Sample::new(features.map_numeric(|v| v * 10.0), label)
        });
        dl.filter_data(|s| s.label().as_int().unwrap() % 2 == 1);

        let values: Vec<f32> = dl
            .data()
            .iter()
            .map(|s| s.features().as_numeric().unwrap()[0])
            .collect();
        assert_eq!(values, vec![10.0, 30.0, 50.0]);
    }

    #[test]
    fn statistics_are_cached_until_invalidated() {
        let mut dl = loader(4, 2, false);
        let first = dl.data_statistics().unwrap().cloned().unwrap();
        assert_eq!(first.feature_means, vec![1.5]);

        dl.filter_data(|s| s.label() == &Label::Int(0));
        let second = dl.data_statistics().unwrap().cloned().unwrap();
        assert_eq!(first, second);

        dl.invalidate_statistics();
        let fresh = dl.data_statistics().unwrap().cloned().unwrap();
        assert_eq!(fresh.num_samples, 1);
        assert_eq!(fresh.feature_means, vec![0.0]);
    }

    #[test]
    fn config_round_trips_through_json_with_defaults() {
        let config: LoaderConfig =
            serde_json::from_str(r#"{"dataset_name": "iris.csv", "batch_size": 8}"#).unwrap();
        assert_eq!(config.dataset_name, "iris.csv");
        assert_eq!(config.batch_size, 8);
        assert!(config.shuffle);
        assert_eq!(config.data_root, PathBuf::from("datasets"));
        assert_eq!(config.dataset_path(), PathBuf::from("datasets/iris.csv"));
    }
}
