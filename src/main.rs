use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use batch_loader::data::filter::{even_label, label_counts};
use batch_loader::data::preprocess::{
    augment, compose, identity, normalize, seeded_augment, tokenize, Preprocessor,
};
use batch_loader::{DataLoader, FeatureValue, LoaderConfig, Sample, SourceKind};

#[derive(Parser, Debug)]
#[command(name = "batch-loader")]
#[command(about = "Load a dataset, iterate a few batches and print statistics")]
struct Args {
    /// Dataset to load (default: MNIST)
    #[arg(long)]
    dataset: Option<String>,

    /// Batch size (default: 32)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Shuffle the data on every pass
    #[arg(long)]
    shuffle: bool,

    /// Seed for shuffling and text augmentation
    #[arg(long)]
    seed: Option<u64>,

    /// Directory holding local datasets (default: datasets)
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// JSON file with loader settings; flags given here override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of batches to walk through
    #[arg(long, default_value = "5")]
    max_batches: usize,
}

impl Args {
    fn loader_config(&self) -> Result<LoaderConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => LoaderConfig {
                shuffle: false,
                ..LoaderConfig::default()
            },
        };
        if let Some(name) = &self.dataset {
            config.dataset_name = name.clone();
        }
        if let Some(bs) = self.batch_size {
            config.batch_size = bs;
        }
        if self.shuffle {
            config.shuffle = true;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(root) = &self.data_root {
            config.data_root = root.clone();
        }
        Ok(config)
    }
}

/// Images: augment then normalize. Text: augment then tokenize.
fn preprocessor_for(kind: SourceKind, seed: Option<u64>) -> Preprocessor {
    match (kind, seed) {
        (SourceKind::Image, _) => Box::new(compose(normalize, augment)),
        (SourceKind::Csv, _) => Box::new(identity),
        (SourceKind::Text, Some(seed)) => Box::new(compose(tokenize, seeded_augment(seed))),
        (SourceKind::Text, None) => Box::new(compose(tokenize, augment)),
    }
}

fn double_features(sample: Sample) -> Sample {
    let (features, label) = sample.into_parts();
    Sample::new(features.map_numeric(|v| v * 2.0), label)
}

fn print_statistics(loader: &mut DataLoader) {
    match loader.data_statistics() {
        Ok(Some(stats)) => match serde_json::to_string(stats) {
            Ok(json) => println!("Dataset statistics: {json}"),
            Err(e) => println!("Dataset statistics: unavailable ({e})"),
        },
        Ok(None) => println!("Dataset statistics: none (empty dataset)"),
        Err(e) => println!("Dataset statistics: unavailable ({e})"),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = args.loader_config()?;
    let name = config.dataset_name.clone();
    let preprocess = preprocessor_for(SourceKind::detect(&name), config.seed);
    let mut loader = DataLoader::new(config, preprocess)
        .with_context(|| format!("loading dataset '{name}'"))?;

    println!(
        "Loaded {} samples from '{}' ({} batches of up to {})",
        loader.len(),
        loader.dataset_name(),
        loader.num_batches(),
        loader.batch_size()
    );

    {
        let ctx = loader.batch_context();
        for (i, batch) in ctx.iter().take(args.max_batches).enumerate() {
            println!("Processing batch {} of size {}", i + 1, batch.len());
        }
    }

    print_statistics(&mut loader);
    for (label, count) in label_counts(loader.data()) {
        println!("  label {label}: {count} samples");
    }

    let numeric = loader
        .data()
        .first()
        .is_some_and(|s| !matches!(s.features(), FeatureValue::Text(_) | FeatureValue::Tokens(_)));
    if numeric {
        loader.apply_transformation(double_features);
        loader.filter_data(even_label);
        println!("After transformation and filtering:");
        println!("  {} samples remain", loader.len());
        print_statistics(&mut loader);
    } else {
        info!("skipping transform/filter demo for non-numeric features");
    }

    Ok(())
}
