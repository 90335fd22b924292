use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Write a small synthetic dataset tree for trying `batch-loader` offline.
#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
struct Args {
    /// Output directory
    #[arg(default_value = "datasets")]
    out: PathBuf,

    /// Samples per class
    #[arg(long, default_value = "20")]
    per_class: usize,

    #[arg(long, default_value = "42")]
    seed: u64,
}

const IMAGE_SIZE: u32 = 16;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Box-Muller transform for normal distribution
fn gauss<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// A bright blob whose position depends on the class, plus noise.
fn blob_image<R: Rng>(class: u32, rng: &mut R) -> GrayImage {
    let centre = 3.0 + class as f64 * (IMAGE_SIZE as f64 - 6.0) / 9.0;
    GrayImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
        let v = gaussian(x as f64, centre, 2.0, 1.0)
            * gaussian(y as f64, centre, 2.0, 1.0)
            * 255.0
            + gauss(rng, 0.0, 8.0);
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

fn write_images(root: &Path, per_class: usize, rng: &mut StdRng) -> Result<usize> {
    let mut written = 0;
    for class in 0..10u32 {
        let dir = root.join(class.to_string());
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        for i in 0..per_class {
            let path = dir.join(format!("{i:04}.png"));
            blob_image(class, rng)
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            written += 1;
        }
    }
    Ok(written)
}

/// Three classes of 4-feature rows, each centred on a different peak.
fn write_csv(path: &Path, per_class: usize, rng: &mut StdRng) -> Result<usize> {
    let peaks = [(1.0, 0.5), (3.0, 0.8), (5.0, 0.3)];
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut written = 0;
    for (label, &(mu, sigma)) in peaks.iter().enumerate() {
        for _ in 0..per_class {
            let mut row: Vec<String> = (0..4)
                .map(|j| format!("{:.4}", gauss(rng, mu + j as f64 * 0.1, sigma)))
                .collect();
            row.push(label.to_string());
            writer.write_record(&row)?;
            written += 1;
        }
    }
    writer.flush()?;
    Ok(written)
}

fn write_text(root: &Path, per_class: usize, rng: &mut StdRng) -> Result<usize> {
    let vocab = [
        ("pos", ["great", "loved", "brilliant", "fun", "moving"]),
        ("neg", ["dull", "boring", "awful", "slow", "flat"]),
    ];
    let mut written = 0;
    for (label, words) in &vocab {
        let dir = root.join(label);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        for i in 0..per_class {
            let len = rng.gen_range(4..10);
            let text: Vec<&str> = (0..len)
                .map(|_| words[rng.gen_range(0..words.len())])
                .collect();
            let path = dir.join(format!("{i:04}.txt"));
            fs::write(&path, text.join(" "))
                .with_context(|| format!("writing {}", path.display()))?;
            written += 1;
        }
    }
    Ok(written)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    let images = write_images(&args.out.join("MNIST"), args.per_class, &mut rng)?;
    let rows = write_csv(&args.out.join("blobs.csv"), args.per_class, &mut rng)?;
    let docs = write_text(&args.out.join("reviews"), args.per_class, &mut rng)?;

    println!(
        "Wrote {images} images, {rows} CSV rows and {docs} text files to {}",
        args.out.display()
    );
    Ok(())
}
