//! Per-sample preprocessing.
//!
//! Every step consumes a [`Sample`] and returns a new one. Steps are plain
//! functions so they can be chained with [`compose`] and handed to the
//! loader as a single [`Preprocessor`].

use std::cell::RefCell;

use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};

use super::model::{FeatureValue, ImageArray, Sample};
use crate::error::PreprocessError;

pub type PreprocessResult = Result<Sample, PreprocessError>;

/// A boxed preprocessing step, applied once to every raw sample at load time.
pub type Preprocessor = Box<dyn Fn(Sample) -> PreprocessResult>;

/// Rotation applied to images by [`augment`], counter-clockwise.
pub const ROTATION_DEGREES: f32 = 10.0;

/// Number of random letters appended to text by [`augment`].
pub const NOISE_LETTERS: usize = 5;

pub fn identity(sample: Sample) -> PreprocessResult {
    Ok(sample)
}

/// Divide every pixel (or CSV value) by 255.
///
/// Not idempotent: a second application divides again.
pub fn normalize(sample: Sample) -> PreprocessResult {
    let (features, label) = sample.into_parts();
    match features {
        FeatureValue::Image(_) | FeatureValue::Numeric(_) => Ok(Sample::new(
            features.map_numeric(|v| v / 255.0),
            label,
        )),
        other => Err(PreprocessError::UnsupportedFeature {
            op: "normalize",
            kind: other.kind(),
        }),
    }
}

/// Rotate images by [`ROTATION_DEGREES`]; append a space and
/// [`NOISE_LETTERS`] random lowercase letters to text.
pub fn augment(sample: Sample) -> PreprocessResult {
    augment_with(sample, &mut thread_rng())
}

/// [`augment`] drawing its noise from `rng`.
pub fn augment_with<R: Rng + ?Sized>(sample: Sample, rng: &mut R) -> PreprocessResult {
    let (features, label) = sample.into_parts();
    let features = match features {
        FeatureValue::Image(img) => FeatureValue::Image(rotate(&img, ROTATION_DEGREES)?),
        FeatureValue::Text(mut text) => {
            text.push(' ');
            text.push_str(&random_letters(rng));
            FeatureValue::Text(text)
        }
        FeatureValue::Tokens(mut tokens) => {
            tokens.push(random_letters(rng));
            FeatureValue::Tokens(tokens)
        }
        other @ FeatureValue::Numeric(_) => {
            return Err(PreprocessError::UnsupportedFeature {
                op: "augment",
                kind: other.kind(),
            })
        }
    };
    Ok(Sample::new(features, label))
}

/// An `augment` step with its own seeded generator, for reproducible loads.
pub fn seeded_augment(seed: u64) -> impl Fn(Sample) -> PreprocessResult {
    let rng = RefCell::new(StdRng::seed_from_u64(seed));
    move |sample| augment_with(sample, &mut *rng.borrow_mut())
}

/// Split text on whitespace. Other feature kinds pass through.
pub fn tokenize(sample: Sample) -> PreprocessResult {
    let (features, label) = sample.into_parts();
    let features = match features {
        FeatureValue::Text(text) => {
            FeatureValue::Tokens(text.split_whitespace().map(str::to_string).collect())
        }
        other => other,
    };
    Ok(Sample::new(features, label))
}

/// `compose(f, g)` is `f ∘ g`: `g` runs first.
pub fn compose<F, G>(f: F, g: G) -> impl Fn(Sample) -> PreprocessResult
where
    F: Fn(Sample) -> PreprocessResult,
    G: Fn(Sample) -> PreprocessResult,
{
    move |sample| g(sample).and_then(&f)
}

fn random_letters<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..NOISE_LETTERS)
        .map(|_| rng.gen_range(b'a'..=b'z') as char)
        .collect()
}

/// Nearest-neighbour rotation about the image centre. Output keeps the input
/// size; pixels sampled from outside the source are filled with 0.
fn rotate(img: &ImageArray, degrees: f32) -> Result<ImageArray, PreprocessError> {
    let [h, w, c] = img.shape();
    let src = img.pixels();
    if src.len() != h * w * c {
        return Err(PreprocessError::MalformedImage {
            op: "augment",
            width: img.width(),
            height: img.height(),
            channels: img.channels(),
            actual: src.len(),
        });
    }

    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
    let mut out = vec![0.0f32; src.len()];

    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let sx = (cos * dx - sin * dy + cx).floor();
            let sy = (sin * dx + cos * dy + cy).floor();
            if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                continue;
            }
            let s = (sy as usize * w + sx as usize) * c;
            let d = (y * w + x) * c;
            out[d..d + c].copy_from_slice(&src[s..s + c]);
        }
    }

    Ok(img.with_pixels(out))
}
