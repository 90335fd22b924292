use std::fmt;

use image::DynamicImage;
use serde::Serialize;

use crate::error::{LoaderError, PreprocessError, Result};

// ---------------------------------------------------------------------------
// Label – the target of a sample
// ---------------------------------------------------------------------------

/// Class label. Image and CSV sources produce integers, text sources produce
/// the name of the class directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl Label {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Label::Int(i) => Some(*i),
            Label::Text(_) => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{i}"),
            Label::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Int(v)
    }
}

impl From<&str> for Label {
    fn from(v: &str) -> Self {
        Label::Text(v.to_string())
    }
}

// ---------------------------------------------------------------------------
// ImageArray – decoded pixels
// ---------------------------------------------------------------------------

/// Decoded image pixels in row-major `[H, W, C]` order.
///
/// Values start out as raw intensities in `0.0..=255.0`; `normalize` rescales
/// them to `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<f32>,
}

impl ImageArray {
    /// Wrap a pixel buffer, checking it matches the declared shape.
    pub fn new(
        width: u32,
        height: u32,
        channels: u8,
        pixels: Vec<f32>,
    ) -> std::result::Result<Self, PreprocessError> {
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(PreprocessError::MalformedImage {
                op: "image",
                width,
                height,
                channels,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Grayscale images keep one channel, everything else becomes RGB.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        if img.color().has_color() {
            Self {
                width,
                height,
                channels: 3,
                pixels: img.to_rgb8().as_raw().iter().map(|&p| p as f32).collect(),
            }
        } else {
            Self {
                width,
                height,
                channels: 1,
                pixels: img.to_luma8().as_raw().iter().map(|&p| p as f32).collect(),
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// `[H, W, C]`
    pub fn shape(&self) -> [usize; 3] {
        [
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        ]
    }

    /// Same shape, new pixel values.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            channels: self.channels,
            pixels: self.pixels.iter().map(|&p| f(p)).collect(),
        }
    }

    pub(crate) fn with_pixels(&self, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), self.pixels.len());
        Self {
            width: self.width,
            height: self.height,
            channels: self.channels,
            pixels,
        }
    }
}

// ---------------------------------------------------------------------------
// FeatureValue – the input side of a sample
// ---------------------------------------------------------------------------

/// Feature payload, one variant per storage shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Image(ImageArray),
    Numeric(Vec<f32>),
    Text(String),
    Tokens(Vec<String>),
}

/// Discriminant of [`FeatureValue`], used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    Image,
    Numeric,
    Text,
    Tokens,
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Image => "image",
            FeatureKind::Numeric => "numeric",
            FeatureKind::Text => "text",
            FeatureKind::Tokens => "tokens",
        };
        f.write_str(name)
    }
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Image(_) => FeatureKind::Image,
            FeatureValue::Numeric(_) => FeatureKind::Numeric,
            FeatureValue::Text(_) => FeatureKind::Text,
            FeatureValue::Tokens(_) => FeatureKind::Tokens,
        }
    }

    /// Element count: pixels, values, characters or tokens.
    pub fn len(&self) -> usize {
        match self {
            FeatureValue::Image(img) => img.pixels().len(),
            FeatureValue::Numeric(v) => v.len(),
            FeatureValue::Text(s) => s.chars().count(),
            FeatureValue::Tokens(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat numeric view of image and CSV features.
    pub fn as_numeric(&self) -> Option<&[f32]> {
        match self {
            FeatureValue::Image(img) => Some(img.pixels()),
            FeatureValue::Numeric(v) => Some(v),
            FeatureValue::Text(_) | FeatureValue::Tokens(_) => None,
        }
    }

    /// Apply `f` to every numeric element; text and tokens pass through.
    pub fn map_numeric(&self, f: impl Fn(f32) -> f32) -> FeatureValue {
        match self {
            FeatureValue::Image(img) => FeatureValue::Image(img.map(f)),
            FeatureValue::Numeric(v) => FeatureValue::Numeric(v.iter().map(|&x| f(x)).collect()),
            other => other.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sample – one (features, label) pair
// ---------------------------------------------------------------------------

/// One unit of data. Fields are private: preprocessing consumes a sample and
/// builds a new one instead of mutating it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    features: FeatureValue,
    label: Label,
}

impl Sample {
    pub fn new(features: FeatureValue, label: impl Into<Label>) -> Self {
        Self {
            features,
            label: label.into(),
        }
    }

    pub fn features(&self) -> &FeatureValue {
        &self.features
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn into_parts(self) -> (FeatureValue, Label) {
        (self.features, self.label)
    }
}

// ---------------------------------------------------------------------------
// Stats – summary over a materialized dataset
// ---------------------------------------------------------------------------

/// Per-feature summary of a dataset whose samples all carry numeric
/// features of the same length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub num_samples: usize,
    pub num_features: usize,
    pub feature_means: Vec<f64>,
}

impl Stats {
    /// `Ok(None)` for an empty dataset.
    pub fn compute(samples: &[Sample]) -> Result<Option<Stats>> {
        let Some(first) = samples.first() else {
            return Ok(None);
        };
        let num_features = numeric_features(first, 0)?.len();
        let mut sums = vec![0.0f64; num_features];

        for (index, sample) in samples.iter().enumerate() {
            let values = numeric_features(sample, index)?;
            if values.len() != num_features {
                return Err(LoaderError::FeatureLengthMismatch {
                    index,
                    expected: num_features,
                    actual: values.len(),
                });
            }
            for (sum, &v) in sums.iter_mut().zip(values) {
                *sum += v as f64;
            }
        }

        let n = samples.len() as f64;
        Ok(Some(Stats {
            num_samples: samples.len(),
            num_features,
            feature_means: sums.into_iter().map(|s| s / n).collect(),
        }))
    }
}

fn numeric_features(sample: &Sample, index: usize) -> Result<&[f32]> {
    sample
        .features()
        .as_numeric()
        .ok_or(LoaderError::NonNumericFeatures {
            index,
            kind: sample.features().kind(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(values: &[f32], label: i64) -> Sample {
        Sample::new(FeatureValue::Numeric(values.to_vec()), label)
    }

    #[test]
    fn stats_of_two_rows() {
        let data = vec![numeric(&[1.0, 2.0], 0), numeric(&[3.0, 4.0], 1)];
        let stats = Stats::compute(&data).unwrap().unwrap();
        assert_eq!(stats.num_samples, 2);
        assert_eq!(stats.num_features, 2);
        assert_eq!(stats.feature_means, vec![2.0, 3.0]);
    }

    #[test]
    fn stats_of_empty_is_none() {
        assert!(Stats::compute(&[]).unwrap().is_none());
    }

    #[test]
    fn stats_reject_text() {
        let data = vec![Sample::new(FeatureValue::Text("hi".into()), "pos")];
        let err = Stats::compute(&data).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::NonNumericFeatures {
                index: 0,
                kind: FeatureKind::Text
            }
        ));
    }

    #[test]
    fn stats_reject_ragged_rows() {
        let data = vec![numeric(&[1.0, 2.0], 0), numeric(&[3.0], 1)];
        let err = Stats::compute(&data).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::FeatureLengthMismatch {
                index: 1,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn image_array_checks_shape() {
        assert!(ImageArray::new(2, 2, 1, vec![0.0; 4]).is_ok());
        assert!(ImageArray::new(2, 2, 3, vec![0.0; 4]).is_err());
    }

    #[test]
    fn grayscale_variants_keep_one_channel() {
        let with_alpha = DynamicImage::ImageLumaA8(image::ImageBuffer::new(2, 2));
        let wide = DynamicImage::ImageLuma16(image::ImageBuffer::from_pixel(
            2,
            2,
            image::Luma([u16::MAX]),
        ));
        for img in [with_alpha, wide] {
            let arr = ImageArray::from_dynamic(&img);
            assert_eq!(arr.channels(), 1);
            assert_eq!(arr.shape(), [2, 2, 1]);
        }

        let rgba = DynamicImage::ImageRgba8(image::ImageBuffer::new(2, 2));
        assert_eq!(ImageArray::from_dynamic(&rgba).channels(), 3);
    }

    #[test]
    fn label_ordering_and_display() {
        assert!(Label::Int(5) < Label::Text("a".into()));
        assert_eq!(Label::Int(-3).to_string(), "-3");
        assert_eq!(Label::from("cats").to_string(), "cats");
    }

    #[test]
    fn map_numeric_leaves_text_alone() {
        let text = FeatureValue::Text("abc".into());
        assert_eq!(text.map_numeric(|x| x * 2.0), text);
        let nums = FeatureValue::Numeric(vec![1.0, 2.5]);
        assert_eq!(nums.map_numeric(|x| x * 2.0), FeatureValue::Numeric(vec![2.0, 5.0]));
    }
}
