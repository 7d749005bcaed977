//! Contracts for the external capabilities the engine composes.

use image::RgbImage;

use crate::error::CapabilityError;
use crate::preprocess::NormalizedCrop;
use crate::types::{BoundingBox, Embedding};

/// Crop geometry and pixel scaling an extractor expects.
///
/// Each channel value `p` in `0..=255` is fed to the model as `(p - mean) / std`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSpec {
    /// Square side length, in pixels, of the resized crop.
    pub size: u32,
    pub mean: f32,
    pub std: f32,
}

impl InputSpec {
    /// `[-1, 1]` scaling on a 112×112 crop (ArcFace family).
    pub const ARCFACE: InputSpec = InputSpec {
        size: 112,
        mean: 127.5,
        std: 127.5,
    };

    /// `[0, 1]` scaling on a 64×64 crop.
    pub const UNIT_64: InputSpec = InputSpec {
        size: 64,
        mean: 0.0,
        std: 255.0,
    };
}

/// Finds candidate face regions in an image.
///
/// Results may be empty and carry no ordering guarantee.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, CapabilityError>;
}

/// Maps a normalized face crop to a fixed-length embedding.
pub trait EmbeddingExtractor: Send + Sync {
    fn input_spec(&self) -> InputSpec;

    /// Length of every embedding this extractor produces.
    fn dimension(&self) -> usize;

    /// Identifier of the model behind this extractor (e.g. "w600k_r50").
    fn model_version(&self) -> &str;

    fn embed(&self, crop: &NormalizedCrop) -> Result<Embedding, CapabilityError>;
}
