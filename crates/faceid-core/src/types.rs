use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DimensionMismatch;

/// Role assigned when the caller does not name one.
pub const DEFAULT_ROLE: &str = "user";

/// Bounding box for a located face, in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score; informational only, selection is by area.
    pub confidence: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence: 1.0,
        }
    }

    /// Box area; degenerate (negative-extent) boxes count as zero.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector produced by an embedding extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero-magnitude
    /// vector scores 0.0 against anything.
    pub fn similarity(&self, other: &Embedding) -> Result<f32, DimensionMismatch> {
        if self.values.len() != other.values.len() {
            return Err(DimensionMismatch {
                expected: self.values.len(),
                actual: other.values.len(),
            });
        }

        // f64 accumulation: squares of finite f32 components neither
        // overflow nor underflow to zero.
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(a), f64::from(b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        let cosine = dot / denom;
        // Rounding can push |dot / denom| a hair past 1.
        Ok(if denom > 0.0 && cosine.is_finite() {
            cosine.clamp(-1.0, 1.0) as f32
        } else {
            0.0
        })
    }

    /// Euclidean length, accumulated in `f64`.
    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| f64::from(v) * f64::from(v))
            .sum::<f64>()
            .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Little-endian `f32` encoding used by the identity store.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Inverse of [`to_le_bytes`](Self::to_le_bytes); `None` if the length is not a multiple of 4.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self { values })
    }
}

/// One enrolled identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub embedding: Embedding,
    pub enrolled_at: DateTime<Utc>,
}
