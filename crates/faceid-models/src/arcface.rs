//! ArcFace embedding extractor via ONNX Runtime.
//!
//! Produces 512-dimensional, L2-normalized embeddings from 112×112 face
//! crops using the w600k_r50 ArcFace model.

use std::path::Path;
use std::sync::Mutex;

use faceid_core::{CapabilityError, Embedding, EmbeddingExtractor, InputSpec, NormalizedCrop};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum ArcFaceError {
    #[error("model file not found: {0} — download w600k_r50.onnx from insightface and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("crop is {actual}px, ArcFace expects {expected}px")]
    WrongCropSize { expected: u32, actual: u32 },
    #[error("recognizer session lock poisoned")]
    SessionPoisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based embedding extractor.
pub struct ArcFaceExtractor {
    session: Mutex<Session>,
}

impl ArcFaceExtractor {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, ArcFaceError> {
        if !Path::new(model_path).exists() {
            return Err(ArcFaceError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Run the model on a normalized crop.
    pub fn extract(&self, crop: &NormalizedCrop) -> Result<Embedding, ArcFaceError> {
        let input = to_tensor(crop)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ArcFaceError::SessionPoisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ArcFaceError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(ArcFaceError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

impl EmbeddingExtractor for ArcFaceExtractor {
    fn input_spec(&self) -> InputSpec {
        InputSpec::ARCFACE
    }

    fn dimension(&self) -> usize {
        ARCFACE_EMBEDDING_DIM
    }

    fn model_version(&self) -> &str {
        ARCFACE_MODEL_VERSION
    }

    fn embed(&self, crop: &NormalizedCrop) -> Result<Embedding, CapabilityError> {
        self.extract(crop).map_err(CapabilityError::from)
    }
}

/// Reshape a planar CHW crop into a `[1, 3, 112, 112]` tensor.
fn to_tensor(crop: &NormalizedCrop) -> Result<Array4<f32>, ArcFaceError> {
    let expected = InputSpec::ARCFACE.size;
    if crop.size != expected {
        return Err(ArcFaceError::WrongCropSize {
            expected,
            actual: crop.size,
        });
    }
    let side = expected as usize;
    Array4::from_shape_vec((1, 3, side, side), crop.data.clone())
        .map_err(|e| ArcFaceError::InferenceFailed(format!("input tensor: {e}")))
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
