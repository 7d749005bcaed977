//! faceid-models — ONNX Runtime capabilities for the recognition engine.
//!
//! SCRFD locates faces, ArcFace turns a crop into an embedding. Both run on
//! CPU and implement the `faceid-core` capability traits.

use std::path::PathBuf;

pub mod arcface;
pub mod scrfd;

pub use arcface::{ArcFaceError, ArcFaceExtractor};
pub use scrfd::{ScrfdError, ScrfdLocator, DEFAULT_DETECTOR_CONFIDENCE};

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/faceid`, falling back to `~/.local/share/faceid`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("faceid")
}

/// Default directory holding the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
