use std::sync::Arc;

use faceid_core::{
    AuthResult, DecisionThreshold, EmbeddingExtractor, EngineStatus, EnrollResult, FaceLocator,
    IdentityStore, IdentitySummary, RecognitionEngine,
};
use faceid_models::{ArcFaceExtractor, ScrfdLocator};
use thiserror::Error;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("detector error: {0}")]
    Detector(#[from] faceid_models::ScrfdError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] faceid_models::ArcFaceError),
    #[error("identity store: {0}")]
    Store(#[from] faceid_core::StoreError),
    #[error("engine: {0}")]
    Engine(#[from] faceid_core::EngineError),
}

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("engine task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("engine error: {0}")]
    Engine(#[from] faceid_core::EngineError),
}

/// Clone-safe async handle to a shared engine.
///
/// Inference is CPU-bound and blocking, so every call runs on the blocking
/// pool and the D-Bus executor stays responsive.
pub struct EngineHandle<L = ScrfdLocator, E = ArcFaceExtractor> {
    engine: Arc<RecognitionEngine<L, E>>,
}

impl<L, E> Clone for EngineHandle<L, E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<L, E> EngineHandle<L, E>
where
    L: FaceLocator + 'static,
    E: EmbeddingExtractor + 'static,
{
    pub fn new(engine: RecognitionEngine<L, E>) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    pub async fn authenticate(&self, image: Vec<u8>) -> Result<AuthResult, HandleError> {
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || engine.authenticate(&image)).await?;
        Ok(AuthResult::from_result(&result))
    }

    pub async fn enroll(
        &self,
        image: Vec<u8>,
        user_id: String,
        name: String,
        role: String,
    ) -> Result<EnrollResult, HandleError> {
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || {
            let role = (!role.trim().is_empty()).then_some(role.as_str());
            engine.enroll(&image, &user_id, &name, role)
        })
        .await?;
        Ok(EnrollResult::from_result(&result))
    }

    pub async fn identities(&self) -> Result<Vec<IdentitySummary>, HandleError> {
        let engine = Arc::clone(&self.engine);
        Ok(tokio::task::spawn_blocking(move || engine.identities()).await??)
    }

    pub async fn status(&self) -> Result<EngineStatus, HandleError> {
        let engine = Arc::clone(&self.engine);
        Ok(tokio::task::spawn_blocking(move || engine.status()).await??)
    }
}

/// Open the store and load both ONNX models. Fails fast at startup if any
/// resource is unavailable.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, StartupError> {
    let threshold = DecisionThreshold::new(config.decision_threshold)?;

    let scrfd_path = config.scrfd_model_path();
    let locator =
        ScrfdLocator::load(&scrfd_path, config.detector_confidence, config.intra_threads)?;
    tracing::info!(path = %scrfd_path, "SCRFD detector loaded");

    let arcface_path = config.arcface_model_path();
    let extractor = ArcFaceExtractor::load(&arcface_path, config.intra_threads)?;
    tracing::info!(path = %arcface_path, "ArcFace recognizer loaded");

    let store = IdentityStore::load(&config.db_path)?;
    let engine = RecognitionEngine::new(locator, extractor, store, threshold)?;

    Ok(EngineHandle::new(engine))
}
