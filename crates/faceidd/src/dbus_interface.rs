use faceid_core::{EmbeddingExtractor, FaceLocator};
use faceid_models::{ArcFaceExtractor, ScrfdLocator};
use serde::Serialize;
use zbus::interface;

use crate::engine::{EngineHandle, HandleError};

/// Well-known bus name claimed by the daemon.
pub const BUS_NAME: &str = "org.faceid.Recognition1";
/// Object path the service is served at.
pub const OBJECT_PATH: &str = "/org/faceid/Recognition1";

/// D-Bus interface for the face recognition daemon.
///
/// Bus name: org.faceid.Recognition1
/// Object path: /org/faceid/Recognition1
pub struct FaceIdService<L = ScrfdLocator, E = ArcFaceExtractor> {
    engine: EngineHandle<L, E>,
}

impl<L, E> FaceIdService<L, E> {
    pub fn new(engine: EngineHandle<L, E>) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.faceid.Recognition1")]
impl FaceIdService {
    /// Identify the largest face in an encoded image.
    async fn authenticate(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "authenticate requested");
        authenticate_json(&self.engine, image).await
    }

    /// Enroll the single face in an encoded image. An empty role means "user".
    async fn enroll(
        &self,
        image: Vec<u8>,
        user_id: &str,
        name: &str,
        role: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(user_id, name, role, bytes = image.len(), "enroll requested");
        enroll_json(&self.engine, image, user_id, name, role).await
    }

    /// Enrolled identities without embeddings.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        identities_json(&self.engine).await
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        status_json(&self.engine).await
    }
}

async fn authenticate_json<L, E>(
    engine: &EngineHandle<L, E>,
    image: Vec<u8>,
) -> zbus::fdo::Result<String>
where
    L: FaceLocator + 'static,
    E: EmbeddingExtractor + 'static,
{
    let result = engine.authenticate(image).await.map_err(to_fdo)?;
    to_json(&result)
}

async fn enroll_json<L, E>(
    engine: &EngineHandle<L, E>,
    image: Vec<u8>,
    user_id: &str,
    name: &str,
    role: &str,
) -> zbus::fdo::Result<String>
where
    L: FaceLocator + 'static,
    E: EmbeddingExtractor + 'static,
{
    let result = engine
        .enroll(image, user_id.to_string(), name.to_string(), role.to_string())
        .await
        .map_err(to_fdo)?;
    to_json(&result)
}

async fn identities_json<L, E>(engine: &EngineHandle<L, E>) -> zbus::fdo::Result<String>
where
    L: FaceLocator + 'static,
    E: EmbeddingExtractor + 'static,
{
    let identities = engine.identities().await.map_err(to_fdo)?;
    to_json(&identities)
}

async fn status_json<L, E>(engine: &EngineHandle<L, E>) -> zbus::fdo::Result<String>
where
    L: FaceLocator + 'static,
    E: EmbeddingExtractor + 'static,
{
    let status = engine.status().await.map_err(to_fdo)?;
    to_json(&serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "enrolled": status.enrolled,
        "dimension": status.dimension,
        "threshold": status.threshold,
        "model_version": status.model_version,
        "store_path": status.store_path,
    }))
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(format!("serialize: {e}")))
}

fn to_fdo(err: HandleError) -> zbus::fdo::Error {
    tracing::error!(error = %err, "engine call failed");
    zbus::fdo::Error::Failed(err.to_string())
}
