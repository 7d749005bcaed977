//! Recognition engine: locate → crop/normalize → extract → match → decide.

use std::sync::RwLock;

use chrono::Utc;
use image::RgbImage;

use crate::capability::{EmbeddingExtractor, FaceLocator};
use crate::error::{DimensionMismatch, EngineError};
use crate::matcher::{CosineMatcher, Matcher};
use crate::preprocess::{crop_and_normalize, decode_image, select_largest};
use crate::report::{EngineStatus, IdentitySummary};
use crate::store::IdentityStore;
use crate::types::{BoundingBox, Embedding, EnrollmentRecord, DEFAULT_ROLE};

/// Authoritative default for [`DecisionThreshold`].
pub const DEFAULT_DECISION_THRESHOLD: f32 = 0.65;

/// Minimum cosine similarity for accepting a match, validated to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionThreshold(f32);

impl DecisionThreshold {
    pub fn new(value: f32) -> Result<Self, EngineError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(EngineError::InvalidThreshold(value))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for DecisionThreshold {
    fn default() -> Self {
        Self(DEFAULT_DECISION_THRESHOLD)
    }
}

/// Non-error outcome of [`RecognitionEngine::authenticate`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Authenticated {
        user_id: String,
        name: String,
        role: String,
        confidence: f32,
    },
    /// Best candidate scored below the threshold.
    Rejected {
        confidence: f32,
        nearest_user_id: Option<String>,
    },
    NoFaceDetected,
    NoEnrolledUsers,
}

impl AuthOutcome {
    /// Similarity behind the decision, when a comparison took place.
    pub fn confidence(&self) -> Option<f32> {
        match self {
            AuthOutcome::Authenticated { confidence, .. }
            | AuthOutcome::Rejected { confidence, .. } => Some(*confidence),
            AuthOutcome::NoFaceDetected | AuthOutcome::NoEnrolledUsers => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }
}

/// Non-error outcome of [`RecognitionEngine::enroll`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Enrolled(EnrollmentRecord),
    NoFaceDetected,
}

/// Owns one [`IdentityStore`] and the two capabilities it matches against.
///
/// Safe to share across threads: authentications read the store under a
/// shared lock, enrollments hold the exclusive lock across the duplicate
/// check, insert and persist.
pub struct RecognitionEngine<L, E> {
    locator: L,
    extractor: E,
    matcher: CosineMatcher,
    store: RwLock<IdentityStore>,
    threshold: DecisionThreshold,
}

impl<L: FaceLocator, E: EmbeddingExtractor> RecognitionEngine<L, E> {
    /// Fails if the store already holds embeddings of a different width than
    /// the extractor produces.
    pub fn new(
        locator: L,
        extractor: E,
        store: IdentityStore,
        threshold: DecisionThreshold,
    ) -> Result<Self, EngineError> {
        if let Some(stored) = store.dimension() {
            let produced = extractor.dimension();
            if stored != produced {
                let err = EngineError::DimensionMismatch(DimensionMismatch {
                    expected: stored,
                    actual: produced,
                });
                err.log("startup");
                return Err(err);
            }
        }

        tracing::info!(
            store = %store.path().display(),
            enrolled = store.len(),
            model = extractor.model_version(),
            dimension = extractor.dimension(),
            threshold = threshold.value(),
            "recognition engine ready"
        );

        Ok(Self {
            locator,
            extractor,
            matcher: CosineMatcher,
            store: RwLock::new(store),
            threshold,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold.value()
    }

    /// Decide whether the largest face in `image` belongs to an enrolled identity.
    pub fn authenticate(&self, image: &[u8]) -> Result<AuthOutcome, EngineError> {
        let result = self.run_authenticate(image);
        if let Err(err) = &result {
            err.log("authenticate");
        }
        result
    }

    /// Enroll the single face in `image` under `user_id`. Never overwrites.
    ///
    /// An empty or missing `role` falls back to `"user"`.
    pub fn enroll(
        &self,
        image: &[u8],
        user_id: &str,
        name: &str,
        role: Option<&str>,
    ) -> Result<EnrollOutcome, EngineError> {
        let result = self.run_enroll(image, user_id, name, role);
        if let Err(err) = &result {
            err.log("enroll");
        }
        result
    }

    /// Enrolled identities without their embeddings, ordered by `user_id`.
    pub fn identities(&self) -> Result<Vec<IdentitySummary>, EngineError> {
        let store = self.store.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(store.get_all().values().map(IdentitySummary::from).collect())
    }

    pub fn status(&self) -> Result<EngineStatus, EngineError> {
        let store = self.store.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(EngineStatus {
            enrolled: store.len(),
            dimension: self.extractor.dimension(),
            threshold: self.threshold.value(),
            model_version: self.extractor.model_version().to_string(),
            store_path: store.path().display().to_string(),
        })
    }

    fn run_authenticate(&self, payload: &[u8]) -> Result<AuthOutcome, EngineError> {
        let image = decode_image(payload)?;
        let faces = self.locate(&image)?;

        let Some(face) = select_largest(&faces) else {
            tracing::debug!("authenticate: no face detected");
            return Ok(AuthOutcome::NoFaceDetected);
        };
        tracing::debug!(faces = faces.len(), area = face.area(), "authenticate: face selected");

        let probe = self.extract(&image, face)?;

        let store = self.store.read().map_err(|_| EngineError::LockPoisoned)?;
        if store.is_empty() {
            tracing::info!("authenticate: no enrolled users");
            return Ok(AuthOutcome::NoEnrolledUsers);
        }

        let best = self.matcher.best_match(&probe, store.get_all().values())?;
        let threshold = self.threshold.value();

        match best.candidate {
            Some(record) if best.meets(threshold) => {
                tracing::info!(
                    user_id = %record.user_id,
                    confidence = best.score,
                    threshold,
                    "authenticated"
                );
                Ok(AuthOutcome::Authenticated {
                    user_id: record.user_id.clone(),
                    name: record.name.clone(),
                    role: record.role.clone(),
                    confidence: best.score,
                })
            }
            candidate => {
                tracing::info!(
                    nearest = ?candidate.map(|r| r.user_id.as_str()),
                    confidence = best.score,
                    threshold,
                    "authentication rejected"
                );
                Ok(AuthOutcome::Rejected {
                    confidence: best.score,
                    nearest_user_id: candidate.map(|r| r.user_id.clone()),
                })
            }
        }
    }

    fn run_enroll(
        &self,
        payload: &[u8],
        user_id: &str,
        name: &str,
        role: Option<&str>,
    ) -> Result<EnrollOutcome, EngineError> {
        let user_id = user_id.trim();
        let name = name.trim();
        if user_id.is_empty() {
            return Err(EngineError::EmptyUserId);
        }
        if name.is_empty() {
            return Err(EngineError::EmptyName);
        }
        let role = role
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_ROLE);

        let image = decode_image(payload)?;
        let faces = self.locate(&image)?;
        let face = match faces.as_slice() {
            [] => {
                tracing::debug!(user_id, "enroll: no face detected");
                return Ok(EnrollOutcome::NoFaceDetected);
            }
            [face] => face,
            many => {
                return Err(EngineError::MultipleFacesDetected { count: many.len() });
            }
        };

        let embedding = self.extract(&image, face)?;
        let record = EnrollmentRecord {
            user_id: user_id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            embedding,
            enrolled_at: Utc::now(),
        };

        let mut store = self.store.write().map_err(|_| EngineError::LockPoisoned)?;
        store.insert(record.clone())?;
        drop(store);

        tracing::info!(
            user_id = %record.user_id,
            role = %record.role,
            dimension = record.embedding.dimension(),
            "enrolled new identity"
        );
        Ok(EnrollOutcome::Enrolled(record))
    }

    fn locate(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, EngineError> {
        self.locator.locate(image).map_err(EngineError::Locator)
    }

    fn extract(&self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, EngineError> {
        let crop = crop_and_normalize(image, face, self.extractor.input_spec())?;
        let embedding = self.extractor.embed(&crop).map_err(EngineError::Extractor)?;

        let expected = self.extractor.dimension();
        if embedding.dimension() != expected {
            return Err(DimensionMismatch {
                expected,
                actual: embedding.dimension(),
            }
            .into());
        }
        if expected == 0 {
            return Err(EngineError::InvalidEmbedding("zero-length embedding".into()));
        }
        if !embedding.is_finite() {
            return Err(EngineError::InvalidEmbedding(
                "embedding contains non-finite values".into(),
            ));
        }
        // A zero vector scores 0.0 against everything and could never match.
        if embedding.norm() == 0.0 {
            return Err(EngineError::InvalidEmbedding("zero-norm embedding".into()));
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::InputSpec;
    use crate::error::{CapabilityError, ErrorKind};
    use crate::preprocess::NormalizedCrop;
    use image::{DynamicImage, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

    /// Returns whatever boxes the test scripts, counting calls.
    #[derive(Default)]
    struct ScriptedLocator {
        boxes: Mutex<Vec<BoundingBox>>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedLocator {
        fn returning(boxes: Vec<BoundingBox>) -> Self {
            Self {
                boxes: Mutex::new(boxes),
                ..Default::default()
            }
        }

        fn set(&self, boxes: Vec<BoundingBox>) {
            *self.boxes.lock().unwrap() = boxes;
        }
    }

    impl FaceLocator for ScriptedLocator {
        fn locate(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("detector session unavailable".into());
            }
            Ok(self.boxes.lock().unwrap().clone())
        }
    }

    /// Embeds a crop as its mean value per channel, so embeddings follow the
    /// colour of the selected region.
    struct MeanColorExtractor {
        calls: AtomicUsize,
        dimension: usize,
        poison: bool,
    }

    impl Default for MeanColorExtractor {
        fn default() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                dimension: 3,
                poison: false,
            }
        }
    }

    impl EmbeddingExtractor for MeanColorExtractor {
        fn input_spec(&self) -> InputSpec {
            InputSpec::UNIT_64
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_version(&self) -> &str {
            "mean-color"
        }

        fn embed(&self, crop: &NormalizedCrop) -> Result<Embedding, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.poison {
                return Ok(Embedding::new(vec![f32::NAN; 3]));
            }
            let plane = (crop.size * crop.size) as usize;
            let values = crop
                .data
                .chunks(plane)
                .map(|channel| channel.iter().sum::<f32>() / plane as f32)
                .collect();
            Ok(Embedding::new(values))
        }
    }

    type TestEngine = RecognitionEngine<ScriptedLocator, MeanColorExtractor>;

    fn face() -> BoundingBox {
        BoundingBox::new(8.0, 8.0, 32.0, 32.0)
    }

    fn solid_png(color: Rgb<u8>) -> Vec<u8> {
        png(RgbImage::from_pixel(64, 64, color))
    }

    fn png(image: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn engine_in(dir: &TempDir, threshold: f32) -> TestEngine {
        let store = IdentityStore::load(dir.path().join("identities.db")).unwrap();
        RecognitionEngine::new(
            ScriptedLocator::returning(vec![face()]),
            MeanColorExtractor::default(),
            store,
            DecisionThreshold::new(threshold).unwrap(),
        )
        .unwrap()
    }

    fn enrolled(outcome: Result<EnrollOutcome, EngineError>) -> EnrollmentRecord {
        match outcome {
            Ok(EnrollOutcome::Enrolled(record)) => record,
            other => panic!("expected enrollment, got {other:?}"),
        }
    }

    #[test]
    fn threshold_must_be_in_unit_interval() {
        assert!(DecisionThreshold::new(0.0).is_ok());
        assert!(DecisionThreshold::new(1.0).is_ok());
        assert!(matches!(
            DecisionThreshold::new(1.2),
            Err(EngineError::InvalidThreshold(_))
        ));
        assert!(DecisionThreshold::new(f32::NAN).is_err());
        assert_eq!(DecisionThreshold::default().value(), DEFAULT_DECISION_THRESHOLD);
    }

    #[test]
    fn authenticate_without_face_never_extracts() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        engine.locator.set(vec![]);

        let outcome = engine.authenticate(&solid_png(RED)).unwrap();
        assert_eq!(outcome, AuthOutcome::NoFaceDetected);
        assert_eq!(outcome.confidence(), None);
        assert_eq!(engine.locator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn authenticate_with_empty_store() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);

        let outcome = engine.authenticate(&solid_png(RED)).unwrap();
        assert_eq!(outcome, AuthOutcome::NoEnrolledUsers);
        assert_eq!(engine.extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identical_probe_accepted_even_at_threshold_one() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, 1.0);
        enrolled(engine.enroll(&solid_png(RED), "u1", "Alice", None));

        match engine.authenticate(&solid_png(RED)).unwrap() {
            AuthOutcome::Authenticated {
                user_id,
                name,
                role,
                confidence,
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(name, "Alice");
                assert_eq!(role, DEFAULT_ROLE);
                assert!((confidence - 1.0).abs() < 1e-6);
            }
            other => panic!("expected authentication, got {other:?}"),
        }
    }

    #[test]
    fn orthogonal_probe_rejected_with_confidence() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        enrolled(engine.enroll(&solid_png(RED), "u1", "Alice", Some("admin")));

        let outcome = engine.authenticate(&solid_png(GREEN)).unwrap();
        match outcome {
            AuthOutcome::Rejected {
                confidence,
                nearest_user_id,
            } => {
                assert!(confidence.abs() < 1e-6);
                assert_eq!(nearest_user_id.as_deref(), Some("u1"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn authenticate_uses_largest_face() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        enrolled(engine.enroll(&solid_png(RED), "red", "Red", None));
        enrolled(engine.enroll(&solid_png(GREEN), "green", "Green", None));

        // Left half red, right half green.
        let scene = RgbImage::from_fn(100, 50, |x, _| if x < 50 { RED } else { GREEN });
        engine.locator.set(vec![
            BoundingBox::new(10.0, 10.0, 10.0, 10.0),
            BoundingBox::new(55.0, 5.0, 40.0, 40.0),
        ]);

        let outcome = engine.authenticate(&png(scene)).unwrap();
        assert!(
            matches!(outcome, AuthOutcome::Authenticated { ref user_id, .. } if user_id == "green"),
            "got {outcome:?}"
        );
    }

    #[test]
    fn enroll_rejects_multiple_faces_without_touching_store() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("identities.db");
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        engine.locator.set(vec![
            face(),
            BoundingBox::new(40.0, 40.0, 20.0, 20.0),
        ]);

        let err = engine
            .enroll(&solid_png(RED), "u1", "Alice", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::MultipleFacesDetected { count: 2 }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(engine.extractor.calls.load(Ordering::SeqCst), 0);
        drop(engine);

        assert!(IdentityStore::load(&path).unwrap().is_empty());
    }

    #[test]
    fn enroll_without_face_is_an_outcome() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        engine.locator.set(vec![]);

        let outcome = engine.enroll(&solid_png(RED), "u1", "Alice", None).unwrap();
        assert_eq!(outcome, EnrollOutcome::NoFaceDetected);
    }

    #[test]
    fn enroll_validates_identity_fields_first() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);

        let err = engine.enroll(&solid_png(RED), "  ", "Alice", None).unwrap_err();
        assert!(matches!(err, EngineError::EmptyUserId));
        let err = engine.enroll(&solid_png(RED), "u1", "", None).unwrap_err();
        assert!(matches!(err, EngineError::EmptyName));
        assert_eq!(engine.locator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_enroll_keeps_first_record() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        let first = enrolled(engine.enroll(&solid_png(RED), "u1", "Alice", None));

        let err = engine
            .enroll(&solid_png(GREEN), "u1", "Mallory", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateIdentity(ref id) if id == "u1"));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let ids = engine.identities().unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].name, "Alice");
        assert_eq!(ids[0].enrolled_at, first.enrolled_at);
    }

    #[test]
    fn enrollment_survives_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("identities.db");
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        enrolled(engine.enroll(&solid_png(RED), "u1", "Alice", None));
        drop(engine);

        let store = IdentityStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("u1").unwrap().name, "Alice");
    }

    #[test]
    fn extractor_dimension_must_match_store() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        enrolled(engine.enroll(&solid_png(RED), "u1", "Alice", None));
        drop(engine);

        let store = IdentityStore::load(tmp.path().join("identities.db")).unwrap();
        let extractor = MeanColorExtractor {
            dimension: 4,
            ..Default::default()
        };
        let err = RecognitionEngine::new(
            ScriptedLocator::default(),
            extractor,
            store,
            DecisionThreshold::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            EngineError::DimensionMismatch(DimensionMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }

    #[test]
    fn extractor_output_is_validated() {
        let tmp = TempDir::new().unwrap();
        let store = IdentityStore::load(tmp.path().join("identities.db")).unwrap();
        let engine = RecognitionEngine::new(
            ScriptedLocator::returning(vec![face()]),
            MeanColorExtractor {
                poison: true,
                ..Default::default()
            },
            store,
            DecisionThreshold::default(),
        )
        .unwrap();

        let err = engine.authenticate(&solid_png(RED)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEmbedding(_)));
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn zero_norm_embedding_is_never_enrolled() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, 0.65);

        // A black crop embeds to the zero vector under the mean-colour extractor.
        let err = engine
            .enroll(&solid_png(Rgb([0, 0, 0])), "u1", "Alice", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidEmbedding(_)));
        assert_eq!(engine.status().unwrap().enrolled, 0);
    }

    #[test]
    fn locator_failure_is_infrastructure() {
        let tmp = TempDir::new().unwrap();
        let store = IdentityStore::load(tmp.path().join("identities.db")).unwrap();
        let engine = RecognitionEngine::new(
            ScriptedLocator {
                fail: true,
                ..Default::default()
            },
            MeanColorExtractor::default(),
            store,
            DecisionThreshold::default(),
        )
        .unwrap();

        let err = engine.authenticate(&solid_png(RED)).unwrap_err();
        assert!(matches!(err, EngineError::Locator(_)));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn undecodable_image_is_validation_error() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        let err = engine.authenticate(b"not an image").unwrap_err();
        assert!(matches!(err, EngineError::InvalidImage(_)));
        assert_eq!(engine.locator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_distinct_enrollments_all_persist() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        let image = solid_png(RED);

        std::thread::scope(|s| {
            for i in 0..8 {
                let engine = &engine;
                let image = &image;
                s.spawn(move || {
                    enrolled(engine.enroll(image, &format!("u{i}"), "User", None));
                });
            }
        });
        drop(engine);

        let store = IdentityStore::load(tmp.path().join("identities.db")).unwrap();
        assert_eq!(store.len(), 8);
        assert!((0..8).all(|i| store.contains(&format!("u{i}"))));
    }

    #[test]
    fn concurrent_same_id_enrollments_have_one_winner() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_in(&tmp, DEFAULT_DECISION_THRESHOLD);
        let image = solid_png(RED);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| engine.enroll(&image, "shared", "Shared", None)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let wins = results
            .iter()
            .filter(|r| matches!(r, Ok(EnrollOutcome::Enrolled(_))))
            .count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::DuplicateIdentity(_))))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 3);
        assert_eq!(engine.identities().unwrap().len(), 1);
    }
}
