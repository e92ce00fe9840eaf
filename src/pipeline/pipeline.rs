use std::sync::Arc;
use image::RgbImage;
use log::{error, info, warn};
use crate::config::settings::Settings;
use crate::error::errors::{EnrollError, PipelineError, StoreError, VerifyError};
use crate::helper::face_helper::{AlignedFace, FaceHelper};
use crate::modules::face_anti_spoofing::{FaceAntiSpoofing, LivenessReport};
use crate::modules::face_detection_client::{FaceDetectionClient, FaceDetectionModel};
use crate::modules::face_id_client::{Embedding, EmbeddingModel, FaceIDClient};
use crate::modules::face_landmark_client::{FaceLandmarkClient, LandmarkModel};
use crate::modules::face_matcher::{FaceMatcher, Verification};
use crate::store::enrollment_store::EnrollmentStore;
use crate::utils::coordinate::Detection;
use crate::utils::image::decode_image;

/// Everything the pipeline learned about the face in one image.
#[derive(Debug, Clone)]
pub struct FaceCapture {
    pub detection: Detection,
    pub report: LivenessReport,
    pub aligned: AlignedFace,
    pub embedding: Embedding,
}

/// Detect, liveness, align and embed stages over injected models.
#[derive(Clone)]
pub struct FacePipeline {
    face_detection: FaceDetectionClient,
    face_landmark: FaceLandmarkClient,
    face_helper: FaceHelper,
    fas: FaceAntiSpoofing,
    face_id: FaceIDClient,
}

impl FacePipeline {

    /// new initializes new instance of the pipeline
    pub fn new(
        face_detection_client: FaceDetectionClient,
        face_landmark_client: FaceLandmarkClient,
        face_helper: FaceHelper,
        face_anti_spoofing: FaceAntiSpoofing,
        face_id_client: FaceIDClient,
    ) -> Self {
        FacePipeline {
            face_detection: face_detection_client,
            face_landmark: face_landmark_client,
            face_helper,
            fas: face_anti_spoofing,
            face_id: face_id_client,
        }
    }

    /// from_models wires the model handles with the stage settings.
    pub fn from_models(
        detector: Arc<dyn FaceDetectionModel>,
        landmarks: Arc<dyn LandmarkModel>,
        embedder: Arc<dyn EmbeddingModel>,
        settings: &Settings,
    ) -> Self {
        FacePipeline::new(
            FaceDetectionClient::new(detector, settings.face_detection.clone()),
            FaceLandmarkClient::new(landmarks, settings.landmark.clone()),
            FaceHelper::new(),
            FaceAntiSpoofing::new(settings.liveness.clone()),
            FaceIDClient::new(embedder, settings.face_id.clone()),
        )
    }

    /// capture runs `run_stages` on tokio's blocking pool so that callers can
    /// time it out or drop it without stalling the runtime.
    ///
    /// # Arguments
    /// * `img` - RGB image
    ///
    /// # Returns
    /// * `Result<FaceCapture, PipelineError>`
    pub async fn capture(&self, img: &RgbImage) -> Result<FaceCapture, PipelineError> {
        let pipeline = self.clone();
        let img = img.clone();
        match tokio::task::spawn_blocking(move || pipeline.run_stages(&img)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                // the runtime is shutting down, fail at the first gate
                error!("face pipeline task was cancelled: {}", e);
                Err(PipelineError::NoFaceDetected)
            }
        }
    }

    /// run_stages runs every stage on an image and stops at the first gate
    /// that fails.
    ///
    /// Stage errors are logged and folded into the gate they belong to. A
    /// landmark failure fails the liveness gate since none of its checks can
    /// run without landmarks.
    ///
    /// # Arguments
    /// * `img` - RGB image
    ///
    /// # Returns
    /// * `Result<FaceCapture, PipelineError>`
    pub fn run_stages(&self, img: &RgbImage) -> Result<FaceCapture, PipelineError> {
        let detection = match self.face_detection.locate(img) {
            Ok(Some(detection)) => detection,
            Ok(None) => {
                warn!("no face detected in {}x{} image", img.width(), img.height());
                return Err(PipelineError::NoFaceDetected)
            }
            Err(e) => {
                error!("face detection failed: {}", e);
                return Err(PipelineError::NoFaceDetected)
            }
        };
        let face = self.face_helper.crop_face(img, &detection);

        let landmarks = self.face_landmark.extract(&face).map_err(|e| {
            error!("landmark extraction failed: {}", e);
            PipelineError::LivenessFailed
        })?;

        let report = self.fas.evaluate(&face, &landmarks).map_err(|e| {
            error!("error in liveness detection: {}", e);
            PipelineError::LivenessFailed
        })?;
        if !self.fas.is_live(&report) {
            return Err(PipelineError::LivenessFailed)
        }

        let aligned = self.face_helper.align(&face, &landmarks).map_err(|e| {
            error!("face alignment failed: {}", e);
            PipelineError::AlignmentFailed
        })?;

        let embedding = match self.face_id.embed(&aligned) {
            Ok(Some(embedding)) => embedding,
            Ok(None) => return Err(PipelineError::EmbeddingFailed),
            Err(e) => {
                error!("embedding extraction failed: {}", e);
                return Err(PipelineError::EmbeddingFailed)
            }
        };

        Ok(FaceCapture {
            detection,
            report,
            aligned,
            embedding,
        })
    }
}

/// Enrollment and verification of identities on top of the face pipeline.
#[derive(Clone)]
pub struct FaceVerifier {
    pipeline: FacePipeline,
    store: Arc<EnrollmentStore>,
    matcher: FaceMatcher,
}

impl FaceVerifier {
    pub fn new(pipeline: FacePipeline, store: Arc<EnrollmentStore>, matcher: FaceMatcher) -> Self {
        FaceVerifier {
            pipeline,
            store,
            matcher,
        }
    }

    /// from_settings builds the pipeline and opens the durable store described
    /// by `settings`.
    pub fn from_settings(
        detector: Arc<dyn FaceDetectionModel>,
        landmarks: Arc<dyn LandmarkModel>,
        embedder: Arc<dyn EmbeddingModel>,
        settings: &Settings,
    ) -> Result<Self, StoreError> {
        let pipeline = FacePipeline::from_models(detector, landmarks, embedder, settings);
        let store = EnrollmentStore::open(&settings.store)?;
        let matcher = FaceMatcher::new(settings.face_id.threshold_same_person);
        Ok(FaceVerifier::new(pipeline, Arc::new(store), matcher))
    }

    pub fn store(&self) -> &Arc<EnrollmentStore> {
        &self.store
    }

    /// enroll registers the face in `img` under `identity`, replacing any
    /// previous enrollment. The store is left untouched on failure.
    ///
    /// # Arguments
    /// * `identity` - case sensitive name
    /// * `img` - RGB image
    ///
    /// # Returns
    /// * `Result<(), EnrollError>`
    pub async fn enroll(&self, identity: &str, img: &RgbImage) -> Result<(), EnrollError> {
        let capture = self.pipeline.capture(img).await.map_err(|e| {
            warn!("enrollment of '{}' rejected: {}", identity, e);
            EnrollError::from(e)
        })?;
        self.store.commit(identity, capture.aligned.image(), &capture.embedding).await?;
        Ok(())
    }

    /// enroll_bytes decodes an encoded image and enrolls it.
    pub async fn enroll_bytes(&self, identity: &str, im_bytes: &[u8]) -> Result<(), EnrollError> {
        let img = decode_image(im_bytes).map_err(EnrollError::InvalidImage)?;
        self.enroll(identity, &img).await
    }

    /// verify tells whether the live face in `img` belongs to `identity`.
    ///
    /// `Ok(false)` is a completed comparison that did not match, pipeline
    /// failures are returned as errors.
    ///
    /// # Arguments
    /// * `identity` - case sensitive name
    /// * `img` - RGB image
    ///
    /// # Returns
    /// * `Result<bool, VerifyError>`
    pub async fn verify(&self, identity: &str, img: &RgbImage) -> Result<bool, VerifyError> {
        Ok(self.verify_with_score(identity, img).await?.matched)
    }

    /// verify_with_score is `verify` that also reports the similarity.
    pub async fn verify_with_score(&self, identity: &str, img: &RgbImage) -> Result<Verification, VerifyError> {
        if !self.store.contains(identity)? {
            warn!("verification requested for unknown identity '{}'", identity);
            return Err(VerifyError::UnknownIdentity(identity.to_string()))
        }

        let capture = self.pipeline.capture(img).await.map_err(|e| {
            warn!("verification of '{}' rejected: {}", identity, e);
            VerifyError::from(e)
        })?;

        let record = match self.store.load(identity).await? {
            None => return Err(VerifyError::UnknownIdentity(identity.to_string())),
            Some(record) => record,
        };

        let verification = self.matcher.compare(&capture.embedding, &record.embedding);
        info!(
            "verification of '{}': similarity {:.4}, threshold {:.2}, matched {}",
            identity, verification.similarity, self.matcher.threshold(), verification.matched
        );
        Ok(verification)
    }

    /// verify_bytes decodes an encoded image and verifies it.
    pub async fn verify_bytes(&self, identity: &str, im_bytes: &[u8]) -> Result<bool, VerifyError> {
        let img = decode_image(im_bytes).map_err(VerifyError::InvalidImage)?;
        self.verify(identity, &img).await
    }

    /// authorize_payment approves a payment for `identity` when the face in
    /// `img` verifies as that identity.
    pub async fn authorize_payment(&self, identity: &str, img: &RgbImage) -> Result<bool, VerifyError> {
        let authorized = self.verify(identity, img).await?;
        if authorized {
            info!("payment authorized for '{}'", identity);
        } else {
            warn!("payment denied for '{}': face does not match", identity);
        }
        Ok(authorized)
    }

    /// identities lists the enrolled names in sorted order.
    pub fn identities(&self) -> Result<Vec<String>, StoreError> {
        self.store.identities()
    }
}
