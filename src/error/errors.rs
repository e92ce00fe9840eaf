use std::path::PathBuf;

/// Failures of the landmark stage.
#[derive(thiserror::Error, Debug)]
pub enum LandmarkError {
    #[error("face crop {width}x{height} is smaller than the minimum side of {min_side}px")]
    CropTooSmall { width: u32, height: u32, min_side: u32 },

    #[error("expected {expected} landmarks, found {found}")]
    WrongPointCount { expected: usize, found: usize },

    #[error("landmark {index} has a non-finite coordinate")]
    NonFinite { index: usize },

    #[error("landmark model failed: {0}")]
    Model(#[source] anyhow::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LivenessError {
    #[error("face crop is empty")]
    EmptyFace,

    #[error("eye landmarks have zero horizontal width")]
    DegenerateEye,

    #[error("{0} score is not finite")]
    NonFinite(&'static str),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error("face crop is empty")]
    EmptyFace,

    #[error("eye line angle is not finite")]
    NonFiniteAngle,
}

/// Gate failures of the detect, liveness, align and embed pipeline.
///
/// Every internal stage error is folded into one of these, so callers only see
/// the outcome they can act on.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no face detected")]
    NoFaceDetected,

    #[error("liveness check failed")]
    LivenessFailed,

    #[error("face alignment failed")]
    AlignmentFailed,

    #[error("embedding extraction failed")]
    EmbeddingFailed,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record for '{identity}' is corrupt: {message}")]
    Corrupt { identity: String, message: String },

    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to encode face image: {0}")]
    Image(#[from] image::ImageError),

    #[error("storage task was cancelled: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EnrollError {
    #[error("invalid image: {0}")]
    InvalidImage(#[source] image::ImageError),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("liveness check failed")]
    LivenessFailed,

    #[error("face alignment failed")]
    AlignmentFailed,

    #[error("embedding extraction failed")]
    EmbeddingFailed,

    #[error("storage error: {0}")]
    StorageError(#[from] StoreError),
}

impl From<PipelineError> for EnrollError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoFaceDetected => EnrollError::NoFaceDetected,
            PipelineError::LivenessFailed => EnrollError::LivenessFailed,
            PipelineError::AlignmentFailed => EnrollError::AlignmentFailed,
            PipelineError::EmbeddingFailed => EnrollError::EmbeddingFailed,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("invalid image: {0}")]
    InvalidImage(#[source] image::ImageError),

    #[error("identity '{0}' is not enrolled")]
    UnknownIdentity(String),

    #[error("no face detected")]
    NoFaceDetected,

    #[error("liveness check failed")]
    LivenessFailed,

    #[error("face alignment failed")]
    AlignmentFailed,

    #[error("embedding extraction failed")]
    EmbeddingFailed,

    #[error("storage error: {0}")]
    StorageError(#[from] StoreError),
}

impl From<PipelineError> for VerifyError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoFaceDetected => VerifyError::NoFaceDetected,
            PipelineError::LivenessFailed => VerifyError::LivenessFailed,
            PipelineError::AlignmentFailed => VerifyError::AlignmentFailed,
            PipelineError::EmbeddingFailed => VerifyError::EmbeddingFailed,
        }
    }
}
