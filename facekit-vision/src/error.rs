use thiserror::Error;

use crate::environment::Backend;

pub type FaceResult<T> = std::result::Result<T, FaceError>;

#[derive(Debug, Error)]
pub enum FaceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("face api has been disposed")]
    ResourceDisposed,

    #[error("failed to initialize {model} model")]
    ModelInitializationFailed {
        model: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("face detection failed")]
    DetectionFailed(#[source] anyhow::Error),

    #[error("{backend} backend unavailable")]
    BackendUnavailable {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },

    #[error("{0} requires an environment with image graphics support")]
    EnvironmentUnsupported(&'static str),
}

impl FaceError {
    /// Keep typed errors as they are, wrap anything else as a detection failure.
    pub fn wrap(err: anyhow::Error) -> Self {
        match err.downcast::<FaceError>() {
            Ok(typed) => typed,
            Err(other) => FaceError::DetectionFailed(other),
        }
    }
}
