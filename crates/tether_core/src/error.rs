use crate::runtime::{ForeignError, ObjectId};
use crate::value::ConversionError;
use thiserror::Error;

/// Errors surfaced to callers of the registry and proxy API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    #[error("cannot pin the foreign null value")]
    InvalidForeignValue,

    #[error("foreign runtime is not initialized")]
    ForeignRuntimeNotInitialized,

    #[error("cannot resolve {path}: {source}")]
    PathResolution {
        path: String,
        #[source]
        source: ForeignError,
    },

    #[error(transparent)]
    TypeConversion(#[from] ConversionError),

    #[error("cannot write through {path}: {type_name} is immutable")]
    ImmutableValue { path: String, type_name: String },

    #[error("foreign value {id} is no longer registered")]
    Released { id: ObjectId },

    #[error("foreign runtime is already bound to a live root registry")]
    RuntimeAlreadyBound,

    #[error("values belong to different foreign runtimes")]
    DifferentRuntime,

    #[error("foreign runtime error: {0}")]
    Foreign(ForeignError),
}

impl ProxyError {
    /// Classify a runtime failure that is not tied to a particular path.
    pub(crate) fn from_foreign(err: ForeignError) -> Self {
        match err {
            ForeignError::NotInitialized => ProxyError::ForeignRuntimeNotInitialized,
            ForeignError::HooksInstalled => ProxyError::RuntimeAlreadyBound,
            ForeignError::TypeMismatch { expected, found } => {
                ProxyError::TypeConversion(ConversionError { expected, found })
            }
            ForeignError::RecursionLimit { limit } => ProxyError::TypeConversion(ConversionError {
                expected: format!("value nested at most {limit} deep"),
                found: "deeper value".to_string(),
            }),
            other => ProxyError::Foreign(other),
        }
    }

    /// Classify a failure while reading or writing `path`.
    pub(crate) fn at_path(path: String, err: ForeignError) -> Self {
        match err {
            ForeignError::NoSuchField { .. }
            | ForeignError::UndefinedBinding { .. }
            | ForeignError::IndexOutOfBounds { .. }
            | ForeignError::NotAddressable { .. } => ProxyError::PathResolution { path, source: err },
            ForeignError::Immutable { type_name } => ProxyError::ImmutableValue { path, type_name },
            other => ProxyError::from_foreign(other),
        }
    }

    pub fn is_path_resolution(&self) -> bool {
        matches!(self, ProxyError::PathResolution { .. })
    }
}
