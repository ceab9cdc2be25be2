use thiserror::Error;

use crate::bolt11::DecodeError;

pub type Result<T> = std::result::Result<T, LnClientError>;

/// Every error names the capability it came from so callers can log it without
/// re-deriving context. Nothing in this crate retries on any of these.
#[derive(Error, Debug)]
pub enum LnClientError {
    /// Malformed input rejected before any backend call was made.
    #[error("{operation}: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },
    /// The backend could not be reached or the call did not complete.
    #[error("{operation}: transport failure{}: {source}", for_hash(.payment_hash))]
    Transport {
        operation: &'static str,
        payment_hash: Option<String>,
        #[source]
        source: anyhow::Error,
    },
    /// The backend answered but refused or failed the request.
    #[error("{operation}: rejected by backend{}: {message}", for_hash(.payment_hash))]
    BackendRejection {
        operation: &'static str,
        payment_hash: Option<String>,
        message: String,
    },
    #[error("{operation} is not supported by the {backend} backend")]
    UnsupportedOperation {
        operation: &'static str,
        backend: &'static str,
    },
    #[error("{operation}: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: DecodeError,
    },
}

fn for_hash(payment_hash: &Option<String>) -> String {
    payment_hash
        .as_ref()
        .map(|h| format!(" (payment hash {h})"))
        .unwrap_or_default()
}

impl LnClientError {
    pub fn validation(operation: &'static str, message: impl Into<String>) -> Self {
        LnClientError::Validation {
            operation,
            message: message.into(),
        }
    }

    pub fn transport(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        LnClientError::Transport {
            operation,
            payment_hash: None,
            source: source.into(),
        }
    }

    pub fn rejected(operation: &'static str, message: impl Into<String>) -> Self {
        LnClientError::BackendRejection {
            operation,
            payment_hash: None,
            message: message.into(),
        }
    }

    pub fn unsupported(operation: &'static str, backend: &'static str) -> Self {
        LnClientError::UnsupportedOperation { operation, backend }
    }

    pub fn decode(operation: &'static str, source: DecodeError) -> Self {
        LnClientError::Decode { operation, source }
    }

    /// Attach the payment hash the failed call was about.
    pub fn with_payment_hash(mut self, hash: impl Into<String>) -> Self {
        match &mut self {
            LnClientError::Transport { payment_hash, .. }
            | LnClientError::BackendRejection { payment_hash, .. } => {
                *payment_hash = Some(hash.into())
            }
            _ => (),
        }
        self
    }

    pub fn operation(&self) -> &'static str {
        match self {
            LnClientError::Validation { operation, .. }
            | LnClientError::Transport { operation, .. }
            | LnClientError::BackendRejection { operation, .. }
            | LnClientError::UnsupportedOperation { operation, .. }
            | LnClientError::Decode { operation, .. } => operation,
        }
    }

    pub fn payment_hash(&self) -> Option<&str> {
        match self {
            LnClientError::Transport { payment_hash, .. }
            | LnClientError::BackendRejection { payment_hash, .. } => payment_hash.as_deref(),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, LnClientError::UnsupportedOperation { .. })
    }
}
