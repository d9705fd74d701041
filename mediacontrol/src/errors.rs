use thiserror::Error;

use crate::remote::RequestId;

/// Reason reported by a player engine when it cannot prepare a descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrepareFailure {
    #[error("network error: {0}")]
    Network(String),
    #[error("unsupported format: {0}")]
    Format(String),
    #[error("DRM error: {0}")]
    Drm(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    // Erreur de programmation : l'opération n'est pas valide dans cet état
    #[error("Operation '{operation}' is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
    #[error("Prepare failed for '{descriptor_id}': {reason}")]
    PrepareFailed {
        descriptor_id: String,
        reason: PrepareFailure,
    },
    #[error("Cast connection error: {0}")]
    Connection(String),
    #[error("Remote request {request} failed: {reason}")]
    RemoteRequest { request: RequestId, reason: String },
    #[error("Invalid media descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("Engine error: {0}")]
    Engine(String),
    #[error("Invalid time format: {0}")]
    InvalidTime(String),
}

impl ControlError {
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        ControlError::InvalidState { operation, state }
    }

    pub fn prepare_failed(descriptor_id: &str, reason: PrepareFailure) -> Self {
        ControlError::PrepareFailed {
            descriptor_id: descriptor_id.to_string(),
            reason,
        }
    }

    pub fn remote_request(request: RequestId, reason: &str) -> Self {
        ControlError::RemoteRequest {
            request,
            reason: reason.to_string(),
        }
    }

    pub fn engine(err: anyhow::Error) -> Self {
        ControlError::Engine(format!("{:#}", err))
    }

    /// True for errors caused by calling an operation at the wrong time.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, ControlError::InvalidState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ControlError::invalid_state("play", "IDLE");
        assert_eq!(err.to_string(), "Operation 'play' is not valid in state IDLE");
        assert!(err.is_invalid_state());

        let err = ControlError::prepare_failed("sintel", PrepareFailure::Drm("no license".into()));
        assert_eq!(
            err.to_string(),
            "Prepare failed for 'sintel': DRM error: no license"
        );
        assert!(!err.is_invalid_state());

        let err = ControlError::remote_request(RequestId(7), "receiver busy");
        assert_eq!(err.to_string(), "Remote request #7 failed: receiver busy");
    }

    #[test]
    fn test_engine_error_keeps_context() {
        let source = anyhow::anyhow!("socket closed").context("stop failed");
        let err = ControlError::engine(source);
        assert_eq!(err.to_string(), "Engine error: stop failed: socket closed");
    }
}
