//! Gateway error taxonomy.

use serde::Serialize;
use studio_core::DecodeError;
use thiserror::Error;

use crate::engine::EngineError;

/// Errors surfaced by the gateway facade.
///
/// Transport faults are classified once, where the raw engine error is seen,
/// and travel unchanged from there. Statement errors from the engine keep
/// their original message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("client not existed")]
    ClientNotExisted,

    #[error("no idle connection available: {max} clients already connected")]
    NoIdleConnectionAvailable { max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("session lost")]
    SessionLost,

    #[error("host {host} unreachable: {reason}")]
    HostUnreachable { host: String, reason: String },

    #[error(transparent)]
    Engine(EngineError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        if err.is_connection_fault() {
            GatewayError::ConnectionClosed
        } else {
            GatewayError::Engine(err)
        }
    }
}

impl GatewayError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::ClientNotExisted => "CLIENT_NOT_EXISTED",
            GatewayError::NoIdleConnectionAvailable { .. } => "NO_IDLE_CONNECTION",
            GatewayError::ConnectionClosed => "CONNECTION_CLOSED",
            GatewayError::SessionLost => "SESSION_LOST",
            GatewayError::HostUnreachable { .. } => "HOST_UNREACHABLE",
            GatewayError::Engine(EngineError::Auth(_)) => "AUTH_FAILED",
            GatewayError::Engine(_) => "ENGINE_ERROR",
            GatewayError::Decode(_) => "DECODE_ERROR",
        }
    }

    /// Whether the caller must log in again before retrying.
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            GatewayError::ClientNotExisted | GatewayError::ConnectionClosed
        )
    }

    /// Engine error code, for statement errors.
    pub fn engine_code(&self) -> Option<i32> {
        match self {
            GatewayError::Engine(EngineError::Statement { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

/// Wire form of an error: `{"code": ..., "message": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(rename = "engineCode", skip_serializing_if = "Option::is_none")]
    pub engine_code: Option<i32>,
}

impl From<&GatewayError> for ErrorBody {
    fn from(err: &GatewayError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            engine_code: err.engine_code(),
        }
    }
}

impl Serialize for GatewayError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorBody::from(self).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_faults_become_connection_closed() {
        let err = GatewayError::from(EngineError::Transport("Broken pipe (os error 32)".into()));
        assert_eq!(err, GatewayError::ConnectionClosed);
        assert!(err.requires_relogin());
    }

    #[test]
    fn test_other_transport_errors_pass_through() {
        let raw = EngineError::Transport("connection refused".into());
        assert_eq!(GatewayError::from(raw.clone()), GatewayError::Engine(raw));
    }

    #[test]
    fn test_statement_errors_keep_message() {
        let err = GatewayError::from(EngineError::statement(
            -1004,
            "SyntaxError: syntax error near `IS'",
        ));
        assert_eq!(err.to_string(), "SyntaxError: syntax error near `IS'");
        assert_eq!(err.code(), "ENGINE_ERROR");
        assert_eq!(err.engine_code(), Some(-1004));
        assert!(!err.requires_relogin());
    }

    #[test]
    fn test_serialized_error_body() {
        let json = serde_json::to_value(GatewayError::SessionLost).unwrap();
        assert_eq!(json["code"], "SESSION_LOST");
        assert_eq!(json["message"], "session lost");
        assert!(json.get("engineCode").is_none());
    }
}
