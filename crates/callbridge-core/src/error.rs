//! Error types for the call coordinator
//!
//! Three error types exist, one per boundary:
//!
//! - [`ServiceError`] is what a calling-service adapter returns
//! - [`CallUiError`] is what a platform call-UI adapter returns
//! - [`CoordinatorError`] is what the coordinator itself returns to callers
//!
//! Boundary errors are mapped into [`CoordinatorError`] at the call site with
//! the operation that failed, so a log line always says what was attempted.
//!
//! None of these errors is fatal. The coordinator degrades every failure to
//! "no active call" and reports the rest through affordances and events.

use thiserror::Error;

use crate::call::CallId;

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Result type returned by calling-service adapters
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type returned by call-UI adapters
pub type CallUiResult<T> = Result<T, CallUiError>;

/// Errors reported by the calling service (the SDK boundary)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Transport-level failure talking to the calling backend
    #[error("network error: {reason}")]
    Network { reason: String },

    /// The backend refused the request (bad target, forbidden, busy)
    #[error("request rejected: {reason}")]
    Rejected { reason: String },

    /// The device is not registered with the backend
    #[error("not registered with the calling service")]
    NotRegistered,

    /// The call referenced no longer exists on the backend
    #[error("call is gone: {reason}")]
    CallGone { reason: String },

    /// Anything else the SDK reports
    #[error("{message}")]
    Other { message: String },
}

impl ServiceError {
    /// Create a network error
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network { reason: reason.into() }
    }

    /// Create a rejected error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected { reason: reason.into() }
    }

    /// Create a catch-all error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other { message: message.into() }
    }
}

/// Errors reported by the platform call-UI provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallUiError {
    /// The platform refused to surface the call (do-not-disturb, blocked caller)
    #[error("call was refused by the platform: {reason}")]
    Refused { reason: String },

    /// The requested transaction could not be recorded
    #[error("transaction failed: {reason}")]
    TransactionFailed { reason: String },

    /// The platform does not know the call id
    #[error("unknown call {call_id}")]
    UnknownCall { call_id: CallId },

    /// The provider has been torn down
    #[error("call-UI provider is unavailable")]
    Unavailable,
}

/// Errors returned by [`CallCoordinator`](crate::CallCoordinator) operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// No valid credential is stored
    #[error("not authorized: {reason}")]
    NotAuthorized { reason: String },

    /// Outgoing calls need a completed registration
    #[error("device is not registered")]
    NotRegistered,

    /// Registration with the calling service failed
    #[error("registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// A call is already active or being dialed
    #[error("already in a call{}", .call_id.map(|id| format!(" ({id})")).unwrap_or_default())]
    AlreadyInCall { call_id: Option<CallId> },

    /// Dialing the remote party failed
    #[error("failed to dial {target}: {reason}")]
    DialFailed { target: String, reason: String },

    /// No active call matches the given id
    #[error("call not found: {call_id}")]
    CallNotFound { call_id: CallId },

    /// There is no active call at all
    #[error("no active call")]
    NoActiveCall,

    /// The active call is not in a state that allows the operation
    #[error("invalid call state for {operation}: {state}")]
    InvalidCallState { operation: String, state: String },

    /// answer / reject / hangup failed at the service
    #[error("call operation '{operation}' failed: {reason}")]
    CallOperationFailed { operation: String, reason: String },

    /// The platform call-UI reported a failure
    #[error("call-UI error during {operation}: {reason}")]
    CallUi { operation: String, reason: String },

    /// An operation did not complete in time
    #[error("operation '{operation}' timed out after {duration_ms}ms")]
    OperationTimeout { operation: String, duration_ms: u64 },

    /// Configuration is invalid
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The coordinator was shut down
    #[error("coordinator is shut down")]
    ShutDown,

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CoordinatorError {
    /// Create a not-authorized error
    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Self::NotAuthorized { reason: reason.into() }
    }

    /// Create an invalid-configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a service failure for the named per-call operation
    pub fn call_operation(operation: impl Into<String>, source: &ServiceError) -> Self {
        Self::CallOperationFailed {
            operation: operation.into(),
            reason: source.to_string(),
        }
    }

    /// Wrap a call-UI failure for the named operation
    pub fn call_ui(operation: impl Into<String>, source: &CallUiError) -> Self {
        Self::CallUi {
            operation: operation.into(),
            reason: source.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether repeating the operation later could succeed
    ///
    /// The coordinator never retries by itself; this is a hint for callers
    /// (a "retry" button, a re-registration on network change).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RegistrationFailed { .. }
            | Self::DialFailed { .. }
            | Self::CallOperationFailed { .. }
            | Self::CallUi { .. }
            | Self::OperationTimeout { .. }
            | Self::NotRegistered
            | Self::AlreadyInCall { .. } => true,

            Self::NotAuthorized { .. }
            | Self::CallNotFound { .. }
            | Self::NoActiveCall
            | Self::InvalidCallState { .. }
            | Self::InvalidConfiguration { .. }
            | Self::ShutDown
            | Self::Internal { .. } => false,
        }
    }

    /// Category used for structured logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotAuthorized { .. } => "auth",
            Self::NotRegistered | Self::RegistrationFailed { .. } => "registration",
            Self::AlreadyInCall { .. }
            | Self::DialFailed { .. }
            | Self::CallNotFound { .. }
            | Self::NoActiveCall
            | Self::InvalidCallState { .. }
            | Self::CallOperationFailed { .. } => "call",
            Self::CallUi { .. } => "call_ui",
            Self::OperationTimeout { .. } => "timeout",
            Self::InvalidConfiguration { .. } => "config",
            Self::ShutDown | Self::Internal { .. } => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_in_call_message_includes_id_when_known() {
        let id = CallId::new_v4();
        let err = CoordinatorError::AlreadyInCall { call_id: Some(id) };
        assert_eq!(err.to_string(), format!("already in a call ({id})"));

        let err = CoordinatorError::AlreadyInCall { call_id: None };
        assert_eq!(err.to_string(), "already in a call");
    }

    #[test]
    fn recoverable_and_category() {
        let dial = CoordinatorError::DialFailed {
            target: "xavier@example.com".to_string(),
            reason: "network error: unreachable".to_string(),
        };
        assert!(dial.is_recoverable());
        assert_eq!(dial.category(), "call");

        let config = CoordinatorError::invalid_config("operation_timeout_ms", "must be > 0");
        assert!(!config.is_recoverable());
        assert_eq!(config.category(), "config");
    }

    #[test]
    fn boundary_errors_keep_their_reason() {
        let err = CoordinatorError::call_operation("reject", &ServiceError::network("socket closed"));
        assert_eq!(
            err.to_string(),
            "call operation 'reject' failed: network error: socket closed"
        );

        let err = CoordinatorError::call_ui("report_incoming_call", &CallUiError::Refused {
            reason: "do not disturb".to_string(),
        });
        assert!(err.to_string().contains("do not disturb"));
    }
}
