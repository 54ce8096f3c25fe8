//! Platform call-UI boundary
//!
//! The platform call UI (the system in-call screen, lock-screen and headset
//! controls) is used in both directions:
//!
//! - the coordinator **reports** to it through [`CallUiSink`]: a call arrived,
//!   an outgoing call started connecting, a call ended remotely; and it
//!   **requests** transactions (start this call, end this call) that the
//!   platform then performs
//! - the platform **drives** the coordinator through action requests
//!   ([`PendingAction`]), which the coordinator resolves exactly once with
//!   [`PendingAction::fulfill`] or [`PendingAction::fail`]
//!
//! # Examples
//!
//! ```rust
//! use callbridge_core::call_ui::{ActionKind, ActionOutcome, PendingAction};
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (action, outcome) = PendingAction::new(ActionKind::Answer, Uuid::new_v4());
//! action.fulfill();
//! assert_eq!(outcome.await.unwrap(), ActionOutcome::Fulfilled);
//! # }
//! ```

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::warn;

use crate::call::{CallId, DisconnectReason};
use crate::error::CallUiResult;

/// Kind of handle shown for the remote party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleKind {
    /// Free-form identifier (user name, SDK id)
    Generic,
    /// Phone number
    PhoneNumber,
    /// Email address
    EmailAddress,
}

/// Remote party as shown by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHandleInfo {
    pub kind: HandleKind,
    pub value: String,
}

impl CallHandleInfo {
    /// Generic handle with the given value
    pub fn generic(value: impl Into<String>) -> Self {
        Self {
            kind: HandleKind::Generic,
            value: value.into(),
        }
    }
}

/// Details attached to a new incoming call report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallUpdate {
    pub remote_handle: CallHandleInfo,
    pub has_video: bool,
}

/// Transaction the coordinator asks the platform to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallUiAction {
    /// Record an outgoing call that was just dialed
    StartCall {
        call_id: CallId,
        handle: CallHandleInfo,
        is_video: bool,
    },
    /// End the given call
    EndCall { call_id: CallId },
}

impl CallUiAction {
    /// Call the action refers to
    pub fn call_id(&self) -> CallId {
        match self {
            CallUiAction::StartCall { call_id, .. } | CallUiAction::EndCall { call_id } => *call_id,
        }
    }
}

/// Why the platform is told a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndedReason {
    Failed,
    RemoteEnded,
    Unanswered,
    AnsweredElsewhere,
    DeclinedElsewhere,
}

impl From<&DisconnectReason> for EndedReason {
    fn from(reason: &DisconnectReason) -> Self {
        match reason {
            DisconnectReason::RemoteHangup | DisconnectReason::RemoteReject => EndedReason::RemoteEnded,
            DisconnectReason::RemoteCancel => EndedReason::Unanswered,
            DisconnectReason::AnsweredElsewhere => EndedReason::AnsweredElsewhere,
            DisconnectReason::RejectedElsewhere => EndedReason::DeclinedElsewhere,
            DisconnectReason::LocalHangup
            | DisconnectReason::LocalReject
            | DisconnectReason::Error(_) => EndedReason::Failed,
        }
    }
}

/// Static description of the provider, handed to the platform at setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfiguration {
    /// Name shown on the native call screen
    pub localized_name: String,
    /// Ringtone resource played for incoming calls
    pub ringtone_sound: Option<String>,
    /// Handle kinds the app can call
    pub supported_handle_kinds: Vec<HandleKind>,
    /// Whether the provider advertises video
    pub supports_video: bool,
    /// Calls per group; the coordinator only ever runs one
    pub max_calls_per_group: usize,
}

impl Default for ProviderConfiguration {
    fn default() -> Self {
        Self {
            localized_name: "Patient Central".to_string(),
            ringtone_sound: Some("Ringtone.caf".to_string()),
            supported_handle_kinds: vec![HandleKind::Generic],
            supports_video: true,
            max_calls_per_group: 1,
        }
    }
}

/// Sink the coordinator reports into
#[async_trait]
pub trait CallUiSink: Send + Sync {
    /// Report a new incoming call. The platform will not surface the call otherwise.
    async fn report_incoming_call(&self, call_id: CallId, update: CallUpdate) -> CallUiResult<()>;

    /// An outgoing call started connecting
    fn report_outgoing_started_connecting(&self, call_id: CallId, at: DateTime<Utc>);

    /// A call ended for a reason the platform did not initiate
    fn report_call_ended(&self, call_id: CallId, at: DateTime<Utc>, reason: EndedReason);

    /// Ask the platform to perform a transaction
    async fn request_transaction(&self, action: CallUiAction) -> CallUiResult<()>;
}

/// Action the platform asks the coordinator to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Start,
    Answer,
    End,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Start => write!(f, "start"),
            ActionKind::Answer => write!(f, "answer"),
            ActionKind::End => write!(f, "end"),
        }
    }
}

/// How a pending action was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Fulfilled,
    Failed,
}

/// A platform action request awaiting resolution
///
/// Resolving consumes the value, so an action cannot be resolved twice.
/// Dropping it unresolved fails it.
#[derive(Debug)]
pub struct PendingAction {
    kind: ActionKind,
    call_id: CallId,
    responder: Option<oneshot::Sender<ActionOutcome>>,
}

impl PendingAction {
    /// Create an action and the receiver its outcome will be delivered on
    pub fn new(kind: ActionKind, call_id: CallId) -> (Self, oneshot::Receiver<ActionOutcome>) {
        let (tx, rx) = oneshot::channel();
        let action = Self {
            kind,
            call_id,
            responder: Some(tx),
        };
        (action, rx)
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// The action succeeded
    pub fn fulfill(mut self) {
        self.resolve(ActionOutcome::Fulfilled);
    }

    /// The action could not be performed
    pub fn fail(mut self) {
        self.resolve(ActionOutcome::Failed);
    }

    fn resolve(&mut self, outcome: ActionOutcome) {
        if let Some(tx) = self.responder.take() {
            // receiver may be gone if the platform stopped waiting
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for PendingAction {
    fn drop(&mut self) {
        if self.responder.is_some() {
            warn!(kind = %self.kind, call_id = %self.call_id, "Action dropped unresolved, failing it");
            self.resolve(ActionOutcome::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fulfill_and_fail_deliver_outcome() {
        let (action, rx) = PendingAction::new(ActionKind::Start, CallId::new_v4());
        action.fulfill();
        assert_eq!(rx.await.unwrap(), ActionOutcome::Fulfilled);

        let (action, rx) = PendingAction::new(ActionKind::End, CallId::new_v4());
        action.fail();
        assert_eq!(rx.await.unwrap(), ActionOutcome::Failed);
    }

    #[tokio::test]
    async fn dropped_action_fails() {
        let (action, rx) = PendingAction::new(ActionKind::Answer, CallId::new_v4());
        drop(action);
        assert_eq!(rx.await.unwrap(), ActionOutcome::Failed);
    }

    #[test]
    fn resolving_after_receiver_is_gone_is_harmless() {
        let (action, rx) = PendingAction::new(ActionKind::Answer, CallId::new_v4());
        drop(rx);
        action.fulfill();
    }

    #[test]
    fn ended_reason_mapping() {
        assert_eq!(EndedReason::from(&DisconnectReason::RemoteHangup), EndedReason::RemoteEnded);
        assert_eq!(EndedReason::from(&DisconnectReason::RemoteCancel), EndedReason::Unanswered);
        assert_eq!(
            EndedReason::from(&DisconnectReason::AnsweredElsewhere),
            EndedReason::AnsweredElsewhere
        );
        assert_eq!(EndedReason::from(&DisconnectReason::Error("x".into())), EndedReason::Failed);
    }

    #[test]
    fn default_provider_configuration() {
        let config = ProviderConfiguration::default();
        assert_eq!(config.localized_name, "Patient Central");
        assert_eq!(config.supported_handle_kinds, vec![HandleKind::Generic]);
        assert_eq!(config.max_calls_per_group, 1);
    }
}
