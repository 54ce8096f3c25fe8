//! Coordinator events
//!
//! Everything the coordinator does is also published as a [`CoordinatorEvent`]
//! on a `tokio::sync::broadcast` channel. The presentation layer and tests
//! subscribe with [`CallCoordinator::subscribe_events`](crate::CallCoordinator::subscribe_events).
//! Slow subscribers lag; they never block the coordinator.

use chrono::{DateTime, Utc};

use crate::call::{CallDirection, CallId, DisconnectReason};
use crate::coordinator::SessionState;
use crate::registration::RegistrationState;

/// Something observable happened in the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// Registration state moved
    RegistrationChanged {
        state: RegistrationState,
        /// Failure reason when a registration attempt failed
        error: Option<String>,
    },

    /// An outgoing call was dialed and adopted
    OutgoingCallStarted { call_id: CallId, remote_id: String },

    /// An incoming call was adopted and is ringing
    IncomingCall { call_id: CallId, remote_id: String },

    /// An incoming call was declined because another call was in progress
    IncomingCallDeclined { call_id: CallId, remote_id: String },

    /// The coordinator state changed
    StateChanged {
        call_id: Option<CallId>,
        previous: SessionState,
        current: SessionState,
    },

    /// The active call is gone and the coordinator is idle again
    CallEnded {
        call_id: CallId,
        direction: CallDirection,
        reason: DisconnectReason,
        at: DateTime<Utc>,
    },

    /// Dialing failed; no call was adopted
    CallFailed { target: String, reason: String },
}

impl CoordinatorEvent {
    /// Call the event refers to, if any
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            CoordinatorEvent::OutgoingCallStarted { call_id, .. }
            | CoordinatorEvent::IncomingCall { call_id, .. }
            | CoordinatorEvent::IncomingCallDeclined { call_id, .. }
            | CoordinatorEvent::CallEnded { call_id, .. } => Some(*call_id),
            CoordinatorEvent::StateChanged { call_id, .. } => *call_id,
            CoordinatorEvent::RegistrationChanged { .. } | CoordinatorEvent::CallFailed { .. } => None,
        }
    }
}
