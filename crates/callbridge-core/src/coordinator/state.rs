//! Coordinator state and the affordances derived from it

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registration::RegistrationState;

/// Where the coordinator is in the life of the (single) call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No call
    #[default]
    Idle,
    /// An outgoing dial is in flight; no call object yet
    Dialing,
    /// Outgoing call adopted, waiting for the remote party
    Ringing,
    /// Incoming call adopted, waiting for the local user
    IncomingRinging,
    /// Answer of an incoming call is in flight
    Connecting,
    /// Media is established
    Connected,
}

impl SessionState {
    /// Whether a call is being set up or is in progress
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Dialing => "dialing",
            SessionState::Ringing => "ringing",
            SessionState::IncomingRinging => "incoming-ringing",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// What the presentation layer may show or enable
///
/// Never set directly; always recomputed from state with [`Affordances::derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Affordances {
    /// The call button is enabled
    pub call_enabled: bool,
    /// The end-call button is shown
    pub end_call_visible: bool,
    /// Local and remote video surfaces are shown
    pub media_visible: bool,
}

impl Affordances {
    pub fn derive(registration: RegistrationState, state: SessionState, supports_video: bool) -> Self {
        let in_call = matches!(state, SessionState::Ringing | SessionState::Connected);
        Self {
            call_enabled: registration.is_registered() && state == SessionState::Idle,
            end_call_visible: in_call,
            media_visible: supports_video && in_call,
        }
    }
}
