//! Call data model
//!
//! A call is created and owned by the calling service. The coordinator only
//! keeps a handle to it for as long as it is alive, plus a small amount of
//! bookkeeping ([`CallInfo`]) that it exposes to the presentation layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinator::SessionState;
use crate::directory::Participant;

/// Unique identifier of a call, assigned by the calling service
pub type CallId = uuid::Uuid;

/// Which side initiated the call. Fixed for the lifetime of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// The remote party called us
    Incoming,
    /// We dialed the remote party
    Outgoing,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Incoming => write!(f, "incoming"),
            CallDirection::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// Call status as reported by the calling service
///
/// The coordinator never writes this; it only reads it when it has to choose
/// between rejecting and hanging up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatus {
    /// Call object exists, signaling has not started
    Initiated,
    /// The remote side (outgoing) or this device (incoming) is ringing
    Ringing,
    /// Media is being negotiated
    Connecting,
    /// Media is flowing
    Connected,
    /// The call is over
    Disconnected,
}

impl CallStatus {
    /// Whether the call is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Disconnected)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Initiated => "initiated",
            CallStatus::Ringing => "ringing",
            CallStatus::Connecting => "connecting",
            CallStatus::Connected => "connected",
            CallStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Why a call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// This device hung up
    LocalHangup,
    /// This device declined an incoming call
    LocalReject,
    /// The remote party hung up
    RemoteHangup,
    /// The remote party declined our call
    RemoteReject,
    /// The remote party cancelled before we answered
    RemoteCancel,
    /// Another device of ours answered
    AnsweredElsewhere,
    /// Another device of ours declined
    RejectedElsewhere,
    /// The call failed
    Error(String),
}

impl DisconnectReason {
    /// Whether this device caused the disconnect
    ///
    /// The platform call UI already knows about local disconnects (it asked
    /// for them), so only non-local ones are reported back to it.
    pub fn is_local(&self) -> bool {
        matches!(self, DisconnectReason::LocalHangup | DisconnectReason::LocalReject)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::LocalHangup => write!(f, "local hangup"),
            DisconnectReason::LocalReject => write!(f, "local reject"),
            DisconnectReason::RemoteHangup => write!(f, "remote hangup"),
            DisconnectReason::RemoteReject => write!(f, "remote reject"),
            DisconnectReason::RemoteCancel => write!(f, "remote cancel"),
            DisconnectReason::AnsweredElsewhere => write!(f, "answered elsewhere"),
            DisconnectReason::RejectedElsewhere => write!(f, "rejected elsewhere"),
            DisconnectReason::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Lifecycle events emitted by a single call
///
/// Each kind is delivered at most once per call. `Disconnected` is always the
/// last event, whatever ended the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// The remote side is ringing (outgoing calls)
    Ringing,
    /// Media is established
    Connected,
    /// The call is over
    Disconnected(DisconnectReason),
}

/// Media requested when dialing or answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaOptions {
    /// Audio only
    AudioOnly,
    /// Audio and video, rendered into the local and remote media surfaces
    AudioVideo,
}

impl MediaOptions {
    /// Pick the media options matching the video capability
    pub fn for_video(supports_video: bool) -> Self {
        if supports_video {
            MediaOptions::AudioVideo
        } else {
            MediaOptions::AudioOnly
        }
    }

    /// Whether video is requested
    pub fn has_video(&self) -> bool {
        matches!(self, MediaOptions::AudioVideo)
    }
}

/// Snapshot of the active call, as seen by the coordinator
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Call identifier
    pub call_id: CallId,
    /// Direction of the call
    pub direction: CallDirection,
    /// Calling id of the remote party
    pub remote_id: String,
    /// Display name of the remote party, when known
    pub remote_display_name: Option<String>,
    /// Coordinator state for this call
    pub state: SessionState,
    /// When the coordinator adopted the call
    pub started_at: DateTime<Utc>,
    /// When the call connected, if it has
    pub connected_at: Option<DateTime<Utc>>,
}

impl CallInfo {
    pub(crate) fn new(
        call_id: CallId,
        direction: CallDirection,
        remote: &Participant,
        state: SessionState,
    ) -> Self {
        Self {
            call_id,
            direction,
            remote_id: remote.calling_id.clone(),
            remote_display_name: remote.display_name.clone(),
            state,
            started_at: Utc::now(),
            connected_at: None,
        }
    }

    /// Name to show for the remote party
    pub fn remote_label(&self) -> &str {
        self.remote_display_name.as_deref().unwrap_or(&self.remote_id)
    }
}
