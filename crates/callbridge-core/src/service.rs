//! Calling service boundary
//!
//! The calling SDK is consumed through two traits:
//!
//! - [`CallingService`]: device registration, codec activation, dialing and
//!   the incoming-call notification channel
//! - [`CallHandle`]: one live call, with answer / reject / hangup and its own
//!   event channel
//!
//! Events are delivered over `tokio::sync::mpsc` channels. Each receiver can be
//! taken exactly once, so every event has exactly one consumer. The sender side
//! must exist from the moment the call object is created; events emitted
//! before the coordinator attaches are buffered, not lost.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::call::{CallDirection, CallEvent, CallId, CallStatus, MediaOptions};
use crate::error::ServiceResult;

/// Receiver of incoming-call notifications
pub type IncomingCallReceiver = mpsc::UnboundedReceiver<Arc<dyn CallHandle>>;

/// Receiver of one call's lifecycle events
pub type CallEventReceiver = mpsc::UnboundedReceiver<CallEvent>;

/// Device-level calling operations
#[async_trait]
pub trait CallingService: Send + Sync {
    /// Register this device so it can place and receive calls
    async fn register(&self) -> ServiceResult<()>;

    /// Remove the device registration
    async fn deregister(&self) -> ServiceResult<()>;

    /// Ask the SDK to activate video codecs. Best effort, no completion.
    fn request_codec_activation(&self);

    /// Place a call. On success the returned call is live and owned by the service.
    async fn dial(&self, target: &str, media: MediaOptions) -> ServiceResult<Arc<dyn CallHandle>>;

    /// Take the incoming-call channel. Returns `None` after the first call.
    fn take_incoming_calls(&self) -> Option<IncomingCallReceiver>;
}

/// Operations and events of a single call
#[async_trait]
pub trait CallHandle: Send + Sync + fmt::Debug {
    /// Identifier assigned at creation
    fn id(&self) -> CallId;

    /// Who initiated the call
    fn direction(&self) -> CallDirection;

    /// Current status, driven by the service
    fn status(&self) -> CallStatus;

    /// Calling id of the remote party
    fn remote_id(&self) -> String;

    /// Take this call's event channel. Returns `None` after the first call.
    fn take_events(&self) -> Option<CallEventReceiver>;

    /// Accept an incoming call
    async fn answer(&self, media: MediaOptions) -> ServiceResult<()>;

    /// Decline an incoming call that has not been answered
    async fn reject(&self) -> ServiceResult<()>;

    /// End a call
    async fn hangup(&self) -> ServiceResult<()>;
}
