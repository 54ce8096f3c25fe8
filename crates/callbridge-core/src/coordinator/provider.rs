//! Actions requested by the platform call UI
//!
//! Each action arrives as a [`PendingAction`] and is resolved exactly once.

use tracing::{debug, info, warn};

use super::CallCoordinator;
use crate::call_ui::PendingAction;

impl CallCoordinator {
    /// The platform is starting an outgoing call it was told about
    ///
    /// The call already exists (it was dialed before the transaction was
    /// requested), so this only checks that it is still the active one.
    pub fn perform_start(&self, action: PendingAction) {
        let call_id = action.call_id();
        if self.active_call_id() == Some(call_id) {
            debug!(%call_id, "Start action fulfilled");
            action.fulfill();
        } else {
            warn!(%call_id, "Start action for a call that is not active");
            action.fail();
        }
    }

    /// The user answered from the platform call UI
    ///
    /// Fulfilled only when the call is the active one and the answer succeeded.
    pub async fn perform_answer(&self, action: PendingAction) {
        let call_id = action.call_id();
        match self.answer_incoming(call_id).await {
            Ok(()) => action.fulfill(),
            Err(e) => {
                warn!(%call_id, error = %e, "Answer action failed");
                action.fail();
            }
        }
    }

    /// The user ended the call from the platform call UI, or a requested
    /// end-call transaction is being performed. Always fulfilled.
    ///
    /// Only the call named by the action is ended; a stale action for a call
    /// that was already cleaned up leaves a newer active call alone.
    pub fn perform_end(&self, action: PendingAction) {
        let call_id = action.call_id();
        if self.end_active_call(Some(call_id)).is_none() {
            match self.active_call_id() {
                Some(active) => warn!(%call_id, %active, "End action for a call that is no longer active"),
                None => debug!(%call_id, "End action with no active call"),
            }
        }
        action.fulfill();
    }

    /// The platform dropped every call it was tracking
    pub fn provider_did_reset(&self) {
        info!("Call-UI provider reset");
        self.hangup_or_reject();
    }
}
