//! Call operations: dial, answer, end, and the converging cleanup

use chrono::Utc;
use tracing::{debug, info, warn};

use super::event_loop::CallOperation;
use super::{ActiveCall, CallCoordinator, SessionState};
use crate::call::{CallDirection, CallId, CallInfo, CallStatus, DisconnectReason};
use crate::call_ui::{CallHandleInfo, CallUiAction, EndedReason};
use crate::directory::{Participant, User};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::CoordinatorEvent;
use crate::timeout::with_timeout;

impl CallCoordinator {
    /// Place an outgoing call
    ///
    /// Fails with [`CoordinatorError::AlreadyInCall`] while another call is
    /// active or being dialed, and with [`CoordinatorError::NotRegistered`]
    /// before registration completed. When dialing fails the coordinator is
    /// back to idle and no call-UI transaction has been issued.
    pub async fn start_call(&self, target: &Participant) -> CoordinatorResult<CallId> {
        self.ensure_running()?;

        self.update(|inner| {
            if let Some(active) = &inner.active {
                return Err(CoordinatorError::AlreadyInCall {
                    call_id: Some(active.info.call_id),
                });
            }
            if inner.state.is_busy() {
                return Err(CoordinatorError::AlreadyInCall { call_id: None });
            }
            if !inner.registration.is_registered() {
                return Err(CoordinatorError::NotRegistered);
            }
            inner.state = SessionState::Dialing;
            Ok(())
        })?;

        info!(target = %target.calling_id, "Dialing");
        let media = self.media_options();
        let dialed = with_timeout("dial", self.config.operation_timeout(), async {
            self.service
                .dial(&target.calling_id, media)
                .await
                .map_err(|e| CoordinatorError::DialFailed {
                    target: target.calling_id.clone(),
                    reason: e.to_string(),
                })
        })
        .await;

        let call = match dialed {
            Ok(call) => call,
            Err(e) => {
                let err = match e {
                    CoordinatorError::DialFailed { .. } => e,
                    other => CoordinatorError::DialFailed {
                        target: target.calling_id.clone(),
                        reason: other.to_string(),
                    },
                };
                warn!(target = %target.calling_id, error = %err, "Dial failed");
                self.update(|inner| {
                    if inner.state == SessionState::Dialing {
                        inner.state = SessionState::Idle;
                    }
                });
                self.publish(CoordinatorEvent::CallFailed {
                    target: target.calling_id.clone(),
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        let call_id = call.id();
        let adopted = self.update(|inner| {
            if inner.state != SessionState::Dialing || inner.active.is_some() {
                return false;
            }
            inner.active = Some(ActiveCall {
                handle: call.clone(),
                info: CallInfo::new(call_id, CallDirection::Outgoing, target, SessionState::Ringing),
            });
            inner.state = SessionState::Ringing;
            true
        });

        if !adopted {
            warn!(%call_id, "Dial completed after the coordinator moved on, hanging up");
            self.spawn_call_operation(call, CallOperation::Hangup);
            return Err(if self.is_shut_down() {
                CoordinatorError::ShutDown
            } else {
                CoordinatorError::internal("dial completed after the call was abandoned")
            });
        }

        info!(%call_id, target = %target.calling_id, "Outgoing call started");
        self.attach_observers(&call);
        self.publish(CoordinatorEvent::OutgoingCallStarted {
            call_id,
            remote_id: target.calling_id.clone(),
        });

        if let Some(call_ui) = &self.call_ui {
            let action = CallUiAction::StartCall {
                call_id,
                handle: CallHandleInfo::generic(target.label()),
                is_video: self.config.capabilities.supports_video,
            };
            if let Err(e) = call_ui.request_transaction(action).await {
                let err = CoordinatorError::call_ui("start_call", &e);
                warn!(%call_id, error = %err, "Start-call transaction failed");
            }
        }

        Ok(call_id)
    }

    /// Call a user from the directory
    pub async fn call_user(&self, user: User) -> CoordinatorResult<CallId> {
        let target = self.participant(user);
        self.start_call(&target).await
    }

    /// End-call gesture from the presentation layer
    ///
    /// With the platform call UI the end is requested as a transaction and
    /// performed when the platform calls back; without it, or when the request
    /// fails, the call is ended directly. Does nothing without an active call.
    pub async fn end_call(&self) {
        let Some(call_id) = self.active_call_id() else {
            debug!("End call requested with no active call");
            return;
        };

        match &self.call_ui {
            Some(call_ui) => {
                if let Err(e) = call_ui.request_transaction(CallUiAction::EndCall { call_id }).await {
                    let err = CoordinatorError::call_ui("end_call", &e);
                    warn!(%call_id, error = %err, "End-call transaction failed, ending the call directly");
                    self.end_active_call(Some(call_id));
                }
            }
            None => {
                self.end_active_call(Some(call_id));
            }
        }
    }

    /// Answer the ringing incoming call (no platform call UI)
    pub async fn answer_call(&self) -> CoordinatorResult<CallId> {
        self.ensure_running()?;
        let call_id = self.active_call_id().ok_or(CoordinatorError::NoActiveCall)?;
        self.answer_incoming(call_id).await?;
        Ok(call_id)
    }

    /// Reject a ringing incoming call, otherwise hang up
    ///
    /// The service operation runs in the background; cleanup happens right
    /// away. Returns the id of the call that was ended.
    pub fn hangup_or_reject(&self) -> Option<CallId> {
        self.end_active_call(None)
    }

    /// [`hangup_or_reject`](Self::hangup_or_reject), restricted to `expected` when given
    pub(crate) fn end_active_call(&self, expected: Option<CallId>) -> Option<CallId> {
        let target = {
            let inner = self.inner.lock();
            inner
                .active
                .as_ref()
                .filter(|a| expected.map_or(true, |id| id == a.info.call_id))
                .map(|a| (a.handle.clone(), a.info.direction))
        };
        let Some((call, direction)) = target else {
            debug!("No active call to end");
            return None;
        };

        let call_id = call.id();
        let (operation, reason) = if direction == CallDirection::Incoming && call.status() == CallStatus::Ringing {
            (CallOperation::Reject, DisconnectReason::LocalReject)
        } else {
            (CallOperation::Hangup, DisconnectReason::LocalHangup)
        };

        info!(%call_id, ?operation, "Ending call");
        self.spawn_call_operation(call, operation);
        self.cleanup(call_id, reason);
        Some(call_id)
    }

    /// Answer the active incoming call with `call_id`
    pub(crate) async fn answer_incoming(&self, call_id: CallId) -> CoordinatorResult<()> {
        let call = self.update(|inner| {
            let current = inner.state;
            let Some(active) = inner.active.as_ref() else {
                return Err(CoordinatorError::NoActiveCall);
            };
            if active.info.call_id != call_id {
                return Err(CoordinatorError::CallNotFound { call_id });
            }
            if active.info.direction != CallDirection::Incoming || current != SessionState::IncomingRinging {
                return Err(CoordinatorError::InvalidCallState {
                    operation: "answer".to_string(),
                    state: current.to_string(),
                });
            }
            let handle = active.handle.clone();
            inner.set_call_state(SessionState::Connecting);
            Ok(handle)
        })?;

        let media = self.media_options();
        let answered = with_timeout("answer", self.config.operation_timeout(), async {
            call.answer(media)
                .await
                .map_err(|e| CoordinatorError::call_operation("answer", &e))
        })
        .await;

        match answered {
            Ok(()) => {
                self.update(|inner| {
                    if inner.state != SessionState::Connecting {
                        return;
                    }
                    if let Some(active) = inner.active_matching(call_id) {
                        active.info.connected_at.get_or_insert_with(Utc::now);
                        inner.set_call_state(SessionState::Connected);
                    }
                });
                info!(%call_id, "Answered incoming call");
                Ok(())
            }
            Err(e) => {
                self.update(|inner| {
                    if inner.state == SessionState::Connecting && inner.active_matching(call_id).is_some() {
                        inner.set_call_state(SessionState::IncomingRinging);
                    }
                });
                warn!(%call_id, error = %e, "Answer failed");
                Err(e)
            }
        }
    }

    /// Forget the call with `call_id` and return to idle
    ///
    /// Every termination path ends here. Returns `false` when the call is not
    /// the active one (already cleaned up, or never adopted).
    pub(crate) fn cleanup(&self, call_id: CallId, reason: DisconnectReason) -> bool {
        let ended = self.update(|inner| {
            inner.active_matching(call_id)?;
            let active = inner.active.take()?;
            inner.state = SessionState::Idle;
            Some(active.info)
        });

        let Some(info) = ended else {
            debug!(%call_id, %reason, "Ignoring disconnect for a call that is not active");
            return false;
        };

        let at = Utc::now();
        info!(%call_id, direction = %info.direction, %reason, "Call ended");

        if !reason.is_local() {
            if let Some(call_ui) = &self.call_ui {
                call_ui.report_call_ended(call_id, at, EndedReason::from(&reason));
            }
        }

        self.publish(CoordinatorEvent::CallEnded {
            call_id,
            direction: info.direction,
            reason,
            at,
        });
        true
    }
}
