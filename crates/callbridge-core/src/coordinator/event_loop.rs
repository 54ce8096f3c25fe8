//! Event loop for service-pushed events
//!
//! Incoming-call notifications and per-call events reach the coordinator
//! through forwarder tasks that pump them into one internal channel. A single
//! loop task drains that channel, so pushed events are handled one at a time in
//! arrival order.

use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ActiveCall, CallCoordinator, SessionState};
use crate::call::{CallDirection, CallEvent, CallId, CallInfo, MediaOptions};
use crate::call_ui::{CallHandleInfo, CallUpdate};
use crate::error::CoordinatorError;
use crate::events::CoordinatorEvent;
use crate::service::CallHandle;

/// Message handled by the event loop
#[derive(Debug)]
pub(crate) enum LoopMessage {
    /// The service delivered an incoming call
    Incoming(Arc<dyn CallHandle>),
    /// A call the coordinator observes emitted an event
    CallEvent { call_id: CallId, event: CallEvent },
}

impl CallCoordinator {
    /// Spawn the event loop and the incoming-call forwarder. Runs once.
    pub(crate) fn start_event_loop(self: &Arc<Self>) {
        let Some(loop_rx) = self.loop_rx.lock().take() else {
            debug!("Event loop already running");
            return;
        };

        let task = tokio::spawn(Self::run_event_loop(Arc::downgrade(self), loop_rx));
        self.track_task(task);

        match self.service.take_incoming_calls() {
            Some(mut incoming_rx) => {
                let loop_tx = self.loop_tx.clone();
                let task = tokio::spawn(async move {
                    while let Some(call) = incoming_rx.recv().await {
                        if loop_tx.send(LoopMessage::Incoming(call)).is_err() {
                            break;
                        }
                    }
                    debug!("Incoming call channel closed");
                });
                self.track_task(task);
            }
            None => warn!("Incoming call channel already taken, incoming calls will not be observed"),
        }
    }

    async fn run_event_loop(coordinator: Weak<Self>, mut loop_rx: mpsc::UnboundedReceiver<LoopMessage>) {
        info!("Starting coordinator event loop");

        while let Some(message) = loop_rx.recv().await {
            let Some(coordinator) = coordinator.upgrade() else {
                break;
            };
            match message {
                LoopMessage::Incoming(call) => coordinator.handle_incoming_call(call),
                LoopMessage::CallEvent { call_id, event } => coordinator.handle_call_event(call_id, event),
            }
        }

        info!("Coordinator event loop ended");
    }

    /// Forward a call's events into the loop until it disconnects
    pub(crate) fn attach_observers(&self, call: &Arc<dyn CallHandle>) {
        let call_id = call.id();
        let Some(mut events) = call.take_events() else {
            error!(%call_id, "Call events already taken, disconnect will not be observed");
            return;
        };

        let loop_tx = self.loop_tx.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let last = matches!(event, CallEvent::Disconnected(_));
                if loop_tx.send(LoopMessage::CallEvent { call_id, event }).is_err() || last {
                    break;
                }
            }
        });
        self.track_task(task);
    }

    /// Adopt an incoming call, or decline it if another call is in progress
    ///
    /// Reporting to the platform and auto-answering run in their own task so
    /// the loop keeps draining events (a remote cancel must not wait behind a
    /// slow answer).
    pub(crate) fn handle_incoming_call(self: &Arc<Self>, call: Arc<dyn CallHandle>) {
        let call_id = call.id();
        let remote = self.remote_participant(&call.remote_id());

        let adopted = self.update(|inner| {
            if inner.state.is_busy() || inner.active.is_some() {
                return false;
            }
            inner.active = Some(ActiveCall {
                handle: call.clone(),
                info: CallInfo::new(call_id, CallDirection::Incoming, &remote, SessionState::IncomingRinging),
            });
            inner.state = SessionState::IncomingRinging;
            true
        });

        if !adopted {
            info!(%call_id, remote = %remote.calling_id, "Declining incoming call, another call is in progress");
            self.publish(CoordinatorEvent::IncomingCallDeclined {
                call_id,
                remote_id: remote.calling_id.clone(),
            });
            self.spawn_call_operation(call, CallOperation::Reject);
            return;
        }

        info!(%call_id, remote = %remote.calling_id, "Incoming call");
        self.attach_observers(&call);
        self.publish(CoordinatorEvent::IncomingCall {
            call_id,
            remote_id: remote.calling_id.clone(),
        });

        match self.call_ui.clone() {
            Some(call_ui) => {
                let update = CallUpdate {
                    remote_handle: CallHandleInfo::generic(remote.label()),
                    has_video: self.config.capabilities.supports_video,
                };
                let coordinator = Arc::clone(self);
                let task = tokio::spawn(async move {
                    if coordinator.active_call_id() != Some(call_id) {
                        debug!(%call_id, "Call ended before it was reported");
                        return;
                    }
                    if let Err(e) = call_ui.report_incoming_call(call_id, update).await {
                        let err = CoordinatorError::call_ui("report_incoming_call", &e);
                        warn!(%call_id, error = %err, "Platform refused the incoming call, rejecting it");
                        coordinator.end_active_call(Some(call_id));
                    }
                });
                self.track_task(task);
            }
            None if self.config.auto_answer => {
                let coordinator = Arc::clone(self);
                let task = tokio::spawn(async move {
                    if let Err(e) = coordinator.answer_incoming(call_id).await {
                        warn!(%call_id, error = %e, "Auto-answer failed");
                    }
                });
                self.track_task(task);
            }
            None => debug!(%call_id, "Holding incoming call for manual answer"),
        }
    }

    /// Apply one call event to the coordinator state
    pub(crate) fn handle_call_event(&self, call_id: CallId, event: CallEvent) {
        match event {
            CallEvent::Ringing => {
                debug!(%call_id, "Remote party is ringing");
            }
            CallEvent::Connected => {
                let direction = self.update(|inner| {
                    let active = inner.active_matching(call_id)?;
                    active.info.connected_at.get_or_insert_with(Utc::now);
                    let direction = active.info.direction;
                    inner.set_call_state(SessionState::Connected);
                    Some(direction)
                });

                match direction {
                    Some(CallDirection::Outgoing) => {
                        info!(%call_id, "Outgoing call connected");
                        if let Some(call_ui) = &self.call_ui {
                            call_ui.report_outgoing_started_connecting(call_id, Utc::now());
                        }
                    }
                    Some(CallDirection::Incoming) => info!(%call_id, "Incoming call connected"),
                    None => debug!(%call_id, "Connected event for a call that is no longer active"),
                }
            }
            CallEvent::Disconnected(reason) => {
                self.cleanup(call_id, reason);
            }
        }
    }
}

/// Fire-and-forget per-call operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallOperation {
    Reject,
    Hangup,
}

impl CallOperation {
    fn name(&self) -> &'static str {
        match self {
            CallOperation::Reject => "reject",
            CallOperation::Hangup => "hangup",
        }
    }
}

impl CallCoordinator {
    /// Run `operation` on `call` in the background, bounded by the operation
    /// timeout. Failures are logged.
    pub(crate) fn spawn_call_operation(&self, call: Arc<dyn CallHandle>, operation: CallOperation) {
        let timeout = self.config.operation_timeout();
        tokio::spawn(async move {
            let call_id = call.id();
            let op = operation.name();
            let result = crate::timeout::with_timeout(op, timeout, async {
                let result = match operation {
                    CallOperation::Reject => call.reject().await,
                    CallOperation::Hangup => call.hangup().await,
                };
                result.map_err(|e| CoordinatorError::call_operation(op, &e))
            })
            .await;

            match result {
                Ok(()) => debug!(%call_id, operation = op, "Call operation completed"),
                Err(e) => warn!(%call_id, error = %e, "Call operation failed"),
            }
        });
    }

    /// Media options matching the configured capabilities
    pub(crate) fn media_options(&self) -> MediaOptions {
        MediaOptions::for_video(self.config.capabilities.supports_video)
    }
}
