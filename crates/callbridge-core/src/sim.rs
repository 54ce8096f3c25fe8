//! In-memory calling service and call UI
//!
//! [`LoopbackCallingService`] and [`SimCall`] stand in for the calling SDK:
//! they record every operation, let the caller push incoming calls and drive
//! per-call events, and can be told to fail. [`LoopbackCallUi`] stands in for
//! the platform call UI: it records every report and transaction and, once
//! attached to a coordinator, performs the actions it is asked for the way the
//! platform would.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::call::{CallDirection, CallEvent, CallId, CallStatus, DisconnectReason, MediaOptions};
use crate::call_ui::{
    ActionKind, ActionOutcome, CallUiAction, CallUiSink, CallUpdate, EndedReason, PendingAction,
};
use crate::coordinator::CallCoordinator;
use crate::credentials::TokenClaims;
use crate::error::{CallUiError, CallUiResult, CoordinatorError, CoordinatorResult, ServiceError, ServiceResult};
use crate::service::{CallEventReceiver, CallHandle, CallingService, IncomingCallReceiver};

/// Lifetime of tokens minted by [`guest_token`]
const GUEST_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Mint an unsigned-in-practice token for local runs
///
/// The coordinator does not check signatures, so any secret works.
pub fn guest_token(subject: &str) -> CoordinatorResult<String> {
    let claims = TokenClaims {
        sub: subject.to_string(),
        name: Some(subject.to_string()),
        iss: Some("callbridge-sim".to_string()),
        exp: Some(Utc::now().timestamp() as u64 + GUEST_TOKEN_TTL_SECS),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"callbridge-sim"))
        .map_err(|e| CoordinatorError::internal(format!("failed to mint token: {e}")))
}

/// Operation observed by the loopback service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOp {
    Register,
    Deregister,
    CodecActivation,
    Dial { target: String, media: MediaOptions },
    Answer { call_id: CallId, media: MediaOptions },
    Reject { call_id: CallId },
    Hangup { call_id: CallId },
}

/// Operation the loopback service can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Register,
    Deregister,
    Dial,
    Answer,
    Reject,
    Hangup,
}

#[derive(Debug, Default)]
struct SimShared {
    operations: Mutex<Vec<ServiceOp>>,
    failures: Mutex<HashSet<FailurePoint>>,
    answer_delay: Mutex<Option<Duration>>,
}

impl SimShared {
    fn record(&self, op: ServiceOp) {
        debug!(?op, "Loopback service operation");
        self.operations.lock().push(op);
    }

    fn check(&self, point: FailurePoint) -> ServiceResult<()> {
        if self.failures.lock().contains(&point) {
            return Err(ServiceError::network(format!("injected {point:?} failure")));
        }
        Ok(())
    }
}

/// In-memory [`CallingService`]
#[derive(Debug)]
pub struct LoopbackCallingService {
    shared: Arc<SimShared>,
    calls: Mutex<Vec<Arc<SimCall>>>,
    registered: Mutex<bool>,
    dial_delay: Mutex<Option<Duration>>,
    incoming_tx: mpsc::UnboundedSender<Arc<dyn CallHandle>>,
    incoming_rx: Mutex<Option<IncomingCallReceiver>>,
}

impl Default for LoopbackCallingService {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackCallingService {
    pub fn new() -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(SimShared::default()),
            calls: Mutex::new(Vec::new()),
            registered: Mutex::new(false),
            dial_delay: Mutex::new(None),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
        }
    }

    /// Make `point` fail until [`clear_failure`](Self::clear_failure)
    pub fn fail(&self, point: FailurePoint) {
        self.shared.failures.lock().insert(point);
    }

    pub fn clear_failure(&self, point: FailurePoint) {
        self.shared.failures.lock().remove(&point);
    }

    /// Delay every dial by `delay`
    pub fn set_dial_delay(&self, delay: Option<Duration>) {
        *self.dial_delay.lock() = delay;
    }

    /// Delay every answer by `delay`
    pub fn set_answer_delay(&self, delay: Option<Duration>) {
        *self.shared.answer_delay.lock() = delay;
    }

    /// Every operation observed so far, calls included
    pub fn operations(&self) -> Vec<ServiceOp> {
        self.shared.operations.lock().clone()
    }

    /// Number of recorded operations matching `predicate`
    pub fn count(&self, predicate: impl Fn(&ServiceOp) -> bool) -> usize {
        self.shared.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    pub fn is_registered(&self) -> bool {
        *self.registered.lock()
    }

    /// Calls created so far, dialed or pushed
    pub fn calls(&self) -> Vec<Arc<SimCall>> {
        self.calls.lock().clone()
    }

    pub fn call(&self, call_id: CallId) -> Option<Arc<SimCall>> {
        self.calls.lock().iter().find(|c| c.id == call_id).cloned()
    }

    pub fn last_call(&self) -> Option<Arc<SimCall>> {
        self.calls.lock().last().cloned()
    }

    /// Deliver a new incoming call from `remote_id`
    pub fn push_incoming(&self, remote_id: impl Into<String>) -> Arc<SimCall> {
        let call = SimCall::new(CallDirection::Incoming, remote_id.into(), self.shared.clone());
        self.calls.lock().push(call.clone());
        if self.incoming_tx.send(call.clone()).is_err() {
            warn!(call_id = %call.id, "Nobody is listening for incoming calls");
        }
        call
    }
}

#[async_trait]
impl CallingService for LoopbackCallingService {
    async fn register(&self) -> ServiceResult<()> {
        self.shared.record(ServiceOp::Register);
        self.shared.check(FailurePoint::Register)?;
        *self.registered.lock() = true;
        Ok(())
    }

    async fn deregister(&self) -> ServiceResult<()> {
        self.shared.record(ServiceOp::Deregister);
        self.shared.check(FailurePoint::Deregister)?;
        *self.registered.lock() = false;
        Ok(())
    }

    fn request_codec_activation(&self) {
        self.shared.record(ServiceOp::CodecActivation);
    }

    async fn dial(&self, target: &str, media: MediaOptions) -> ServiceResult<Arc<dyn CallHandle>> {
        self.shared.record(ServiceOp::Dial {
            target: target.to_string(),
            media,
        });

        let delay = *self.dial_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.shared.check(FailurePoint::Dial)?;
        if !self.is_registered() {
            return Err(ServiceError::NotRegistered);
        }

        let call = SimCall::new(CallDirection::Outgoing, target.to_string(), self.shared.clone());
        self.calls.lock().push(call.clone());
        Ok(call as Arc<dyn CallHandle>)
    }

    fn take_incoming_calls(&self) -> Option<IncomingCallReceiver> {
        self.incoming_rx.lock().take()
    }
}

/// In-memory [`CallHandle`]
///
/// Each event kind is emitted at most once, and nothing is emitted after
/// `Disconnected`.
#[derive(Debug)]
pub struct SimCall {
    id: CallId,
    direction: CallDirection,
    remote_id: String,
    status: Mutex<CallStatus>,
    emitted: Mutex<HashSet<&'static str>>,
    events_tx: mpsc::UnboundedSender<CallEvent>,
    events_rx: Mutex<Option<CallEventReceiver>>,
    shared: Arc<SimShared>,
}

impl SimCall {
    fn new(direction: CallDirection, remote_id: String, shared: Arc<SimShared>) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: CallId::new_v4(),
            direction,
            remote_id,
            status: Mutex::new(CallStatus::Ringing),
            emitted: Mutex::new(HashSet::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            shared,
        })
    }

    fn emit(&self, event: CallEvent) {
        let kind = match &event {
            CallEvent::Ringing => "ringing",
            CallEvent::Connected => "connected",
            CallEvent::Disconnected(_) => "disconnected",
        };
        {
            let mut emitted = self.emitted.lock();
            if emitted.contains("disconnected") || !emitted.insert(kind) {
                debug!(call_id = %self.id, kind, "Suppressing duplicate or late event");
                return;
            }
        }
        // receiver dropped means nobody observes this call any more
        let _ = self.events_tx.send(event);
    }

    /// The remote side is ringing
    pub fn ring(&self) {
        self.emit(CallEvent::Ringing);
    }

    /// Media is established
    pub fn connect(&self) {
        *self.status.lock() = CallStatus::Connected;
        self.emit(CallEvent::Connected);
    }

    /// The call ended for `reason`
    pub fn disconnect(&self, reason: DisconnectReason) {
        *self.status.lock() = CallStatus::Disconnected;
        self.emit(CallEvent::Disconnected(reason));
    }

    /// The remote party hung up
    pub fn remote_hangup(&self) {
        self.disconnect(DisconnectReason::RemoteHangup);
    }
}

#[async_trait]
impl CallHandle for SimCall {
    fn id(&self) -> CallId {
        self.id
    }

    fn direction(&self) -> CallDirection {
        self.direction
    }

    fn status(&self) -> CallStatus {
        *self.status.lock()
    }

    fn remote_id(&self) -> String {
        self.remote_id.clone()
    }

    fn take_events(&self) -> Option<CallEventReceiver> {
        self.events_rx.lock().take()
    }

    async fn answer(&self, media: MediaOptions) -> ServiceResult<()> {
        self.shared.record(ServiceOp::Answer { call_id: self.id, media });
        let delay = *self.shared.answer_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.shared.check(FailurePoint::Answer)?;
        if self.status().is_terminal() {
            return Err(ServiceError::CallGone {
                reason: "call already ended".to_string(),
            });
        }
        self.connect();
        Ok(())
    }

    async fn reject(&self) -> ServiceResult<()> {
        self.shared.record(ServiceOp::Reject { call_id: self.id });
        self.shared.check(FailurePoint::Reject)?;
        self.disconnect(DisconnectReason::LocalReject);
        Ok(())
    }

    async fn hangup(&self) -> ServiceResult<()> {
        self.shared.record(ServiceOp::Hangup { call_id: self.id });
        self.shared.check(FailurePoint::Hangup)?;
        self.disconnect(DisconnectReason::LocalHangup);
        Ok(())
    }
}

/// Something the coordinator told the loopback call UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallUiReport {
    Incoming { call_id: CallId, update: CallUpdate },
    OutgoingStartedConnecting { call_id: CallId, at: DateTime<Utc> },
    Ended { call_id: CallId, at: DateTime<Utc>, reason: EndedReason },
    Transaction(CallUiAction),
}

/// Call-UI request the loopback sink can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallUiFailure {
    ReportIncoming,
    Transaction,
}

/// Resolved action, as seen by the loopback sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAction {
    pub kind: ActionKind,
    pub call_id: CallId,
    pub outcome: ActionOutcome,
}

/// Hand `kind` for `call_id` to the coordinator and wait for its resolution
pub async fn drive_action(coordinator: &CallCoordinator, kind: ActionKind, call_id: CallId) -> ActionOutcome {
    let (action, outcome) = PendingAction::new(kind, call_id);
    match kind {
        ActionKind::Start => coordinator.perform_start(action),
        ActionKind::Answer => coordinator.perform_answer(action).await,
        ActionKind::End => coordinator.perform_end(action),
    }
    outcome.await.unwrap_or(ActionOutcome::Failed)
}

/// In-memory [`CallUiSink`]
#[derive(Debug, Default)]
pub struct LoopbackCallUi {
    reports: Mutex<Vec<CallUiReport>>,
    failures: Mutex<HashSet<CallUiFailure>>,
    resolved: Arc<Mutex<Vec<ResolvedAction>>>,
    coordinator: Mutex<Option<Weak<CallCoordinator>>>,
    answer_incoming: Mutex<bool>,
}

impl LoopbackCallUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform requested transactions on `coordinator`, as the platform would
    pub fn attach(&self, coordinator: &Arc<CallCoordinator>) {
        *self.coordinator.lock() = Some(Arc::downgrade(coordinator));
    }

    /// When attached, answer every reported incoming call
    pub fn set_answer_incoming(&self, enable: bool) {
        *self.answer_incoming.lock() = enable;
    }

    pub fn fail(&self, failure: CallUiFailure) {
        self.failures.lock().insert(failure);
    }

    pub fn clear_failure(&self, failure: CallUiFailure) {
        self.failures.lock().remove(&failure);
    }

    pub fn reports(&self) -> Vec<CallUiReport> {
        self.reports.lock().clone()
    }

    /// Transactions requested so far
    pub fn transactions(&self) -> Vec<CallUiAction> {
        self.reports
            .lock()
            .iter()
            .filter_map(|r| match r {
                CallUiReport::Transaction(action) => Some(action.clone()),
                _ => None,
            })
            .collect()
    }

    /// Actions performed on the attached coordinator and how they resolved
    pub fn resolved(&self) -> Vec<ResolvedAction> {
        self.resolved.lock().clone()
    }

    fn failing(&self, failure: CallUiFailure) -> bool {
        self.failures.lock().contains(&failure)
    }

    /// Perform `kind` on the attached coordinator in the background
    fn perform(&self, kind: ActionKind, call_id: CallId) {
        let Some(coordinator) = self.coordinator.lock().clone() else {
            return;
        };
        let resolved = self.resolved.clone();
        tokio::spawn(async move {
            let Some(coordinator) = coordinator.upgrade() else {
                return;
            };
            let outcome = drive_action(&coordinator, kind, call_id).await;
            resolved.lock().push(ResolvedAction { kind, call_id, outcome });
        });
    }
}

#[async_trait]
impl CallUiSink for LoopbackCallUi {
    async fn report_incoming_call(&self, call_id: CallId, update: CallUpdate) -> CallUiResult<()> {
        self.reports.lock().push(CallUiReport::Incoming { call_id, update });
        if self.failing(CallUiFailure::ReportIncoming) {
            return Err(CallUiError::Refused {
                reason: "injected failure".to_string(),
            });
        }
        if *self.answer_incoming.lock() {
            self.perform(ActionKind::Answer, call_id);
        }
        Ok(())
    }

    fn report_outgoing_started_connecting(&self, call_id: CallId, at: DateTime<Utc>) {
        self.reports
            .lock()
            .push(CallUiReport::OutgoingStartedConnecting { call_id, at });
    }

    fn report_call_ended(&self, call_id: CallId, at: DateTime<Utc>, reason: EndedReason) {
        self.reports.lock().push(CallUiReport::Ended { call_id, at, reason });
    }

    async fn request_transaction(&self, action: CallUiAction) -> CallUiResult<()> {
        self.reports.lock().push(CallUiReport::Transaction(action.clone()));
        if self.failing(CallUiFailure::Transaction) {
            return Err(CallUiError::TransactionFailed {
                reason: "injected failure".to_string(),
            });
        }
        let kind = match action {
            CallUiAction::StartCall { .. } => ActionKind::Start,
            CallUiAction::EndCall { .. } => ActionKind::End,
        };
        self.perform(kind, action.call_id());
        Ok(())
    }
}
