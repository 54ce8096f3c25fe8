//! Outgoing call lifecycle through the coordinator

mod common;

use std::sync::Arc;
use std::time::Duration;

use callbridge_core::call_ui::EndedReason;
use callbridge_core::sim::{drive_action, CallUiFailure, CallUiReport, FailurePoint, ServiceOp};
use callbridge_core::{
    ActionKind, ActionOutcome, CallDirection, CallId, CallUiAction, Capabilities, CoordinatorError, CoordinatorEvent,
    MediaOptions, SessionState, User,
};
use common::{drain, eventually, settle, Harness, REALM};

#[tokio::test]
async fn test_outgoing_call_connects_and_ends_remotely() {
    let h = Harness::started(Capabilities::full()).await;
    assert!(h.coordinator.affordances().call_enabled);

    let call_id = h.coordinator.call_user(User::Xavier).await.unwrap();

    assert_eq!(h.coordinator.state(), SessionState::Ringing);
    let affordances = h.coordinator.affordances();
    assert!(affordances.end_call_visible);
    assert!(!affordances.call_enabled);
    let active = h.coordinator.active_call().unwrap();
    assert_eq!(active.call_id, call_id);
    assert_eq!(active.direction, CallDirection::Outgoing);
    assert_eq!(active.remote_label(), "Xavier");

    let call = h.service.call(call_id).unwrap();
    call.ring();
    call.connect();

    let ui = h.ui().clone();
    eventually("outgoing connecting report", || {
        ui.reports()
            .iter()
            .any(|r| matches!(r, CallUiReport::OutgoingStartedConnecting { call_id: id, .. } if *id == call_id))
    })
    .await;
    assert_eq!(h.coordinator.state(), SessionState::Connected);
    assert!(h.coordinator.active_call().unwrap().connected_at.is_some());

    call.remote_hangup();

    let coordinator = h.coordinator.clone();
    eventually("idle after remote hangup", || coordinator.state() == SessionState::Idle).await;
    let affordances = h.coordinator.affordances();
    assert!(affordances.call_enabled);
    assert!(!affordances.end_call_visible);
    assert!(!affordances.media_visible);
    assert!(h.coordinator.active_call().is_none());

    assert!(h.ui().reports().iter().any(|r| matches!(
        r,
        CallUiReport::Ended { call_id: id, reason: EndedReason::RemoteEnded, .. } if *id == call_id
    )));
}

#[tokio::test]
async fn test_dial_targets_calling_id_with_capability_media() {
    let h = Harness::started(Capabilities::audio_only()).await;

    h.coordinator.call_user(User::Xavier).await.unwrap();

    let expected = ServiceOp::Dial {
        target: format!("xavier@{REALM}"),
        media: MediaOptions::AudioOnly,
    };
    assert!(h.service.operations().contains(&expected));
}

#[tokio::test]
async fn test_start_transaction_follows_successful_dial() {
    let h = Harness::started(Capabilities::full()).await;

    let call_id = h.coordinator.call_user(User::Xavier).await.unwrap();

    let transactions = h.ui().transactions();
    assert_eq!(transactions.len(), 1);
    match &transactions[0] {
        CallUiAction::StartCall { call_id: id, handle, is_video } => {
            assert_eq!(*id, call_id);
            assert_eq!(handle.value, "Xavier");
            assert!(*is_video);
        }
        other => panic!("unexpected transaction {other:?}"),
    }
}

#[tokio::test]
async fn test_dial_failure_returns_to_idle_without_transaction() {
    let h = Harness::started(Capabilities::full()).await;
    let mut events = h.events();
    h.service.fail(FailurePoint::Dial);

    let err = h.coordinator.call_user(User::Xavier).await.unwrap_err();

    assert!(matches!(err, CoordinatorError::DialFailed { .. }));
    assert!(err.is_recoverable());
    assert_eq!(h.coordinator.state(), SessionState::Idle);
    assert!(h.coordinator.active_call().is_none());
    assert!(h.coordinator.affordances().call_enabled);
    assert!(h.ui().transactions().is_empty());
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, CoordinatorEvent::CallFailed { .. })));

    h.service.clear_failure(FailurePoint::Dial);
    assert!(h.coordinator.call_user(User::Xavier).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_dial_timeout_is_reported_as_dial_failure() {
    let h = Harness::started(Capabilities::full()).await;
    h.service.set_dial_delay(Some(Duration::from_secs(10)));

    let err = h.coordinator.call_user(User::Xavier).await.unwrap_err();

    match err {
        CoordinatorError::DialFailed { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected dial failure, got {other:?}"),
    }
    assert_eq!(h.coordinator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_second_start_call_never_replaces_active_call() {
    let h = Harness::started(Capabilities::full()).await;
    let first = h.coordinator.call_user(User::Xavier).await.unwrap();

    let err = h.coordinator.call_user(User::Xavier).await.unwrap_err();

    assert_eq!(err, CoordinatorError::AlreadyInCall { call_id: Some(first) });
    assert_eq!(h.coordinator.active_call_id(), Some(first));
    assert_eq!(h.count(|op| matches!(op, ServiceOp::Dial { .. })), 1);
}

#[tokio::test]
async fn test_start_call_while_dialing_is_rejected() {
    let h = Harness::started(Capabilities::full()).await;
    h.service.set_dial_delay(Some(Duration::from_millis(200)));

    let coordinator = h.coordinator.clone();
    let first = tokio::spawn(async move { coordinator.call_user(User::Xavier).await });

    let coordinator = h.coordinator.clone();
    eventually("dialing", || coordinator.state() == SessionState::Dialing).await;
    assert!(!h.coordinator.affordances().call_enabled);

    let err = h.coordinator.call_user(User::Xavier).await.unwrap_err();
    assert_eq!(err, CoordinatorError::AlreadyInCall { call_id: None });

    let first_id = first.await.unwrap().unwrap();
    assert_eq!(h.coordinator.active_call_id(), Some(first_id));
}

#[tokio::test]
async fn test_start_call_requires_registration() {
    let h = Harness::with_capabilities(Capabilities::full());

    let err = h.coordinator.call_user(User::Xavier).await.unwrap_err();

    assert_eq!(err, CoordinatorError::NotRegistered);
    assert_eq!(h.count(|op| matches!(op, ServiceOp::Dial { .. })), 0);
}

#[tokio::test]
async fn test_end_call_without_active_call_is_noop() {
    let h = Harness::started(Capabilities::full()).await;

    h.coordinator.end_call().await;
    settle().await;

    assert_eq!(h.hangups() + h.rejects(), 0);
    assert!(h.ui().transactions().is_empty());
    assert_eq!(h.coordinator.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_end_call_goes_through_platform_transaction() {
    let h = Harness::started(Capabilities::full()).await;
    h.attach_ui();
    let call_id = h.coordinator.call_user(User::Xavier).await.unwrap();

    h.coordinator.end_call().await;

    let ui = h.ui().clone();
    eventually("end action resolved", || {
        ui.resolved()
            .iter()
            .any(|a| a.kind == ActionKind::End && a.outcome == ActionOutcome::Fulfilled)
    })
    .await;
    assert!(h.ui().transactions().contains(&CallUiAction::EndCall { call_id }));
    assert_eq!(h.coordinator.state(), SessionState::Idle);
    eventually("hangup sent", || h.hangups() == 1).await;
    assert_eq!(h.rejects(), 0);
}

#[tokio::test]
async fn test_end_call_falls_back_when_transaction_fails() {
    let h = Harness::started(Capabilities::full()).await;
    h.coordinator.call_user(User::Xavier).await.unwrap();
    h.ui().fail(CallUiFailure::Transaction);

    h.coordinator.end_call().await;

    assert_eq!(h.coordinator.state(), SessionState::Idle);
    assert!(h.coordinator.active_call().is_none());
    eventually("hangup sent", || h.hangups() == 1).await;
}

#[tokio::test]
async fn test_end_call_without_platform_ui_hangs_up_directly() {
    let h = Harness::started(Capabilities::video_without_call_ui()).await;
    h.coordinator.call_user(User::Xavier).await.unwrap();

    h.coordinator.end_call().await;

    assert_eq!(h.coordinator.state(), SessionState::Idle);
    eventually("hangup sent", || h.hangups() == 1).await;
}

#[tokio::test]
async fn test_cleanup_runs_once_per_call() {
    let h = Harness::started(Capabilities::full()).await;
    let mut events = h.events();
    let call_id = h.coordinator.call_user(User::Xavier).await.unwrap();

    // local hangup cleans up now; the service's own disconnect arrives later
    assert_eq!(h.coordinator.hangup_or_reject(), Some(call_id));
    assert_eq!(h.coordinator.hangup_or_reject(), None);
    eventually("hangup sent", || h.hangups() == 1).await;
    settle().await;

    let ended: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, CoordinatorEvent::CallEnded { .. }))
        .collect();
    assert_eq!(ended.len(), 1);

    // the platform asked for this end, so it is not told again
    assert!(!h
        .ui()
        .reports()
        .iter()
        .any(|r| matches!(r, CallUiReport::Ended { .. })));
}

#[tokio::test]
async fn test_hangup_failure_still_cleans_up() {
    let h = Harness::started(Capabilities::full()).await;
    h.service.fail(FailurePoint::Hangup);
    h.coordinator.call_user(User::Xavier).await.unwrap();

    h.coordinator.hangup_or_reject();

    assert_eq!(h.coordinator.state(), SessionState::Idle);
    assert!(h.coordinator.affordances().call_enabled);
    eventually("hangup attempted", || h.hangups() == 1).await;
}

#[tokio::test]
async fn test_perform_start_checks_active_call() {
    let h = Harness::started(Capabilities::full()).await;
    let call_id = h.coordinator.call_user(User::Xavier).await.unwrap();

    let outcome = drive_action(&h.coordinator, ActionKind::Start, call_id).await;
    assert_eq!(outcome, ActionOutcome::Fulfilled);

    let outcome = drive_action(&h.coordinator, ActionKind::Start, CallId::new_v4()).await;
    assert_eq!(outcome, ActionOutcome::Failed);
}

#[tokio::test]
async fn test_attached_ui_fulfills_start_transaction() {
    let h = Harness::started(Capabilities::full()).await;
    h.attach_ui();

    let call_id = h.coordinator.call_user(User::Xavier).await.unwrap();

    let ui = h.ui().clone();
    eventually("start action resolved", || !ui.resolved().is_empty()).await;
    let resolved = h.ui().resolved();
    assert_eq!(resolved[0].kind, ActionKind::Start);
    assert_eq!(resolved[0].call_id, call_id);
    assert_eq!(resolved[0].outcome, ActionOutcome::Fulfilled);
}

#[tokio::test]
async fn test_affordance_watch_follows_call() {
    let h = Harness::started(Capabilities::full()).await;
    let mut watch = h.coordinator.subscribe_affordances();
    assert!(watch.borrow_and_update().call_enabled);

    let coordinator = Arc::clone(&h.coordinator);
    coordinator.call_user(User::Xavier).await.unwrap();

    watch.changed().await.unwrap();
    let current = *watch.borrow_and_update();
    assert!(current.end_call_visible);
    assert!(current.media_visible);
    assert!(!current.call_enabled);
}

#[tokio::test]
async fn test_stale_end_action_leaves_newer_call_alone() {
    let h = Harness::started(Capabilities::full()).await;
    let first = h.coordinator.call_user(User::Xavier).await.unwrap();
    h.coordinator.hangup_or_reject();
    let second = h.coordinator.call_user(User::Xavier).await.unwrap();

    let outcome = drive_action(&h.coordinator, ActionKind::End, first).await;

    assert_eq!(outcome, ActionOutcome::Fulfilled);
    assert_eq!(h.coordinator.active_call_id(), Some(second));
    assert_eq!(h.coordinator.state(), SessionState::Ringing);
    settle().await;
    assert!(!h.service.operations().contains(&ServiceOp::Hangup { call_id: second }));
}
