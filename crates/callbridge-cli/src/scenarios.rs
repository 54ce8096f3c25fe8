//! Scripted call scenarios
//!
//! The remote party is simulated through the loopback service; the local user
//! acts through the coordinator the way button taps would.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use callbridge_core::sim::FailurePoint;
use callbridge_core::{CallHandle, SessionState};

use crate::Session;

/// Pause between scripted steps so the output reads like a call
const STEP: Duration = Duration::from_millis(400);

/// Longest a scenario waits for the coordinator to reach a state
const STATE_TIMEOUT: Duration = Duration::from_secs(5);

async fn wait_until(session: &Session, what: &str, condition: impl Fn(SessionState) -> bool) -> Result<()> {
    let reached = tokio::time::timeout(STATE_TIMEOUT, async {
        while !condition(session.coordinator.state()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if reached.is_err() {
        bail!("coordinator did not reach {what} (still {})", session.coordinator.state());
    }
    Ok(())
}

async fn wait_for_state(session: &Session, expected: SessionState) -> Result<()> {
    wait_until(session, &expected.to_string(), |state| state == expected).await
}

/// Call the peer, let them answer, talk, and have them hang up
pub async fn outgoing(session: &Session, talk_secs: u64) -> Result<()> {
    let peer = session.user.user_to_call();
    println!("== {} calls {}", session.user, peer);

    let call_id = session.coordinator.call_user(peer).await.context("placing the call")?;
    let call = session
        .service
        .call(call_id)
        .context("dialed call is unknown to the service")?;

    tokio::time::sleep(STEP).await;
    call.ring();
    tokio::time::sleep(STEP).await;
    call.connect();
    wait_for_state(session, SessionState::Connected).await?;

    tokio::time::sleep(Duration::from_secs(talk_secs)).await;
    println!("== {peer} hangs up");
    call.remote_hangup();
    wait_for_state(session, SessionState::Idle).await
}

/// The peer calls in; the call is answered, then ended locally
pub async fn incoming(session: &Session, talk_secs: u64) -> Result<()> {
    let peer = session.user.user_to_call();
    println!("== {} calls {}", peer, session.user);

    let realm = &session.coordinator.config().realm;
    let call = session.service.push_incoming(peer.calling_id(realm));
    // the platform call UI or auto-answer may pick up right away
    wait_until(session, "the incoming call", |state| {
        matches!(
            state,
            SessionState::IncomingRinging | SessionState::Connecting | SessionState::Connected
        )
    })
    .await
    .with_context(|| format!("incoming call {} was not adopted", call.id()))?;

    let answered_elsewhere = session.call_ui.is_some() || session.coordinator.config().auto_answer;
    if !answered_elsewhere {
        tokio::time::sleep(STEP).await;
        println!("== {} taps answer", session.user);
        session.coordinator.answer_call().await.context("answering")?;
    }
    wait_for_state(session, SessionState::Connected).await?;

    tokio::time::sleep(Duration::from_secs(talk_secs)).await;
    println!("== {} taps end call", session.user);
    session.coordinator.end_call().await;
    wait_for_state(session, SessionState::Idle).await
}

/// The peer calls in and the local user declines before answering
pub async fn decline(session: &Session) -> Result<()> {
    let peer = session.user.user_to_call();
    println!("== {} calls {}, {} declines", peer, session.user, session.user);

    if let Some(call_ui) = &session.call_ui {
        call_ui.set_answer_incoming(false);
    }
    if session.coordinator.config().auto_answer {
        println!("   (auto-answer is on, the call will be answered before it can be declined)");
    }

    let realm = &session.coordinator.config().realm;
    session.service.push_incoming(peer.calling_id(realm));
    let result = async {
        wait_until(session, "the incoming call", |state| state != SessionState::Idle).await?;
        tokio::time::sleep(STEP).await;
        println!("== {} taps end call", session.user);
        session.coordinator.end_call().await;
        wait_for_state(session, SessionState::Idle).await
    }
    .await;

    if let Some(call_ui) = &session.call_ui {
        call_ui.set_answer_incoming(true);
    }
    result
}

/// Dialing fails; the coordinator goes back to idle with the call button enabled
pub async fn dial_failure(session: &Session) -> Result<()> {
    let peer = session.user.user_to_call();
    println!("== {} calls {} but the network is down", session.user, peer);

    session.service.fail(FailurePoint::Dial);
    let result = session.coordinator.call_user(peer).await;
    session.service.clear_failure(FailurePoint::Dial);

    match result {
        Ok(call_id) => bail!("dial unexpectedly succeeded ({call_id})"),
        Err(e) => println!("   dial failed as expected: {e}"),
    }
    if !session.coordinator.affordances().call_enabled {
        bail!("call button was not re-enabled after the failed dial");
    }
    Ok(())
}

/// Every scenario in turn
pub async fn demo(session: &Session) -> Result<()> {
    outgoing(session, 1).await?;
    incoming(session, 1).await?;
    decline(session).await?;
    dial_failure(session).await?;

    if let Some(call_ui) = &session.call_ui {
        println!(
            "== platform call UI saw {} reports, resolved {} actions",
            call_ui.reports().len(),
            call_ui.resolved().len()
        );
    }
    Ok(())
}
