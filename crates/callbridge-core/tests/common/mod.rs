//! Shared setup for coordinator integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use callbridge_core::sim::{guest_token, LoopbackCallUi, LoopbackCallingService, ServiceOp};
use callbridge_core::{CallCoordinator, Capabilities, CoordinatorBuilder, CoordinatorConfig, CoordinatorEvent};
use tokio::sync::broadcast;

pub const REALM: &str = "callbridge.local";

/// A coordinator wired to the loopback service and, when enabled, the loopback call UI
pub struct Harness {
    pub coordinator: Arc<CallCoordinator>,
    pub service: Arc<LoopbackCallingService>,
    pub call_ui: Option<Arc<LoopbackCallUi>>,
}

impl Harness {
    pub fn new(config: CoordinatorConfig) -> Self {
        let service = Arc::new(LoopbackCallingService::new());
        let mut builder = CoordinatorBuilder::new().config(config.clone()).service(service.clone());

        let call_ui = if config.capabilities.supports_platform_call_ui {
            let call_ui = Arc::new(LoopbackCallUi::new());
            builder = builder.call_ui(call_ui.clone());
            Some(call_ui)
        } else {
            None
        };

        let coordinator = builder.build().expect("valid test configuration");
        Self {
            coordinator,
            service,
            call_ui,
        }
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self::new(
            CoordinatorConfig::new()
                .with_capabilities(capabilities)
                .with_realm(REALM)
                .with_operation_timeout(Duration::from_secs(2)),
        )
    }

    /// Built and registered as Wilma
    pub async fn started(capabilities: Capabilities) -> Self {
        let harness = Self::with_capabilities(capabilities);
        harness.start().await;
        harness
    }

    pub async fn start(&self) {
        let token = guest_token("wilma").expect("token");
        self.coordinator.start(&token).await.expect("start");
    }

    /// The call UI, which must be enabled
    pub fn ui(&self) -> &Arc<LoopbackCallUi> {
        self.call_ui.as_ref().expect("platform call UI enabled")
    }

    /// Let the call UI perform requested actions on the coordinator
    pub fn attach_ui(&self) {
        self.ui().attach(&self.coordinator);
    }

    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.coordinator.subscribe_events()
    }

    pub fn count(&self, predicate: impl Fn(&ServiceOp) -> bool) -> usize {
        self.service.count(predicate)
    }

    pub fn rejects(&self) -> usize {
        self.count(|op| matches!(op, ServiceOp::Reject { .. }))
    }

    pub fn hangups(&self) -> usize {
        self.count(|op| matches!(op, ServiceOp::Hangup { .. }))
    }
}

/// Wait until `condition` holds, failing the test after two seconds
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

/// Give background tasks a chance to run before asserting that nothing happened
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Drain every event currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
