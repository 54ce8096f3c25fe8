//! Builder for [`CallCoordinator`]

use std::sync::Arc;
use std::time::Duration;

use super::config::{Capabilities, CoordinatorConfig};
use super::CallCoordinator;
use crate::call_ui::CallUiSink;
use crate::credentials::{Authenticator, JwtAuthenticator};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::service::CallingService;

/// Assembles a coordinator from configuration and its collaborators
///
/// A calling service is required. A call-UI sink is required exactly when the
/// capabilities enable the platform call UI. The authenticator defaults to a
/// [`JwtAuthenticator`].
///
/// ```rust
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use callbridge_core::{Capabilities, CoordinatorBuilder};
/// # use callbridge_core::sim::{guest_token, LoopbackCallingService};
/// # tokio_test::block_on(async {
/// let coordinator = CoordinatorBuilder::new()
///     .capabilities(Capabilities::video_without_call_ui())
///     .realm("clinic.example")
///     .operation_timeout(Duration::from_secs(10))
///     .service(Arc::new(LoopbackCallingService::new()))
///     .build()?;
///
/// coordinator.start(&guest_token("wilma")?).await?;
/// assert!(coordinator.affordances().call_enabled);
/// # Ok::<(), callbridge_core::CoordinatorError>(())
/// # }).unwrap();
/// ```
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    authenticator: Option<Arc<dyn Authenticator>>,
    service: Option<Arc<dyn CallingService>>,
    call_ui: Option<Arc<dyn CallUiSink>>,
}

impl CoordinatorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.config = self.config.with_capabilities(capabilities);
        self
    }

    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = realm.into();
        self
    }

    pub fn auto_answer(mut self, enable: bool) -> Self {
        self.config.auto_answer = enable;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_operation_timeout(timeout);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Set the calling service (required)
    pub fn service(mut self, service: Arc<dyn CallingService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn call_ui(mut self, call_ui: Arc<dyn CallUiSink>) -> Self {
        self.call_ui = Some(call_ui);
        self
    }

    /// Validate and build. The coordinator is idle until [`CallCoordinator::start`].
    pub fn build(self) -> CoordinatorResult<Arc<CallCoordinator>> {
        self.validate()?;

        let service = self
            .service
            .ok_or_else(|| CoordinatorError::invalid_config("service", "a calling service is required"))?;
        let authenticator = self
            .authenticator
            .unwrap_or_else(|| Arc::new(JwtAuthenticator::new()));

        Ok(CallCoordinator::new(self.config, authenticator, service, self.call_ui))
    }

    fn validate(&self) -> CoordinatorResult<()> {
        self.config.validate()?;

        if self.service.is_none() {
            return Err(CoordinatorError::invalid_config("service", "a calling service is required"));
        }

        match (self.config.capabilities.supports_platform_call_ui, self.call_ui.is_some()) {
            (true, false) => Err(CoordinatorError::invalid_config(
                "call_ui",
                "platform call UI is enabled but no sink was provided",
            )),
            (false, true) => Err(CoordinatorError::invalid_config(
                "call_ui",
                "a sink was provided but platform call UI is disabled",
            )),
            _ => Ok(()),
        }
    }
}
