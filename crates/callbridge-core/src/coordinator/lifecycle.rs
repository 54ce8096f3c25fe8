//! Authorization, registration and teardown

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{CallCoordinator, SessionState};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::CoordinatorEvent;
use crate::registration::RegistrationState;
use crate::timeout::with_timeout;

impl CallCoordinator {
    /// Authorize with `token`, start observing the service, and register
    ///
    /// An invalid token leaves the coordinator unregistered and returns
    /// [`CoordinatorError::NotAuthorized`]; a later [`start`](Self::start) with
    /// a good token can still succeed.
    pub async fn start(self: &Arc<Self>, token: &str) -> CoordinatorResult<()> {
        self.ensure_running()?;

        self.authenticator.authorize(token);
        self.start_event_loop();

        if !self.authenticator.is_authorized() {
            warn!("Token rejected, not registering");
            return Err(CoordinatorError::not_authorized("token is missing or invalid"));
        }

        self.register().await
    }

    /// Register the device with the calling service
    ///
    /// Does nothing when already registered or registering. On failure the
    /// coordinator stays unregistered and this can simply be called again.
    pub async fn register(&self) -> CoordinatorResult<()> {
        self.ensure_running()?;

        if !self.authenticator.is_authorized() {
            warn!("Register requested without a valid token");
            return Err(CoordinatorError::not_authorized("no valid token stored"));
        }

        let proceed = self.update(|inner| match inner.registration {
            RegistrationState::Unregistered => {
                inner.registration = RegistrationState::Registering;
                true
            }
            RegistrationState::Registering | RegistrationState::Registered => false,
        });
        if !proceed {
            debug!(state = %self.registration_state(), "Registration already in progress or done");
            return Ok(());
        }
        self.publish(CoordinatorEvent::RegistrationChanged {
            state: RegistrationState::Registering,
            error: None,
        });

        let result = with_timeout("register", self.config.operation_timeout(), async {
            self.service
                .register()
                .await
                .map_err(|e| CoordinatorError::RegistrationFailed { reason: e.to_string() })
        })
        .await;

        let result = result.and_then(|()| self.ensure_running());
        match result {
            Ok(()) => {
                self.update(|inner| inner.registration = RegistrationState::Registered);
                info!("Registered with the calling service");
                self.publish(CoordinatorEvent::RegistrationChanged {
                    state: RegistrationState::Registered,
                    error: None,
                });
                if self.config.capabilities.supports_video {
                    debug!("Requesting video codec activation");
                    self.service.request_codec_activation();
                }
                Ok(())
            }
            Err(e) => {
                self.update(|inner| inner.registration = RegistrationState::Unregistered);
                warn!(error = %e, category = e.category(), "Registration failed");
                self.publish(CoordinatorEvent::RegistrationChanged {
                    state: RegistrationState::Unregistered,
                    error: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    /// Tear down: end any call, deregister, forget the token, stop tasks
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Coordinator already shut down");
            return;
        }
        info!("Shutting down call coordinator");

        self.hangup_or_reject();

        let was_registered = self.update(|inner| {
            // abandon a dial in flight; its result is hung up when it lands
            if inner.state == SessionState::Dialing {
                inner.state = SessionState::Idle;
            }
            let was = inner.registration;
            inner.registration = RegistrationState::Unregistered;
            was != RegistrationState::Unregistered
        });

        if was_registered {
            let result = with_timeout("deregister", self.config.operation_timeout(), async {
                self.service
                    .deregister()
                    .await
                    .map_err(|e| CoordinatorError::RegistrationFailed { reason: e.to_string() })
            })
            .await;
            if let Err(e) = result {
                warn!(error = %e, "Deregistration failed");
            }
            self.publish(CoordinatorEvent::RegistrationChanged {
                state: RegistrationState::Unregistered,
                error: None,
            });
        }

        self.authenticator.deauthorize();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("Call coordinator shut down");
    }
}
