//! Call session coordinator
//!
//! [`CallCoordinator`] owns at most one active call and translates between the
//! calling service, the platform call UI and the presentation layer.
//!
//! # State machine
//!
//! ```text
//!            start_call                dial ok
//!   Idle ──────────────▶ Dialing ──────────────▶ Ringing ──Connected──▶ Connected
//!    ▲ ▲                   │ dial failed                                   │
//!    │ └───────────────────┘                                               │
//!    │       incoming            perform_answer         answer ok          │
//!    │  Idle ─────────▶ IncomingRinging ─────────▶ Connecting ─────────────┤
//!    │                        ▲                        │ answer failed     │
//!    │                        └────────────────────────┘                   │
//!    └─────────────────────── Disconnected (any state) ◀───────────────────┘
//! ```
//!
//! Every way a call can end (remote hangup, local hangup, reject, failure)
//! goes through one cleanup routine keyed on the call id. Running it twice for
//! the same call, or for a call that is no longer active, does nothing.
//!
//! # Concurrency
//!
//! The coordinator is shared as `Arc<CallCoordinator>`. State sits behind a
//! `parking_lot::Mutex` that is never held across an `.await`. Events pushed by
//! the calling service (incoming calls, per-call events) are processed in order
//! by a single event-loop task.
//!
//! # Example
//!
//! ```rust
//! use callbridge_core::coordinator::config::{Capabilities, CoordinatorConfig};
//! use callbridge_core::sim::{guest_token, LoopbackCallingService};
//! use callbridge_core::{CoordinatorBuilder, User};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(LoopbackCallingService::new());
//! let coordinator = CoordinatorBuilder::new()
//!     .config(CoordinatorConfig::new().with_capabilities(Capabilities::video_without_call_ui()))
//!     .service(service.clone())
//!     .build()?;
//!
//! coordinator.start(&guest_token("wilma")?).await?;
//! assert!(coordinator.affordances().call_enabled);
//!
//! let call_id = coordinator.call_user(User::Xavier).await?;
//! assert_eq!(coordinator.active_call().map(|c| c.call_id), Some(call_id));
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
mod calls;
pub mod config;
mod event_loop;
mod lifecycle;
mod provider;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::call::{CallId, CallInfo};
use crate::call_ui::CallUiSink;
use crate::credentials::Authenticator;
use crate::directory::{Participant, User};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::events::CoordinatorEvent;
use crate::registration::RegistrationState;
use crate::service::{CallHandle, CallingService};

use event_loop::LoopMessage;

pub use builder::CoordinatorBuilder;
pub use config::{Capabilities, CoordinatorConfig};
pub use state::{Affordances, SessionState};

/// The call currently owned by the coordinator
struct ActiveCall {
    handle: Arc<dyn CallHandle>,
    info: CallInfo,
}

/// Mutable coordinator state
struct Inner {
    state: SessionState,
    registration: RegistrationState,
    active: Option<ActiveCall>,
}

impl Inner {
    /// The active call, if it has the given id
    fn active_matching(&mut self, call_id: CallId) -> Option<&mut ActiveCall> {
        self.active.as_mut().filter(|a| a.info.call_id == call_id)
    }

    /// Move the coordinator and the active call record to `state`
    fn set_call_state(&mut self, state: SessionState) {
        self.state = state;
        if let Some(active) = self.active.as_mut() {
            active.info.state = state;
        }
    }
}

/// Coordinates the single active call between the calling service, the
/// platform call UI and the presentation layer
pub struct CallCoordinator {
    config: CoordinatorConfig,
    authenticator: Arc<dyn Authenticator>,
    service: Arc<dyn CallingService>,
    call_ui: Option<Arc<dyn CallUiSink>>,

    inner: Mutex<Inner>,
    affordances_tx: watch::Sender<Affordances>,
    event_tx: broadcast::Sender<CoordinatorEvent>,

    loop_tx: mpsc::UnboundedSender<LoopMessage>,
    loop_rx: Mutex<Option<mpsc::UnboundedReceiver<LoopMessage>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for CallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CallCoordinator")
            .field("state", &inner.state)
            .field("registration", &inner.registration)
            .field("active_call", &inner.active.as_ref().map(|a| a.info.call_id))
            .field("has_call_ui", &self.call_ui.is_some())
            .finish()
    }
}

impl CallCoordinator {
    pub(crate) fn new(
        config: CoordinatorConfig,
        authenticator: Arc<dyn Authenticator>,
        service: Arc<dyn CallingService>,
        call_ui: Option<Arc<dyn CallUiSink>>,
    ) -> Arc<Self> {
        let initial = Affordances::derive(
            RegistrationState::Unregistered,
            SessionState::Idle,
            config.capabilities.supports_video,
        );
        let (affordances_tx, _) = watch::channel(initial);
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();

        Arc::new(Self {
            config,
            authenticator,
            service,
            call_ui,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                registration: RegistrationState::Unregistered,
                active: None,
            }),
            affordances_tx,
            event_tx,
            loop_tx,
            loop_rx: Mutex::new(Some(loop_rx)),
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.config.capabilities
    }

    /// Current affordances
    pub fn affordances(&self) -> Affordances {
        *self.affordances_tx.borrow()
    }

    /// Watch affordance changes
    pub fn subscribe_affordances(&self) -> watch::Receiver<Affordances> {
        self.affordances_tx.subscribe()
    }

    /// Subscribe to coordinator events
    pub fn subscribe_events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.inner.lock().registration
    }

    /// Snapshot of the active call
    pub fn active_call(&self) -> Option<CallInfo> {
        self.inner.lock().active.as_ref().map(|a| a.info.clone())
    }

    pub fn active_call_id(&self) -> Option<CallId> {
        self.inner.lock().active.as_ref().map(|a| a.info.call_id)
    }

    pub fn is_authorized(&self) -> bool {
        self.authenticator.is_authorized()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Directory entry for a known user in the configured realm
    pub fn participant(&self, user: User) -> Participant {
        user.participant(&self.config.realm)
    }

    /// Participant for a calling id, with a display name when it is a known user
    fn remote_participant(&self, remote_id: &str) -> Participant {
        match User::from_calling_id(remote_id) {
            Some(user) => Participant::new(remote_id).with_display_name(user.display_name()),
            None => Participant::new(remote_id),
        }
    }

    fn ensure_running(&self) -> CoordinatorResult<()> {
        if self.is_shut_down() {
            return Err(CoordinatorError::ShutDown);
        }
        Ok(())
    }

    /// Mutate state, then republish affordances and the state transition
    ///
    /// Publishing happens under the lock so observers see changes in order.
    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        let previous_call = inner.active.as_ref().map(|a| a.info.call_id);

        let result = f(&mut inner);

        let affordances = Affordances::derive(
            inner.registration,
            inner.state,
            self.config.capabilities.supports_video,
        );
        self.affordances_tx.send_if_modified(|current| {
            if *current == affordances {
                return false;
            }
            *current = affordances;
            true
        });

        if previous != inner.state {
            let call_id = inner.active.as_ref().map(|a| a.info.call_id).or(previous_call);
            debug!(?call_id, from = %previous, to = %inner.state, "State changed");
            self.publish(CoordinatorEvent::StateChanged {
                call_id,
                previous,
                current: inner.state,
            });
        }
        result
    }

    fn publish(&self, event: CoordinatorEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn track_task(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}
