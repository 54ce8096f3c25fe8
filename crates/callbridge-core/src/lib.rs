//! # callbridge-core - Call Session Coordinator
//!
//! This crate keeps a calling SDK and a platform call UI in step for an app
//! that runs one audio/video call at a time:
//!
//! - **calling service**: registration, dialing, answering, hanging up, and the
//!   events a call emits ([`service`])
//! - **platform call UI**: the native in-call screen the app reports calls to
//!   and receives answer/end actions from ([`call_ui`])
//! - **presentation layer**: buttons and media surfaces that reflect derived
//!   [`Affordances`] and forward gestures
//!
//! [`CallCoordinator`] sits in the middle. It owns at most one active call,
//! and every way a call can end converges on a single idempotent cleanup.
//!
//! ## Quick Start
//!
//! ```rust
//! use callbridge_core::sim::{guest_token, LoopbackCallUi, LoopbackCallingService};
//! use callbridge_core::{Capabilities, CoordinatorBuilder, SessionState, User};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = Arc::new(LoopbackCallingService::new());
//!     let call_ui = Arc::new(LoopbackCallUi::new());
//!
//!     let coordinator = CoordinatorBuilder::new()
//!         .capabilities(Capabilities::full())
//!         .service(service.clone())
//!         .call_ui(call_ui.clone())
//!         .build()?;
//!     call_ui.attach(&coordinator);
//!
//!     coordinator.start(&guest_token("wilma")?).await?;
//!     coordinator.call_user(User::Wilma.user_to_call()).await?;
//!     assert_eq!(coordinator.state(), SessionState::Ringing);
//!
//!     coordinator.hangup_or_reject();
//!     assert_eq!(coordinator.state(), SessionState::Idle);
//!
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the state machine, its configuration and builder
//! - [`credentials`]: JWT-backed authorization
//! - [`directory`]: the two known users
//! - [`sim`]: in-memory service and call UI for local runs and tests

pub mod call;
pub mod call_ui;
pub mod coordinator;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod events;
pub mod registration;
pub mod service;
pub mod sim;
pub mod timeout;

pub use call::{CallDirection, CallEvent, CallId, CallInfo, CallStatus, DisconnectReason, MediaOptions};
pub use call_ui::{ActionKind, ActionOutcome, CallUiAction, CallUiSink, PendingAction, ProviderConfiguration};
pub use coordinator::{Affordances, CallCoordinator, Capabilities, CoordinatorBuilder, CoordinatorConfig, SessionState};
pub use credentials::{Authenticator, JwtAuthenticator};
pub use directory::{Participant, User};
pub use error::{CallUiError, CoordinatorError, CoordinatorResult, ServiceError, ServiceResult};
pub use events::CoordinatorEvent;
pub use registration::RegistrationState;
pub use service::{CallHandle, CallingService};
