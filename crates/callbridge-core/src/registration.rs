//! Device registration state
//!
//! Registration with the calling service is a prerequisite for outgoing calls.
//! It happens once after authorization and is undone at teardown.
//!
//! ```rust
//! use callbridge_core::registration::RegistrationState;
//!
//! let state = RegistrationState::Registered;
//! assert!(state.is_registered());
//! assert_eq!(state.to_string(), "registered");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Registration with the calling service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Not registered; also the state after a failed attempt
    #[default]
    Unregistered,

    /// A register request is in flight
    Registering,

    /// The service accepted the registration
    ///
    /// Outgoing calls are allowed only in this state.
    Registered,
}

impl RegistrationState {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationState::Registered)
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationState::Unregistered => write!(f, "unregistered"),
            RegistrationState::Registering => write!(f, "registering"),
            RegistrationState::Registered => write!(f, "registered"),
        }
    }
}
