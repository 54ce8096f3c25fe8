//! Static user directory
//!
//! The demo deployment knows exactly two people. Each one calls the other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoordinatorError;

/// A remote party: the id the calling service dials, plus a display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Identifier understood by the calling service (`name@realm`)
    pub calling_id: String,
    /// Human readable name
    pub display_name: Option<String>,
}

impl Participant {
    /// Create a participant with no display name
    pub fn new(calling_id: impl Into<String>) -> Self {
        Self {
            calling_id: calling_id.into(),
            display_name: None,
        }
    }

    /// Attach a display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Name to show in the call UI, falling back to the calling id
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.calling_id)
    }
}

/// The two known users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum User {
    Wilma,
    Xavier,
}

impl User {
    /// All known users
    pub const ALL: [User; 2] = [User::Wilma, User::Xavier];

    pub fn display_name(&self) -> &'static str {
        match self {
            User::Wilma => "Wilma",
            User::Xavier => "Xavier",
        }
    }

    /// The peer this user calls
    pub fn user_to_call(&self) -> User {
        match self {
            User::Wilma => User::Xavier,
            User::Xavier => User::Wilma,
        }
    }

    /// Calling-service identifier in the given realm
    pub fn calling_id(&self, realm: &str) -> String {
        format!("{}@{}", self.display_name().to_lowercase(), realm)
    }

    /// Directory entry for this user in the given realm
    pub fn participant(&self, realm: &str) -> Participant {
        Participant::new(self.calling_id(realm)).with_display_name(self.display_name())
    }

    /// Look up a user by calling id
    pub fn from_calling_id(calling_id: &str) -> Option<User> {
        let name = calling_id.split('@').next()?;
        name.parse().ok()
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for User {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wilma" => Ok(User::Wilma),
            "xavier" => Ok(User::Xavier),
            other => Err(CoordinatorError::invalid_config(
                "user",
                format!("unknown user '{other}'"),
            )),
        }
    }
}
