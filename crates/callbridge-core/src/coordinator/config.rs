//! Coordinator configuration
//!
//! ```rust
//! use callbridge_core::coordinator::config::{Capabilities, CoordinatorConfig};
//!
//! let config = CoordinatorConfig::new()
//!     .with_capabilities(Capabilities::audio_only())
//!     .with_realm("clinic.example.com")
//!     .with_auto_answer(true);
//!
//! assert!(config.validate().is_ok());
//! assert!(config.capabilities.supports_platform_call_ui);
//! assert!(!config.provider.supports_video);
//! ```
//!
//! Configuration can also be read from TOML (or JSON, by file extension):
//!
//! ```rust
//! use callbridge_core::coordinator::config::CoordinatorConfig;
//!
//! let config = CoordinatorConfig::from_toml_str(r#"
//!     realm = "clinic.example.com"
//!     operation_timeout_ms = 5000
//!
//!     [capabilities]
//!     supports_platform_call_ui = true
//!     supports_video = false
//! "#).unwrap();
//!
//! assert_eq!(config.operation_timeout_ms, 5000);
//! assert!(!config.capabilities.supports_video);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::call_ui::ProviderConfiguration;
use crate::error::{CoordinatorError, CoordinatorResult};

/// Default bound on a single calling-service operation
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Default capacity of the coordinator event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// What the host platform offers
///
/// The two flags select between the UI variants: with or without the platform
/// call UI, with or without video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Report calls to, and accept actions from, the platform call UI
    pub supports_platform_call_ui: bool,
    /// Negotiate video and show media surfaces
    pub supports_video: bool,
}

impl Capabilities {
    /// Platform call UI with video
    pub fn full() -> Self {
        Self {
            supports_platform_call_ui: true,
            supports_video: true,
        }
    }

    /// Audio only, with the platform call UI (a sink is still required)
    pub fn audio_only() -> Self {
        Self {
            supports_platform_call_ui: true,
            supports_video: false,
        }
    }

    /// Video, without the platform call UI
    pub fn video_without_call_ui() -> Self {
        Self {
            supports_platform_call_ui: false,
            supports_video: true,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Configuration for [`CallCoordinator`](crate::CallCoordinator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub capabilities: Capabilities,
    /// Handed to the platform call-UI adapter
    pub provider: ProviderConfiguration,
    /// Domain part of calling ids (`name@realm`)
    pub realm: String,
    /// Answer incoming calls immediately when there is no platform call UI
    pub auto_answer: bool,
    /// Upper bound for register / dial / answer, in milliseconds
    pub operation_timeout_ms: u64,
    pub event_channel_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            capabilities: Capabilities::default(),
            provider: ProviderConfiguration::default(),
            realm: "callbridge.local".to_string(),
            auto_answer: false,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capabilities; the provider's video flag follows them
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self.provider.supports_video = capabilities.supports_video;
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfiguration) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn with_auto_answer(mut self, auto_answer: bool) -> Self {
        self.auto_answer = auto_answer;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Bound applied to each calling-service operation
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Check the configuration for values the coordinator cannot work with
    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.realm.trim().is_empty() {
            return Err(CoordinatorError::invalid_config("realm", "must not be empty"));
        }
        if self.realm.contains('@') {
            return Err(CoordinatorError::invalid_config("realm", "must not contain '@'"));
        }
        if self.operation_timeout_ms == 0 {
            return Err(CoordinatorError::invalid_config("operation_timeout_ms", "must be greater than 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(CoordinatorError::invalid_config("event_channel_capacity", "must be greater than 0"));
        }
        if self.provider.localized_name.trim().is_empty() {
            return Err(CoordinatorError::invalid_config("provider.localized_name", "must not be empty"));
        }
        if self.provider.max_calls_per_group != 1 {
            return Err(CoordinatorError::invalid_config(
                "provider.max_calls_per_group",
                "only one call per group is supported",
            ));
        }
        if self.provider.supports_video && !self.capabilities.supports_video {
            return Err(CoordinatorError::invalid_config(
                "provider.supports_video",
                "provider advertises video but capabilities disable it",
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    ///
    /// The provider never advertises video the capabilities turn off, so a
    /// file that only sets `capabilities.supports_video = false` is valid.
    pub fn from_toml_str(contents: &str) -> CoordinatorResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| CoordinatorError::invalid_config("toml", e.to_string()))?;
        config.loaded()
    }

    fn loaded(mut self) -> CoordinatorResult<Self> {
        self.provider.supports_video &= self.capabilities.supports_video;
        self.validate()?;
        Ok(self)
    }

    /// Load a configuration file; `.json` files are parsed as JSON, anything else as TOML
    pub fn from_file(path: impl AsRef<Path>) -> CoordinatorResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::invalid_config("config_file", format!("{}: {e}", path.display()))
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            let config: Self = serde_json::from_str(&contents)
                .map_err(|e| CoordinatorError::invalid_config("json", e.to_string()))?;
            config.loaded()
        } else {
            Self::from_toml_str(&contents)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.capabilities.supports_platform_call_ui);
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn audio_only_capabilities_turn_off_provider_video() {
        let config = CoordinatorConfig::new().with_capabilities(Capabilities::audio_only());
        assert!(!config.provider.supports_video);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = CoordinatorConfig::new().with_realm("").validate().unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidConfiguration { ref field, .. } if field == "realm"));

        let err = CoordinatorConfig::new()
            .with_operation_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("operation_timeout_ms"));

        let mut config = CoordinatorConfig::new();
        config.capabilities.supports_video = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config = CoordinatorConfig::from_toml_str("auto_answer = true\n").unwrap();
        assert!(config.auto_answer);
        assert_eq!(config.realm, "callbridge.local");
        assert_eq!(config.provider.localized_name, "Patient Central");
    }

    #[test]
    fn audio_only_file_without_provider_section_loads() {
        let config = CoordinatorConfig::from_toml_str("[capabilities]\nsupports_video = false\n").unwrap();
        assert!(!config.capabilities.supports_video);
        assert!(!config.provider.supports_video);
        assert_eq!(config.provider.localized_name, "Patient Central");

        // an explicit provider flag cannot outrun the capabilities either
        let config = CoordinatorConfig::from_toml_str(
            "[capabilities]\nsupports_video = false\n\n[provider]\nsupports_video = true\n",
        )
        .unwrap();
        assert!(!config.provider.supports_video);
    }

    #[test]
    fn audio_only_json_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.json");
        std::fs::write(&path, r#"{"capabilities": {"supports_video": false}}"#).unwrap();

        let config = CoordinatorConfig::from_file(&path).unwrap();
        assert!(!config.provider.supports_video);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = CoordinatorConfig::from_toml_str("operation_timeout_ms = \"soon\"").unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn from_file_reads_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("callbridge.toml");
        std::fs::write(&toml_path, "realm = \"clinic.example.com\"\n").unwrap();
        assert_eq!(CoordinatorConfig::from_file(&toml_path).unwrap().realm, "clinic.example.com");

        let json_path = dir.path().join("callbridge.json");
        std::fs::write(&json_path, r#"{"auto_answer": true}"#).unwrap();
        assert!(CoordinatorConfig::from_file(&json_path).unwrap().auto_answer);

        assert!(CoordinatorConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
