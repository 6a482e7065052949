//! gNMI client configuration

use std::path::Path;
use std::time::Duration;

use orca_common::LoggingConfig;
use serde::{Deserialize, Serialize};

use crate::error::GnmiError;
use crate::gnmi;

/// Path polled when the configuration does not name any.
pub const DEFAULT_PATH: &str = "/openconfig-interfaces:interfaces/interface[name=Ethernet0]/config";

/// Top-level configuration for the gNMI poller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GnmiPollerConfig {
    /// Target device
    pub device: DeviceConfig,

    /// Get request settings
    #[serde(default)]
    pub get: GetSettings,

    /// Poll loop settings
    #[serde(default)]
    pub poll: PollSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The device the client talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host name or IP address (e.g., "10.10.130.15")
    pub address: String,

    /// gRPC port
    pub port: u16,

    /// Authentication credentials sent as request metadata
    #[serde(default)]
    pub credentials: Option<Credentials>,

    /// Connection establishment timeout in milliseconds
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    /// Per-request deadline in milliseconds
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

/// Authentication credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What each Get asks for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSettings {
    /// Path expressions, each sent as a single path element
    #[serde(default = "default_paths")]
    pub paths: Vec<String>,

    /// Data type filter
    #[serde(default)]
    pub data_type: DataType,

    /// Encoding requested from the device
    #[serde(default)]
    pub encoding: GnmiEncoding,
}

impl Default for GetSettings {
    fn default() -> Self {
        Self {
            paths: default_paths(),
            data_type: DataType::default(),
            encoding: GnmiEncoding::default(),
        }
    }
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// Number of Get calls to issue
    #[serde(default = "default_ticks")]
    pub ticks: u32,

    /// Delay between two calls in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Wait for in-flight calls once the last tick has been dispatched
    #[serde(default = "default_drain")]
    pub drain_outstanding: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
            interval_ms: default_interval(),
            drain_outstanding: default_drain(),
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Reject a loop that would never tick or tick without pause
    pub fn validate(&self) -> Result<(), GnmiError> {
        if self.ticks == 0 {
            return Err(GnmiError::Config("poll.ticks must be at least 1".into()));
        }
        if self.interval_ms == 0 {
            return Err(GnmiError::Config("poll.interval_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Get request data type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// Config and state
    #[default]
    All,

    /// Read-write configuration only
    Config,

    /// Read-only state only
    State,

    /// Operational subset of state
    Operational,
}

/// gNMI encoding format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GnmiEncoding {
    /// JSON encoding
    #[default]
    Json,

    /// Raw bytes
    Bytes,

    /// Protocol Buffers
    Proto,

    /// ASCII text
    Ascii,

    /// JSON with IETF formatting
    JsonIetf,
}

fn default_paths() -> Vec<String> {
    vec![DEFAULT_PATH.to_string()]
}

fn default_ticks() -> u32 {
    10
}

fn default_interval() -> u64 {
    5000 // 5 seconds
}

fn default_drain() -> bool {
    true
}

impl GnmiPollerConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// The result is not validated yet so command-line overrides can be
    /// applied first; call [`validate`](Self::validate) afterwards.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(orca_common::load_config(path)?)
    }

    /// Replace the poll settings given on the command line
    pub fn with_poll_overrides(mut self, ticks: Option<u32>, interval_ms: Option<u64>) -> Self {
        if let Some(ticks) = ticks {
            self.poll.ticks = ticks;
        }
        if let Some(interval_ms) = interval_ms {
            self.poll.interval_ms = interval_ms;
        }
        self
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<(), GnmiError> {
        if self.device.address.trim().is_empty() {
            return Err(GnmiError::Config("device.address must not be empty".into()));
        }
        if self.device.port == 0 {
            return Err(GnmiError::Config("device.port must not be 0".into()));
        }
        if self.get.paths.is_empty() {
            return Err(GnmiError::Config("get.paths must name at least one path".into()));
        }
        if let Some(index) = self.get.paths.iter().position(|p| p.is_empty()) {
            return Err(GnmiError::Config(format!("get.paths[{}] is empty", index)));
        }
        self.poll.validate()
    }
}

impl DataType {
    /// Convert to gNMI proto data type value
    pub fn to_proto(self) -> i32 {
        let data_type = match self {
            DataType::All => gnmi::get_request::DataType::All,
            DataType::Config => gnmi::get_request::DataType::Config,
            DataType::State => gnmi::get_request::DataType::State,
            DataType::Operational => gnmi::get_request::DataType::Operational,
        };
        data_type as i32
    }
}

impl GnmiEncoding {
    /// Convert to gNMI proto encoding value
    pub fn to_proto(self) -> i32 {
        let encoding = match self {
            GnmiEncoding::Json => gnmi::Encoding::Json,
            GnmiEncoding::Bytes => gnmi::Encoding::Bytes,
            GnmiEncoding::Proto => gnmi::Encoding::Proto,
            GnmiEncoding::Ascii => gnmi::Encoding::Ascii,
            GnmiEncoding::JsonIetf => gnmi::Encoding::JsonIetf,
        };
        encoding as i32
    }
}
