//! Error types for the emulator driver
//!
//! Messages name the thing that failed and, where it helps, what to check,
//! since they are usually read in the log of a failed CI run.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the emulator driver
#[derive(Error, Debug)]
pub enum Error {
    // === Startup Errors ===
    #[error("Application binary '{0}' not found")]
    AppNotFound(String),

    #[error("Emulator executable '{name}' not found in PATH. Install speculos or set emulator.command")]
    EmulatorNotFound { name: String },

    #[error("Emulator failed to start: {0}")]
    EmulatorStartFailed(String),

    #[error("Emulator exited during startup ({0})")]
    EmulatorExited(String),

    #[error("Emulator did not show '{text}' within {secs} seconds")]
    StartTimeout { text: String, secs: u64 },

    // === Emulator API Errors ===
    #[error("Emulator API request failed: {0}")]
    EmulatorApi(#[from] reqwest::Error),

    #[error("Emulator API returned {status} for {endpoint}")]
    EmulatorResponse { endpoint: String, status: u16 },

    // === Navigation Errors ===
    #[error("Screen containing '{text}' not reached within {secs} seconds")]
    NavigationTimeout { text: String, secs: u64 },

    // === Control Server Errors ===
    #[error("Failed to bind control server on {addr}: {source}")]
    ControlBind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("APDU frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    // === Port File Errors ===
    #[error("Failed to write port file '{path}': {source}")]
    PortFileWrite {
        path: String,
        #[source]
        source: io::Error,
    },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an application not found error for a path
    pub fn app_not_found(path: &Path) -> Self {
        Self::AppNotFound(path.display().to_string())
    }

    /// Create an emulator API status error
    pub fn emulator_response(endpoint: &str, status: reqwest::StatusCode) -> Self {
        Self::EmulatorResponse {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        }
    }

    /// Create a navigation timeout error
    pub fn navigation_timeout(text: &str, secs: u64) -> Self {
        Self::NavigationTimeout {
            text: text.to_string(),
            secs,
        }
    }

    /// Create a port file write error
    pub fn port_file_write(path: &Path, source: io::Error) -> Self {
        Self::PortFileWrite {
            path: path.display().to_string(),
            source,
        }
    }

    /// Whether the error happened before the driver loop was reached
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Error::AppNotFound(_)
                | Error::EmulatorNotFound { .. }
                | Error::EmulatorStartFailed(_)
                | Error::EmulatorExited(_)
                | Error::StartTimeout { .. }
                | Error::ControlBind { .. }
        )
    }
}
