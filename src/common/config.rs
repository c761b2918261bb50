//! Configuration file handling
//!
//! Every value the driver treats as fixed lives here. The defaults are the
//! values the IC app end-to-end suite runs with; a config file only needs to
//! name what a scenario changes.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Mnemonic the emulator is seeded with so device keys are reproducible
pub const DEFAULT_SEED: &str =
    "equip will roof matter pink blind book anxiety banner elbow sun young";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "EMU_DRIVER_CONFIG";

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Application under test
    #[serde(default)]
    pub app: AppConfig,

    /// Emulator process settings
    #[serde(default)]
    pub emulator: EmulatorConfig,

    /// Control server settings
    #[serde(default)]
    pub control: ControlConfig,

    /// Navigator settings
    #[serde(default)]
    pub navigation: NavigationConfig,

    /// Which option the driver selects on review screens
    #[serde(default)]
    pub policy: PolicyKind,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Approval policy selector
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Approve every pending operation
    #[default]
    ApproveAll,
    /// Reject every pending operation
    RejectAll,
}

/// Application and device settings
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Path to the application ELF
    #[serde(default = "default_app_path")]
    pub path: PathBuf,

    /// Device model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Text that marks the app as booted
    #[serde(default = "default_start_text")]
    pub start_text: String,

    /// Seed mnemonic for the emulated device
    #[serde(default = "default_seed")]
    pub seed: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            path: default_app_path(),
            model: default_model(),
            start_text: default_start_text(),
            seed: default_seed(),
        }
    }
}

fn default_app_path() -> PathBuf {
    PathBuf::from("app.elf")
}
fn default_model() -> String {
    "nanosp".to_string()
}
fn default_start_text() -> String {
    "Internet".to_string()
}
fn default_seed() -> String {
    DEFAULT_SEED.to_string()
}

/// Emulator process settings
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EmulatorConfig {
    /// Emulator executable (name looked up in PATH, or a path)
    #[serde(default = "default_command")]
    pub command: PathBuf,

    /// Extra arguments placed before the application path
    #[serde(default)]
    pub args: Vec<String>,

    /// Display backend passed to the emulator
    #[serde(default = "default_display")]
    pub display: String,

    /// Bound on emulator boot, in seconds
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,

    /// Screen polling interval, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            display: default_display(),
            start_timeout_secs: default_start_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl EmulatorConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_command() -> PathBuf {
    PathBuf::from("speculos")
}
fn default_display() -> String {
    "headless".to_string()
}
fn default_start_timeout() -> u64 {
    20
}
fn default_poll_interval() -> u64 {
    100
}

/// Control server settings
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// Bind address, IPv4 or IPv6
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Bind port (0 picks a free port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Grace period between bind and port publication, in milliseconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl ControlConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_port() -> u16 {
    44223
}
fn default_settle_delay() -> u64 {
    1000
}

/// Navigator settings
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct NavigationConfig {
    /// Root directory for navigation artifacts
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Testcase label; names the snapshot directory
    #[serde(default = "default_testcase")]
    pub testcase: String,

    /// Save a snapshot of every visited screen
    #[serde(default = "default_save_snapshots")]
    pub save_snapshots: bool,

    /// Bound on a single navigation, in seconds
    #[serde(default = "default_navigation_timeout")]
    pub timeout_secs: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            testcase: default_testcase(),
            save_snapshots: default_save_snapshots(),
            timeout_secs: default_navigation_timeout(),
        }
    }
}

impl NavigationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_testcase() -> String {
    "cargo-test".to_string()
}
fn default_save_snapshots() -> bool {
    true
}
fn default_navigation_timeout() -> u64 {
    30
}

/// Log output settings
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration
    ///
    /// `EMU_DRIVER_CONFIG` names an explicit file, which must exist. Otherwise
    /// the default config file is read if present, and defaults are used if not.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.app.start_text.trim().is_empty() {
            return Err(Error::Config("app.start_text must not be empty".to_string()));
        }
        if self.app.seed.split_whitespace().count() != 12 {
            return Err(Error::Config(
                "app.seed must be a 12-word mnemonic".to_string(),
            ));
        }
        if self.emulator.poll_interval_ms == 0 {
            return Err(Error::Config(
                "emulator.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
