//! Configuration and artifact paths

use std::io;
use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "emu-driver";

/// Directory under the navigation root that holds per-testcase snapshots
const SNAPSHOT_DIR: &str = "snapshots-tmp";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/emu-driver/`
/// - macOS: `~/Library/Application Support/emu-driver/`
/// - Windows: `%APPDATA%\emu-driver\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Directory the navigator writes a testcase's screens to
pub fn snapshot_dir(root: &Path, testcase: &str) -> PathBuf {
    root.join(SNAPSHOT_DIR).join(testcase)
}

/// File name of the `index`-th snapshot of a navigation
pub fn snapshot_file(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{:05}.png", index))
}

/// Remove and recreate a snapshot directory
pub fn reset_snapshot_dir(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}
