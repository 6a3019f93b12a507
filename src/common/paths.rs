//! Platform configuration and data paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/microscript-ide/` and `~/.local/share/microscript-ide/`
//! - macOS: `~/Library/Application Support/microscript-ide/`
//! - Windows: `%APPDATA%\microscript-ide\`

use std::path::PathBuf;

/// Application name used for every directory
const APP_NAME: &str = "microscript-ide";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Directory holding the persisted editor buffer
pub fn storage_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("storage"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}
