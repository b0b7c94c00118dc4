//! Where `settings.toml` lives.
//!
//! An explicit file named by `EDGE_VOICE_CONFIG` wins.  Otherwise the
//! platform config dir from `dirs` is used:
//!   Windows: %APPDATA%\edge-voice-client\
//!   macOS:   ~/Library/Application Support/edge-voice-client/
//!   Linux:   ~/.config/edge-voice-client/

use std::path::PathBuf;

use super::settings::ENV_CONFIG_PATH;

const APP_NAME: &str = "edge-voice-client";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// `settings_file` came from the environment rather than the platform
    /// default.
    pub overridden: bool,
}

impl AppPaths {
    /// Resolve from the process environment.
    pub fn new() -> Self {
        Self::resolve(std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from))
    }

    /// `explicit` is the settings file to use, if any.  Empty paths are
    /// ignored.  Falls back to the current directory when the platform has
    /// no config dir.
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        if let Some(file) = explicit.filter(|p| !p.as_os_str().is_empty()) {
            let config_dir = file
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            return Self {
                config_dir,
                settings_file: file,
                overridden: true,
            };
        }

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);
        Self {
            settings_file: config_dir.join(SETTINGS_FILE),
            config_dir,
            overridden: false,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_default_is_under_the_app_dir() {
        let paths = AppPaths::resolve(None);
        assert!(!paths.overridden);
        assert!(paths.config_dir.ends_with(APP_NAME));
        assert_eq!(paths.settings_file, paths.config_dir.join(SETTINGS_FILE));
    }

    #[test]
    fn explicit_file_wins() {
        let paths = AppPaths::resolve(Some(PathBuf::from("/etc/edge/voice.toml")));
        assert!(paths.overridden);
        assert_eq!(paths.settings_file, PathBuf::from("/etc/edge/voice.toml"));
        assert_eq!(paths.config_dir, PathBuf::from("/etc/edge"));
    }

    #[test]
    fn empty_override_is_ignored() {
        assert!(!AppPaths::resolve(Some(PathBuf::new())).overridden);
    }
}
