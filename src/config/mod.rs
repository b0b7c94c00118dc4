//! Configuration for the edge voice client.
//!
//! `AppConfig` holds one section per subsystem, persisted as TOML under the
//! platform config dir resolved by `AppPaths`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AsrConfig, AudioConfig, ChatConfig, ConnectionConfig, HotkeyConfig,
};
