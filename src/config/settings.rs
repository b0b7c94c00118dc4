//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! needs the keys it changes.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

/// Environment variable naming an explicit `settings.toml`.
pub const ENV_CONFIG_PATH: &str = "EDGE_VOICE_CONFIG";
pub const ENV_UPSTREAM: &str = "EDGE_UPSTREAM";
pub const ENV_DOMAIN_ID: &str = "EDGE_DOMAIN_ID";
pub const ENV_TOKEN: &str = "EDGE_TOKEN";

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

/// Where to connect and how hard to retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Full `ws://` / `wss://` URL, or a bare `host[:port]`.
    pub upstream: String,
    pub domain_id: Option<String>,
    pub token: Option<String>,
    pub handshake_timeout_ms: u64,
    pub min_retry_ms: u64,
    pub max_retry_ms: u64,
    pub retry_multiplier: u32,
    /// `0` disables the periodic heartbeat.
    pub heartbeat_interval_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            upstream: "127.0.0.1:8080".into(),
            domain_id: None,
            token: None,
            handshake_timeout_ms: 15_000,
            min_retry_ms: 3_000,
            max_retry_ms: 30_000,
            retry_multiplier: 2,
            heartbeat_interval_secs: 30,
        }
    }
}

impl ConnectionConfig {
    /// Build the URL handed to the transport.
    ///
    /// | `upstream`                 | domain/token | Result                                  |
    /// |----------------------------|--------------|-----------------------------------------|
    /// | `edge.local:8080`          | unset        | `ws://edge.local:8080`                  |
    /// | `edge.local:8080`          | `d1` / `t`   | `ws://edge.local:8080/ws/d1?token=t`    |
    /// | `wss://edge.example/agent` | `d1` / `t`   | `wss://edge.example/agent` (unchanged)  |
    pub fn endpoint_url(&self) -> String {
        let upstream = self.upstream.trim().trim_end_matches('/');
        let (scheme, rest) = match upstream.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("ws", upstream),
        };
        let mut url = format!("{scheme}://{rest}");

        if let (Some(domain), Some(token)) = (non_empty(&self.domain_id), non_empty(&self.token)) {
            if !rest.contains('/') && !rest.contains('?') {
                url.push_str(&format!("/ws/{domain}?token={token}"));
            }
        }
        url
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// AsrConfig
// ---------------------------------------------------------------------------

/// Remote speech-recognition session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    /// Prefix of the control events this client publishes (`<ns>/asr/audio`).
    pub namespace: String,
    pub provider: String,
    /// ISO-639-1 code, or `"auto"`.
    pub language: String,
    /// Let the server detect end of speech.  When `false` the client sends
    /// an explicit commit on release.
    pub vad_enabled: bool,
    pub sample_rate: u32,
    /// RPC method used to negotiate a session.
    pub session_method: String,
    pub negotiate_timeout_ms: u64,
    pub vad_timeout_ms: u64,
    pub manual_timeout_ms: u64,
    /// A `speech_started` this soon after a completion, while not listening,
    /// is treated as key-release noise.
    pub noise_guard_ms: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            namespace: "voice".into(),
            provider: "default".into(),
            language: "auto".into(),
            vad_enabled: true,
            sample_rate: 16_000,
            session_method: "asr.session.start".into(),
            negotiate_timeout_ms: 10_000,
            vad_timeout_ms: 8_000,
            manual_timeout_ms: 5_000,
            noise_guard_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Push-to-talk audio gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Size every forwarded chunk is coalesced to.  3200 bytes is 100 ms of
    /// 16 kHz mono 16-bit PCM.
    pub chunk_bytes: usize,
    /// How long after key-up in-flight audio is still accepted.
    pub drain_ms: u64,
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 3_200,
            drain_ms: 300,
            device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Global push-to-talk binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Key name (e.g. `"F9"`, `"Space"`).
    pub push_to_talk_key: String,
    /// Modifiers that must be held together with the key (e.g. `["Ctrl"]`).
    pub modifiers: Vec<String>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            push_to_talk_key: "F9".into(),
            modifiers: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Turns carried with each request and retained locally.
    pub history_turns: usize,
    /// Appended to the namespace: `<ns>/<request_event>`.
    pub request_event: String,
    /// Full name of the event carrying assistant replies.
    pub response_event: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: 10,
            request_event: "chat/request".into(),
            response_event: "chat/response".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use edge_voice_client::config::AppConfig;
///
/// // Defaults when the file is missing, then EDGE_* overrides.
/// let config = AppConfig::load().unwrap();
/// println!("{}", config.connection.endpoint_url());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub asr: AsrConfig,
    pub audio: AudioConfig,
    pub hotkey: HotkeyConfig,
    pub chat: ChatConfig,
}

impl AppConfig {
    /// Load from `$EDGE_VOICE_CONFIG` or the platform `settings.toml`, then
    /// apply the `EDGE_*` environment overrides.
    pub fn load() -> Result<Self> {
        let paths = AppPaths::new();
        let mut config = Self::load_from(&paths.settings_file)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from an explicit path.  A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay connection settings from `lookup` (normally the process
    /// environment).  Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(upstream) = get(ENV_UPSTREAM) {
            self.connection.upstream = upstream;
        }
        if let Some(domain) = get(ENV_DOMAIN_ID) {
            self.connection.domain_id = Some(domain);
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.connection.token = Some(token);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
