//! Application entry point for the edge voice client.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (file, then environment overrides).
//! 3. Create the [`tokio`] runtime.
//! 4. Build the [`VoiceClient`] over a WebSocket transport.
//! 5. Start the hotkey listener and the microphone capture, falling back to
//!    inert sources when either is unavailable.
//! 6. Run the client until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use edge_voice_client::{
    audio::{AudioCapture, CpalCapture, NullCapture},
    chat::Role,
    config::AppConfig,
    hotkey::{parse_binding, HotkeyListener, KeyEventSource, NullKeySource},
    pipeline::{ClientInputs, VoiceClient},
    transport::WsConnector,
};

fn key_source(config: &AppConfig) -> Box<dyn KeyEventSource> {
    match parse_binding(&config.hotkey.push_to_talk_key, &config.hotkey.modifiers) {
        Ok(binding) => Box::new(HotkeyListener::new(binding)),
        Err(e) => {
            log::error!("hotkey: {e}; push-to-talk disabled");
            Box::new(NullKeySource::default())
        }
    }
}

fn audio_source(config: &AppConfig) -> Box<dyn AudioCapture> {
    match CpalCapture::open(config.audio.device.as_deref()) {
        Ok(capture) => Box::new(capture),
        Err(e) => {
            log::error!("audio: {e}; running without a microphone");
            Box::new(NullCapture::default())
        }
    }
}

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("edge voice client starting up");

    // 2. Configuration
    let config = AppConfig::load().context("loading configuration")?;

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    rt.block_on(async move {
        // 4. Client
        let (client, outputs) = VoiceClient::connect(&config, Arc::new(WsConnector));
        // No tool host in this binary: server RPC requests are answered with
        // "method not found".
        drop(outputs.inbound);

        let mut turns = outputs.turns;
        tokio::spawn(async move {
            while let Some(turn) = turns.recv().await {
                match turn.role {
                    Role::User => log::info!("you: {}", turn.content),
                    Role::Assistant => log::info!("assistant: {}", turn.content),
                }
            }
        });

        let mut status = outputs.status;
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                let line = status.borrow_and_update().summary();
                log::debug!("status: {line}");
            }
        });

        // 5. Input sources
        let (keys_tx, keys) = mpsc::unbounded_channel();
        let (audio_tx, audio) = mpsc::unbounded_channel();

        let mut hotkeys = key_source(&config);
        if let Err(e) = hotkeys.start(keys_tx) {
            log::error!("hotkey: {e}");
        }
        let mut capture = audio_source(&config);
        if let Err(e) = capture.start(audio_tx) {
            log::error!("audio: {e}");
        }

        // 6. Run until Ctrl-C
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        };
        client.run(ClientInputs { keys, audio }, shutdown).await;

        capture.stop();
        hotkeys.stop();
    });

    log::info!("edge voice client stopped");
    Ok(())
}
