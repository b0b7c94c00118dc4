//! Audio capture sources.
//!
//! [`AudioCapture`] is the seam between the client and the platform.  A
//! source pushes wire-format PCM byte buffers of any length into the
//! channel it is started with; the push-to-talk gate decides what is
//! forwarded.
//!
//! [`CpalCapture`] records from an input device.  [`NullCapture`] produces
//! nothing, for headless runs.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tokio::sync::mpsc;

use super::PcmConverter;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// A platform audio source.  Not `Send`: some backends pin their stream to
/// the creating thread.
pub trait AudioCapture {
    /// Begin delivering PCM buffers to `tx`.  Calling it again while running
    /// replaces the previous stream.
    fn start(&mut self, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<(), CaptureError>;

    fn stop(&mut self);
}

// ---------------------------------------------------------------------------
// CpalCapture
// ---------------------------------------------------------------------------

/// Microphone capture via `cpal`, converted to 16 kHz mono PCM16 in the
/// audio callback.
///
/// ```rust,no_run
/// use tokio::sync::mpsc;
/// use edge_voice_client::audio::{AudioCapture, CpalCapture};
///
/// let (tx, mut rx) = mpsc::unbounded_channel();
/// let mut capture = CpalCapture::open(None).unwrap();
/// capture.start(tx).unwrap();
/// // rx yields Vec<u8> PCM buffers until capture.stop().
/// ```
pub struct CpalCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    converter: PcmConverter,
    stream: Option<cpal::Stream>,
}

impl CpalCapture {
    /// Open the named input device, or the host default when `name` is
    /// `None`.
    pub fn open(name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string()))?,
        };

        let supported = device.default_input_config()?;
        let converter = PcmConverter::new(supported.sample_rate().0, supported.channels());
        log::info!(
            "audio: input {} @ {} Hz x{}",
            device.name().unwrap_or_else(|_| "<unnamed>".into()),
            supported.sample_rate().0,
            supported.channels()
        );

        Ok(Self {
            device,
            config: supported.into(),
            converter,
            stream: None,
        })
    }
}

impl AudioCapture for CpalCapture {
    fn start(&mut self, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<(), CaptureError> {
        let converter = self.converter;
        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let pcm = converter.convert(data);
                if !pcm.is_empty() {
                    let _ = tx.send(pcm);
                }
            },
            |err: cpal::StreamError| {
                log::error!("audio: stream error: {err}");
            },
            None,
        )?;
        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::info!("audio: capture stopped");
        }
    }
}

// ---------------------------------------------------------------------------
// NullCapture
// ---------------------------------------------------------------------------

/// Never produces audio.
#[derive(Debug, Default)]
pub struct NullCapture {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl AudioCapture for NullCapture {
    fn start(&mut self, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<(), CaptureError> {
        // Held so the receiving side stays open.
        self.tx = Some(tx);
        Ok(())
    }

    fn stop(&mut self) {
        self.tx = None;
    }
}
