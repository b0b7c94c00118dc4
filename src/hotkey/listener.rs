//! Global push-to-talk listener on a dedicated OS thread via `rdev::listen`.
//!
//! `rdev::listen` blocks forever and has no shutdown API.  [`stop`] and drop
//! set a flag so the callback forwards nothing further; the thread itself
//! stays parked in the OS event loop until the process exits.
//!
//! [`stop`]: KeyEventSource::stop

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;

use super::{BindingTracker, HotkeyBinding, HotkeyError, HotkeyEvent, KeyEventSource};

pub struct HotkeyListener {
    binding: HotkeyBinding,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl HotkeyListener {
    pub fn new(binding: HotkeyBinding) -> Self {
        Self {
            binding,
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl KeyEventSource for HotkeyListener {
    fn start(&mut self, tx: mpsc::UnboundedSender<HotkeyEvent>) -> Result<(), HotkeyError> {
        if self.thread.is_some() {
            log::warn!("hotkey: listener already running");
            return Ok(());
        }
        self.stop.store(false, Ordering::Relaxed);
        let stop = Arc::clone(&self.stop);
        let mut tracker = BindingTracker::new(self.binding.clone());

        let thread = std::thread::Builder::new()
            .name("hotkey-listener".into())
            .spawn(move || {
                let result = rdev::listen(move |event| {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    let emitted = match event.event_type {
                        rdev::EventType::KeyPress(k) => tracker.on_press(k),
                        rdev::EventType::KeyRelease(k) => tracker.on_release(k),
                        _ => None,
                    };
                    if let Some(ev) = emitted {
                        let _ = tx.send(ev);
                    }
                });
                if let Err(e) = result {
                    log::error!("hotkey: rdev::listen exited with error: {e:?}");
                }
            })?;

        log::info!("hotkey: listening for {:?} {:?}", self.binding.modifiers, self.binding.key);
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
