//! Quit signal sampled once per scheduler tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::console;

/// Source of the operator's quit request
pub trait QuitSignal {
    /// Whether shutdown has been requested; sampled once per tick
    fn quit_requested(&mut self) -> bool;
}

impl QuitSignal for Arc<AtomicBool> {
    fn quit_requested(&mut self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

/// Quit on the `Q` key or when the shared flag is raised (Ctrl+C)
#[derive(Debug)]
pub struct OperatorQuit {
    flag: Arc<AtomicBool>,
    keyboard: bool,
}

impl OperatorQuit {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            keyboard: true,
        }
    }
}

impl QuitSignal for OperatorQuit {
    fn quit_requested(&mut self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        if !self.keyboard {
            return false;
        }
        match console::quit_key_pressed() {
            Ok(true) => {
                info!("Quit key pressed, shutting down...");
                self.flag.store(true, Ordering::SeqCst);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Keyboard quit unavailable ({}), use Ctrl+C to stop", e);
                self.keyboard = false;
                false
            }
        }
    }
}
