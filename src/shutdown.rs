//! Stop signal for the forwarding loop

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag flipped by Ctrl+C / SIGTERM
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    /// Flag with no signal handler attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the process-wide Ctrl+C handler
    pub fn install() -> Result<Self> {
        let shutdown = Self::new();
        let flag = shutdown.clone();

        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal");
            flag.request();
        })
        .with_context(|| "Failed to set Ctrl+C handler")?;

        Ok(shutdown)
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
