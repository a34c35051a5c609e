//! Ctrl-C handling
//!
//! The monitor loop checks the returned flag between polls, so a signal ends
//! the loop after the interrupt being handled (and its settle time) finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::info;

/// Install the SIGINT handler; the flag reads `true` until Ctrl-C
pub fn install_handler() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Stopping monitor...");
        flag.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;
    Ok(running)
}
