pub mod backend;
pub mod memory;
pub mod native;
pub mod watch;
pub mod wayland;

use anyhow::{Context, Result};
use std::env;

use crate::storage::BackendKind;

pub use backend::{ClipboardBackend, ClipboardError};
pub use memory::MemoryClipboard;
pub use native::ArboardBackend;
pub use watch::{
    ClipboardWatcher, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL, TickOutcome, WatcherHandle,
    WatcherState,
};
pub use wayland::WaylandBackend;

/// Create a clipboard backend
/// `Auto` prefers wl-clipboard when WAYLAND_DISPLAY is set and falls back to arboard
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn ClipboardBackend>> {
    match kind {
        BackendKind::Wayland => {
            let backend = WaylandBackend::new().context("Wayland clipboard backend unavailable")?;
            Ok(Box::new(backend))
        }
        BackendKind::Arboard => {
            let backend = ArboardBackend::new().context("arboard clipboard backend unavailable")?;
            Ok(Box::new(backend))
        }
        BackendKind::Auto => {
            if env::var("WAYLAND_DISPLAY").is_ok() {
                log::info!("Detected Wayland display server");
                match WaylandBackend::new() {
                    Ok(backend) => return Ok(Box::new(backend)),
                    Err(e) => log::warn!("wl-clipboard not usable, falling back to arboard: {}", e),
                }
            }

            let backend = ArboardBackend::new()
                .context("No usable clipboard backend. Install wl-clipboard on Wayland or run under a display server")?;
            Ok(Box::new(backend))
        }
    }
}
