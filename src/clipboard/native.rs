use arboard::Clipboard;

use super::backend::{ClipboardBackend, ClipboardError};

/// Cross-platform clipboard backend built on arboard
///
/// A fresh `Clipboard` is opened for every operation so each read observes the
/// latest owner of the selection. On X11, text written here is only served while
/// some process still owns the selection; a clipboard manager keeps it alive
/// after `clipsync copy` exits.
pub struct ArboardBackend;

impl ArboardBackend {
    /// Create a new arboard backend, failing early if no clipboard can be opened
    pub fn new() -> Result<Self, ClipboardError> {
        open()?;
        log::debug!("ArboardBackend initialized successfully");
        Ok(ArboardBackend)
    }
}

fn open() -> Result<Clipboard, ClipboardError> {
    Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))
}

impl ClipboardBackend for ArboardBackend {
    fn read_text(&self) -> Result<String, ClipboardError> {
        match open()?.get_text() {
            Ok(text) => Ok(text),
            // Empty clipboard, or the current content is not text
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(ClipboardError::Unavailable(e.to_string())),
        }
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        open()?
            .set_text(text)
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;

        log::debug!("Wrote {} bytes text to clipboard", text.len());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "arboard"
    }
}
