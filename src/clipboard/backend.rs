use std::io;
use std::process::ExitStatus;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors raised by clipboard backends
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed with status: {status}")]
    Status {
        program: &'static str,
        status: ExitStatus,
    },

    #[error("clipboard text is not valid UTF-8")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("clipboard backend panicked: {0}")]
    Panicked(String),
}

/// Trait for clipboard backend abstraction
/// Supports different clipboard systems (Wayland via wl-clipboard, native via arboard)
/// Reading is used by the watcher; writing copies stored clips back to the clipboard
pub trait ClipboardBackend: Send + Sync {
    /// Read the current clipboard text
    /// An empty clipboard (or one holding no text) reads as an empty string
    fn read_text(&self) -> Result<String, ClipboardError>;

    /// Write text to clipboard
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Get the backend name (for logging/debugging)
    fn name(&self) -> &'static str;
}
