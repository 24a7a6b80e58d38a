use std::io::Write;
use std::process::{Command, Stdio};

use super::backend::{ClipboardBackend, ClipboardError};

/// Wayland clipboard backend using wl-clipboard tools
/// Requires wl-paste and wl-copy to be installed
pub struct WaylandBackend;

impl WaylandBackend {
    /// Create a new Wayland clipboard backend
    pub fn new() -> Result<Self, ClipboardError> {
        // Verify both halves of wl-clipboard are available
        for program in ["wl-paste", "wl-copy"] {
            Command::new(program)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map_err(|source| ClipboardError::Spawn { program, source })?;
        }

        log::debug!("WaylandBackend initialized successfully");
        Ok(WaylandBackend)
    }
}

/// wl-paste exits non-zero when the selection is empty or holds no text
fn is_empty_selection(stderr: &[u8]) -> bool {
    let stderr = String::from_utf8_lossy(stderr);
    stderr.contains("Nothing is copied")
        || stderr.contains("No selection")
        || stderr.contains("No suitable type of content")
}

impl ClipboardBackend for WaylandBackend {
    fn read_text(&self) -> Result<String, ClipboardError> {
        let output = Command::new("wl-paste")
            .arg("--no-newline")
            .arg("--type")
            .arg("text")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ClipboardError::Spawn {
                program: "wl-paste",
                source,
            })?;

        if !output.status.success() {
            if is_empty_selection(&output.stderr) {
                return Ok(String::new());
            }
            return Err(ClipboardError::Status {
                program: "wl-paste",
                status: output.status,
            });
        }

        Ok(String::from_utf8(output.stdout)?)
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        // Text goes through stdin, never argv
        let mut child = Command::new("wl-copy")
            .arg("--type")
            .arg("text/plain")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ClipboardError::Spawn {
                program: "wl-copy",
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .map_err(|source| ClipboardError::Spawn {
                    program: "wl-copy",
                    source,
                })?;
        }

        let status = child.wait().map_err(|source| ClipboardError::Spawn {
            program: "wl-copy",
            source,
        })?;

        if !status.success() {
            return Err(ClipboardError::Status {
                program: "wl-copy",
                status,
            });
        }

        log::debug!("Wrote {} bytes text to clipboard", text.len());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Wayland"
    }
}
