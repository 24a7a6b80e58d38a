use parking_lot::Mutex;
use std::sync::Arc;

use super::backend::{ClipboardBackend, ClipboardError};

#[derive(Default)]
struct State {
    text: String,
    failing_reads: usize,
    reads: usize,
}

/// Process-local clipboard
///
/// Clones share the same contents, so a test can keep one handle to drive the
/// clipboard while a watcher owns another.
#[derive(Clone, Default)]
pub struct MemoryClipboard {
    state: Arc<Mutex<State>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        MemoryClipboard::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        let clipboard = MemoryClipboard::new();
        clipboard.set_text(text);
        clipboard
    }

    /// Replace the clipboard contents, as a user copy would
    pub fn set_text(&self, text: impl Into<String>) {
        self.state.lock().text = text.into();
    }

    pub fn text(&self) -> String {
        self.state.lock().text.clone()
    }

    /// Make the next `count` reads fail
    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().failing_reads = count;
    }

    /// Number of read attempts so far, failed ones included
    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }
}

impl ClipboardBackend for MemoryClipboard {
    fn read_text(&self) -> Result<String, ClipboardError> {
        let mut state = self.state.lock();
        state.reads += 1;
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(ClipboardError::Unavailable("simulated read failure".into()));
        }
        Ok(state.text.clone())
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.set_text(text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_contents() {
        let driver = MemoryClipboard::with_text("first");
        let backend: Box<dyn ClipboardBackend> = Box::new(driver.clone());

        assert_eq!(backend.read_text().unwrap(), "first");
        driver.set_text("second");
        assert_eq!(backend.read_text().unwrap(), "second");

        backend.write_text("written").unwrap();
        assert_eq!(driver.text(), "written");
    }

    #[test]
    fn test_simulated_failures() {
        let clipboard = MemoryClipboard::with_text("x");
        clipboard.fail_next_reads(2);

        assert!(clipboard.read_text().is_err());
        assert!(clipboard.read_text().is_err());
        assert_eq!(clipboard.read_text().unwrap(), "x");
        assert_eq!(clipboard.reads(), 3);
    }
}
