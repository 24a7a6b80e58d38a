use anyhow::{Context, Result, anyhow, ensure};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::backend::{ClipboardBackend, ClipboardError};
use crate::relay::listeners::panic_message;
use crate::relay::{CLIPBOARD_CHANNEL, ChangeEvent, Relay};

/// Poll interval used when none is configured
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Longest accepted poll interval (one day)
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// New text was stored and published
    Changed,
    /// Text was identical to the snapshot
    Unchanged,
    /// Text was empty or whitespace only; snapshot kept
    Blank,
    /// The clipboard could not be read this tick
    ReadFailed,
}

/// Polling state as seen from outside the timer thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Waiting for the next tick
    Idle,
    /// Running one read-compare-maybe-publish step
    Comparing,
}

/// Detects clipboard text changes and publishes them on a relay
///
/// The last observed text (the snapshot) lives here and is only ever written by
/// [`ClipboardWatcher::tick`] and [`ClipboardWatcher::capture_baseline`].
pub struct ClipboardWatcher {
    backend: Box<dyn ClipboardBackend>,
    relay: Relay,
    snapshot: String,
    comparing: Arc<AtomicBool>,
}

impl ClipboardWatcher {
    /// Create a watcher with an empty snapshot
    pub fn new(backend: Box<dyn ClipboardBackend>, relay: Relay) -> Self {
        ClipboardWatcher {
            backend,
            relay,
            snapshot: String::new(),
            comparing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Last observed clipboard text
    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Record the current clipboard text without publishing it
    /// On a failed read the snapshot stays as it was
    pub fn capture_baseline(&mut self) {
        match self.read() {
            Ok(text) => {
                log::debug!("Captured clipboard baseline ({} bytes)", text.len());
                self.snapshot = text;
            }
            Err(e) => {
                log::warn!("Could not read clipboard baseline, starting empty: {}", e);
            }
        }
    }

    /// Read the clipboard once and publish if the text changed
    pub fn tick(&mut self) -> TickOutcome {
        self.comparing.store(true, Ordering::Release);
        let outcome = self.compare();
        self.comparing.store(false, Ordering::Release);
        outcome
    }

    fn compare(&mut self) -> TickOutcome {
        let text = match self.read() {
            Ok(text) => text,
            Err(e) => {
                log::error!("Clipboard read failed via {}: {}", self.backend.name(), e);
                return TickOutcome::ReadFailed;
            }
        };

        if text == self.snapshot {
            return TickOutcome::Unchanged;
        }

        // Transient clears (and whitespace-only copies) are not changes
        if text.trim().is_empty() {
            log::trace!("Ignoring blank clipboard text");
            return TickOutcome::Blank;
        }

        log::debug!(
            "Clipboard changed ({} bytes), publishing on '{}'",
            text.len(),
            CLIPBOARD_CHANNEL
        );
        let event = ChangeEvent::new(text.clone());
        self.snapshot = text;

        let dispatch = self.relay.publish(&event);
        if dispatch.failed > 0 {
            log::warn!(
                "{} of {} subscriber(s) failed to handle clipboard change",
                dispatch.failed,
                dispatch.delivered + dispatch.failed
            );
        }

        TickOutcome::Changed
    }

    fn read(&self) -> Result<String, ClipboardError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.backend.read_text())) {
            Ok(result) => result,
            Err(payload) => Err(ClipboardError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Capture the baseline, then poll on a background thread at a fixed rate
    pub fn start(mut self, interval: Duration) -> Result<WatcherHandle> {
        ensure!(!interval.is_zero(), "Poll interval must be greater than zero");
        ensure!(
            interval <= MAX_POLL_INTERVAL,
            "Poll interval must be at most {:?}",
            MAX_POLL_INTERVAL
        );

        self.capture_baseline();

        let comparing = Arc::clone(&self.comparing);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("clipboard-watcher".to_string())
            .spawn(move || {
                log::info!(
                    "Clipboard watcher started via {} with {:?} interval",
                    self.backend.name(),
                    interval
                );

                let mut deadline = Instant::now() + interval;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    self.tick();

                    // Fixed rate: an overrunning tick skips deadlines instead of queueing them
                    let now = Instant::now();
                    deadline = deadline.checked_add(interval).unwrap_or(now);
                    if deadline <= now {
                        let missed = (now - deadline).as_nanos() / interval.as_nanos() + 1;
                        log::debug!("Tick overran, skipping {} interval(s)", missed);
                        deadline = now + interval;
                    }
                }

                log::info!("Clipboard watcher stopped");
                self
            })
            .context("Failed to spawn clipboard watcher thread")?;

        Ok(WatcherHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            comparing,
        })
    }
}

/// Owner of a running watcher thread
///
/// Dropping the handle stops the thread; window or shell teardown should call
/// [`WatcherHandle::stop`] to get the watcher back.
pub struct WatcherHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<ClipboardWatcher>>,
    comparing: Arc<AtomicBool>,
}

impl WatcherHandle {
    pub fn state(&self) -> WatcherState {
        if self.comparing.load(Ordering::Acquire) {
            WatcherState::Comparing
        } else {
            WatcherState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stop polling and return the watcher with its final snapshot
    pub fn stop(mut self) -> Result<ClipboardWatcher> {
        if let Some(stop_tx) = self.stop_tx.take() {
            // A send error means the thread already exited; joining reports why
            let _ = stop_tx.send(());
        }
        self.join_thread()
    }

    /// Block until the watcher thread exits, without asking it to stop
    pub fn join(mut self) -> Result<ClipboardWatcher> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<ClipboardWatcher> {
        let thread = self
            .thread
            .take()
            .ok_or_else(|| anyhow!("Clipboard watcher already joined"))?;

        thread
            .join()
            .map_err(|payload| anyhow!("Clipboard watcher thread panicked: {}", panic_message(payload.as_ref())))
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
