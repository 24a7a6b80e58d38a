//! clipsync - clipboard watcher that mirrors copied text into a clip list
//!
//! This library exports the core modules for testing and potential reuse.

pub mod clipboard;
pub mod logging;
pub mod models;
pub mod relay;
pub mod storage;
pub mod sync;
