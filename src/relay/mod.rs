//! Change relay between the clipboard watcher and its consumers
//!
//! The host side owns a [`Relay`] and publishes [`ChangeEvent`]s on it. Consumers
//! only ever receive a [`Bridge`], which can subscribe and nothing else: it
//! cannot publish, read the clipboard, or reach the watcher.

pub mod listeners;

use std::sync::Arc;

pub use listeners::{Dispatch, ListenerId, Listeners, Subscription};

/// Channel identifier for clipboard change notifications
pub const CLIPBOARD_CHANNEL: &str = "clipboard-updated";

/// One-shot notification that the clipboard text changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    text: String,
}

impl ChangeEvent {
    pub fn new(text: impl Into<String>) -> Self {
        ChangeEvent { text: text.into() }
    }

    /// Full clipboard text at the time of the change, untrimmed
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Host-side end of the relay
#[derive(Clone, Default)]
pub struct Relay {
    listeners: Arc<Listeners<ChangeEvent>>,
}

impl Relay {
    pub fn new() -> Self {
        Relay::default()
    }

    /// Subscribe-only handle for consumers
    pub fn bridge(&self) -> Bridge {
        Bridge {
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Deliver an event to every current subscriber, synchronously and in subscription order
    pub fn publish(&self, event: &ChangeEvent) -> Dispatch {
        let dispatch = self.listeners.dispatch(event);
        log::trace!(
            "Published on '{}' to {} subscriber(s), {} failed",
            CLIPBOARD_CHANNEL,
            dispatch.delivered,
            dispatch.failed
        );
        dispatch
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Consumer-side end of the relay
#[derive(Clone)]
pub struct Bridge {
    listeners: Arc<Listeners<ChangeEvent>>,
}

impl Bridge {
    /// Receive every event published from now on
    /// Events published before this call are never replayed
    pub fn subscribe<F>(&self, callback: F) -> Subscription<ChangeEvent>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.listeners.add(callback);
        log::debug!("Subscriber {} attached to '{}'", id, CLIPBOARD_CHANNEL);
        Subscription::new(&self.listeners, id)
    }
}
