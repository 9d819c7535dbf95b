use core::fmt;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::Serialize;
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{SwapFailure, SwapSnapshot};

/// Capacity of the notification channel. Receivers falling further behind
/// skip the oldest notifications.
const NOTIFICATION_CAPACITY: usize = 64;

/// Notifications emitted by the orchestrator as a swap progresses
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SwapNotification {
    /// Emitted after every accepted input, with the resulting snapshot
    StateChanged { snapshot: SwapSnapshot },
    QuoteReceived { amount_out: u128 },
    SwapSubmitted { tx_hash: String },
    SwapConfirmed { tx_hash: String },
    SwapFailed { failure: SwapFailure },
}

impl fmt::Display for SwapNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapNotification::StateChanged { snapshot } => {
                write!(f, "StateChanged: {}", snapshot.state)
            }
            SwapNotification::QuoteReceived { amount_out } => {
                write!(f, "QuoteReceived: {amount_out}")
            }
            SwapNotification::SwapSubmitted { tx_hash } => write!(f, "SwapSubmitted: {tx_hash}"),
            SwapNotification::SwapConfirmed { tx_hash } => write!(f, "SwapConfirmed: {tx_hash}"),
            SwapNotification::SwapFailed { failure } => write!(f, "SwapFailed: {failure}"),
        }
    }
}

#[async_trait::async_trait]
pub trait SwapListener: Send + Sync {
    async fn on_notification(&self, notification: SwapNotification);
}

/// Fans notifications out to broadcast receivers and registered listeners.
///
/// Emitting never blocks: each listener is driven by its own task reading
/// from the broadcast channel, in emission order.
pub struct EventEmitter {
    sender: broadcast::Sender<SwapNotification>,
    listener_index: AtomicU64,
    listeners: Mutex<BTreeMap<String, JoinHandle<()>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            sender,
            listener_index: AtomicU64::new(0),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn emit(&self, notification: SwapNotification) {
        debug!("Emitting notification: {notification}");
        // No receivers is fine
        let _ = self.sender.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwapNotification> {
        self.sender.subscribe()
    }

    pub async fn add_listener(&self, listener: Box<dyn SwapListener>) -> String {
        let index = self.listener_index.fetch_add(1, Ordering::Relaxed);
        let id = format!("listener_{index}");
        let mut receiver = self.sender.subscribe();
        let listener_id = id.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(notification) => listener.on_notification(notification).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Listener {listener_id} skipped {skipped} notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.listeners.lock().await.insert(id.clone(), handle);
        id
    }

    pub async fn remove_listener(&self, id: &str) -> bool {
        let mut listeners = self.listeners.lock().await;
        match listeners.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
