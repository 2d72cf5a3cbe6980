//! Connectivity signal sources
//!
//! A `ConnectivitySource` exposes the current "connected" reading plus
//! edge-triggered change events. Listeners receive events through a
//! `Subscription`, which unregisters itself when dropped.

use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A change in connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// The environment became connected
    Connected,
    /// The environment lost its connection
    Disconnected,
}

/// Source of the "currently connected" signal
#[allow(async_fn_in_trait)]
pub trait ConnectivitySource {
    /// Returns the last known connectivity reading
    fn is_connected(&self) -> bool;

    /// Registers a listener for connectivity changes
    fn subscribe(&self) -> Subscription;

    /// Refreshes the reading from the environment and returns it
    ///
    /// Sources that are pushed updates externally keep the default.
    async fn check(&self) -> bool {
        self.is_connected()
    }
}

#[derive(Debug, Default)]
struct Listeners {
    next_id: u64,
    senders: HashMap<u64, mpsc::UnboundedSender<ConnectivityEvent>>,
}

#[derive(Debug)]
struct HubState {
    connected: AtomicBool,
    listeners: Mutex<Listeners>,
}

/// Current connectivity plus the listeners interested in changes
#[derive(Debug, Clone)]
pub struct ConnectivityHub {
    state: Arc<HubState>,
}

impl ConnectivityHub {
    pub fn new(connected: bool) -> Self {
        Self {
            state: Arc::new(HubState {
                connected: AtomicBool::new(connected),
                listeners: Mutex::new(Listeners::default()),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Records a new reading and notifies listeners if it changed
    ///
    /// Returns `true` when an event was emitted.
    pub fn set_connected(&self, connected: bool) -> bool {
        let previous = self.state.connected.swap(connected, Ordering::SeqCst);
        if previous == connected {
            return false;
        }

        let event = if connected {
            ConnectivityEvent::Connected
        } else {
            ConnectivityEvent::Disconnected
        };
        info!(?event, "Connectivity changed");

        let mut listeners = self
            .state
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Receivers that went away without unsubscribing are pruned here
        listeners
            .senders
            .retain(|_, sender| sender.send(event).is_ok());
        true
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut listeners = self
            .state
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.senders.insert(id, sender);
        debug!(id, "Connectivity listener registered");

        Subscription {
            id,
            receiver,
            hub: Arc::downgrade(&self.state),
        }
    }

    /// Number of live subscriptions
    pub fn listener_count(&self) -> usize {
        self.state
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .senders
            .len()
    }
}

/// A registered connectivity listener
///
/// Dropping the subscription removes it from its hub.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<ConnectivityEvent>,
    hub: Weak<HubState>,
}

impl Subscription {
    /// Returns the next pending event without waiting
    pub fn try_next(&mut self) -> Option<ConnectivityEvent> {
        self.receiver.try_recv().ok()
    }

    /// Waits for the next event; `None` once the source is gone
    pub async fn next(&mut self) -> Option<ConnectivityEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.hub.upgrade() {
            let mut listeners = state
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            listeners.senders.remove(&self.id);
            debug!(id = self.id, "Connectivity listener released");
        }
    }
}

/// Connectivity driven by hand, for tests and forced-offline runs
#[derive(Debug, Clone)]
pub struct SimulatedConnectivity {
    hub: ConnectivityHub,
}

impl SimulatedConnectivity {
    pub fn new(connected: bool) -> Self {
        Self {
            hub: ConnectivityHub::new(connected),
        }
    }

    /// Changes the reading, emitting an event on an actual change
    pub fn set_connected(&self, connected: bool) -> bool {
        self.hub.set_connected(connected)
    }

    pub fn hub(&self) -> &ConnectivityHub {
        &self.hub
    }
}

impl ConnectivitySource for SimulatedConnectivity {
    fn is_connected(&self) -> bool {
        self.hub.is_connected()
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }
}

/// Connectivity detected by reaching a URL over HTTP
///
/// Any HTTP response counts as connected; only transport failures and
/// timeouts count as disconnected. The reading starts out connected and is
/// refreshed by `check`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    hub: ConnectivityHub,
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using defaults without a timeout");
                Client::new()
            });
        Self {
            hub: ConnectivityHub::new(true),
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ConnectivitySource for HttpProbe {
    fn is_connected(&self) -> bool {
        self.hub.is_connected()
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    async fn check(&self) -> bool {
        let connected = match self.client.head(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Connectivity probe failed");
                false
            }
        };
        self.hub.set_connected(connected);
        connected
    }
}
