//! Network reachability as the session sees it.
//!
//! `ConnectivityObserver` answers "are we online right now" and lets the
//! session register one-shot callbacks for the next offline → online
//! transition. `ConnectivityMonitor` is the in-process implementation; its
//! state is fed either by the host (`set_online`) or by a TCP probe task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Connect timeout for a single reachability probe
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub type RestoredCallback = Box<dyn FnOnce() + Send + 'static>;

pub trait ConnectivityObserver: Send + Sync {
    fn is_online(&self) -> bool;

    /// Run `callback` once, on the next transition back online.
    fn on_restored(&self, callback: RestoredCallback) -> Subscription;
}

/// Registration handle returned by `on_restored`.
///
/// Dropping it deregisters the callback as well.
#[must_use = "dropping a Subscription deregisters its callback"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to deregister.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(u64, RestoredCallback)>,
}

/// Connectivity state driven by the host or by a probe.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    registry: Arc<Mutex<Registry>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Record the current reachability; going back online fires and drains
    /// every registered callback.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online == was_online {
            return;
        }
        if !online {
            info!("Connectivity lost");
            return;
        }

        let callbacks = std::mem::take(&mut self.registry.lock().callbacks);
        info!(watchers = callbacks.len(), "Connectivity restored");
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Number of callbacks waiting for the next restore.
    pub fn pending(&self) -> usize {
        self.registry.lock().callbacks.len()
    }

    /// One TCP connect attempt against `addr` (host:port).
    ///
    /// Use it to seed `new` before anything reads `is_online`; the periodic
    /// probe only reports after its first tick completes.
    pub async fn probe(addr: &str) -> bool {
        matches!(
            tokio::time::timeout(PROBE_CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }

    /// Probe `addr` (host:port) every `interval` and feed the result into
    /// `set_online`. The task ends once the monitor is dropped.
    pub fn spawn_probe(self: &Arc<Self>, addr: String, interval: Duration) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reachable = Self::probe(&addr).await;
                let Some(monitor) = monitor.upgrade() else {
                    debug!("Connectivity monitor dropped, stopping probe");
                    break;
                };
                debug!(addr = %addr, reachable, "Connectivity probe");
                monitor.set_online(reachable);
            }
        })
    }
}

impl ConnectivityObserver for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn on_restored(&self, callback: RestoredCallback) -> Subscription {
        let id = {
            let mut registry = self.registry.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            registry.callbacks.push((id, callback));
            id
        };

        let registry = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().callbacks.retain(|(other, _)| *other != id);
            }
        })
    }
}

/// Observer for hosts without reachability information.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl ConnectivityObserver for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }

    fn on_restored(&self, _callback: RestoredCallback) -> Subscription {
        Subscription::noop()
    }
}
