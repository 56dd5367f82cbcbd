//! Network status monitor.
//!
//! The host platform reports raw connectivity signals; the monitor classifies
//! them into a quality tier, debounces flapping, and publishes changes of the
//! committed status. It never touches queue state.

use crate::config::MonitorConfig;
use crate::debounce::Debouncer;
use crate::listeners::{Listeners, Subscription};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A raw connectivity report from the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConnectivitySignal {
    /// Whether the platform considers the device online.
    pub online: bool,
    /// Measured round-trip latency, if known.
    pub latency: Option<Duration>,
    /// Estimated downlink bandwidth in kbit/s, if known.
    pub downlink_kbps: Option<f64>,
}

impl ConnectivitySignal {
    /// An online signal without quality hints.
    pub fn online() -> Self {
        Self {
            online: true,
            ..Self::default()
        }
    }

    /// An offline signal.
    pub fn offline() -> Self {
        Self::default()
    }

    /// Adds a latency hint.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds a bandwidth hint.
    pub fn with_downlink_kbps(mut self, kbps: f64) -> Self {
        self.downlink_kbps = Some(kbps);
        self
    }
}

/// Discrete link quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    /// No connectivity.
    None,
    /// Connected, but slow enough to hurt.
    Poor,
    /// Usable.
    Fair,
    /// No degradation observed.
    Good,
}

/// Committed network status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    /// Whether the device is online.
    pub online: bool,
    /// Link quality tier.
    pub quality: ConnectionQuality,
}

impl NetworkStatus {
    /// The offline status.
    pub const OFFLINE: NetworkStatus = NetworkStatus {
        online: false,
        quality: ConnectionQuality::None,
    };
}

/// A change of the committed status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkChange {
    /// Status before the change.
    pub previous: NetworkStatus,
    /// Status after the change.
    pub current: NetworkStatus,
}

impl NetworkChange {
    /// Returns true if this change brought the device back online.
    pub fn came_online(&self) -> bool {
        !self.previous.online && self.current.online
    }

    /// Returns true if this change took the device offline.
    pub fn went_offline(&self) -> bool {
        self.previous.online && !self.current.online
    }
}

/// Maps a signal to a quality tier.
///
/// Offline is always `None`. Either hint crossing the poor threshold makes the
/// link `Poor`, either crossing the fair threshold makes it `Fair`. Online
/// without hints is `Good`.
pub fn classify(signal: &ConnectivitySignal, config: &MonitorConfig) -> ConnectionQuality {
    if !signal.online {
        return ConnectionQuality::None;
    }

    let latency_over = |limit: Duration| signal.latency.is_some_and(|l| l > limit);
    let downlink_under = |limit: f64| signal.downlink_kbps.is_some_and(|d| d < limit);

    if latency_over(config.poor_latency) || downlink_under(config.poor_downlink_kbps) {
        ConnectionQuality::Poor
    } else if latency_over(config.fair_latency) || downlink_under(config.fair_downlink_kbps) {
        ConnectionQuality::Fair
    } else {
        ConnectionQuality::Good
    }
}

struct MonitorInner {
    config: MonitorConfig,
    latest: RwLock<ConnectivitySignal>,
    committed: Arc<RwLock<NetworkStatus>>,
    listeners: Listeners<NetworkChange>,
    debouncer: Debouncer<NetworkStatus>,
}

/// Observes connectivity and publishes debounced status changes.
///
/// Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl NetworkMonitor {
    /// Creates a monitor that starts offline.
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_signal(config, ConnectivitySignal::offline())
    }

    /// Creates a monitor whose initial status comes from `signal`, without
    /// publishing a change.
    pub fn with_signal(config: MonitorConfig, signal: ConnectivitySignal) -> Self {
        let initial = NetworkStatus {
            online: signal.online,
            quality: classify(&signal, &config),
        };
        let committed = Arc::new(RwLock::new(initial));
        let listeners = Listeners::new();

        let sink_committed = Arc::clone(&committed);
        let sink_listeners = listeners.clone();
        let debouncer = Debouncer::new(config.debounce, move |next: NetworkStatus| {
            let previous = {
                let mut status = sink_committed.write();
                if *status == next {
                    return;
                }
                std::mem::replace(&mut *status, next)
            };
            info!(
                online = next.online,
                quality = ?next.quality,
                "network status changed"
            );
            sink_listeners.publish(&NetworkChange {
                previous,
                current: next,
            });
        });

        Self {
            inner: Arc::new(MonitorInner {
                config,
                latest: RwLock::new(signal),
                committed,
                listeners,
                debouncer,
            }),
        }
    }

    /// Records a connectivity report.
    ///
    /// The derived status is committed once it has held for the debounce
    /// window; listeners only hear about it if it differs from the committed
    /// status at that point.
    pub fn report(&self, signal: ConnectivitySignal) {
        *self.inner.latest.write() = signal;
        let status = NetworkStatus {
            online: signal.online,
            quality: self.classify(&signal),
        };
        self.inner.debouncer.push(status);
    }

    /// Reports a bare online/offline edge.
    pub fn set_online(&self, online: bool) {
        let signal = if online {
            ConnectivitySignal::online()
        } else {
            ConnectivitySignal::offline()
        };
        self.report(signal);
    }

    /// Classifies a signal with this monitor's thresholds.
    pub fn classify(&self, signal: &ConnectivitySignal) -> ConnectionQuality {
        classify(signal, &self.inner.config)
    }

    /// The committed status.
    pub fn status(&self) -> NetworkStatus {
        *self.inner.committed.read()
    }

    /// Shorthand for `status().online`.
    pub fn is_online(&self) -> bool {
        self.status().online
    }

    /// The last raw report, which may not be committed yet.
    pub fn latest_signal(&self) -> ConnectivitySignal {
        *self.inner.latest.read()
    }

    /// Registers a callback for committed status changes.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&NetworkChange) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(callback)
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("status", &self.status())
            .field("latest", &self.latest_signal())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn immediate() -> MonitorConfig {
        MonitorConfig::default().with_debounce(Duration::ZERO)
    }

    #[test]
    fn classification_tiers() {
        let config = MonitorConfig::default();
        let q = |s: ConnectivitySignal| classify(&s, &config);

        assert_eq!(q(ConnectivitySignal::offline()), ConnectionQuality::None);
        assert_eq!(q(ConnectivitySignal::online()), ConnectionQuality::Good);
        assert_eq!(
            q(ConnectivitySignal::online().with_latency(Duration::from_millis(50))),
            ConnectionQuality::Good
        );
        assert_eq!(
            q(ConnectivitySignal::online().with_latency(Duration::from_millis(500))),
            ConnectionQuality::Fair
        );
        assert_eq!(
            q(ConnectivitySignal::online().with_latency(Duration::from_secs(2))),
            ConnectionQuality::Poor
        );
        assert_eq!(
            q(ConnectivitySignal::online().with_downlink_kbps(100.0)),
            ConnectionQuality::Poor
        );
        assert_eq!(
            q(ConnectivitySignal::online()
                .with_latency(Duration::from_millis(10))
                .with_downlink_kbps(800.0)),
            ConnectionQuality::Fair
        );
    }

    #[test]
    fn starts_offline() {
        let monitor = NetworkMonitor::new(immediate());
        assert_eq!(monitor.status(), NetworkStatus::OFFLINE);
        assert!(!monitor.is_online());
    }

    #[test]
    fn publishes_only_changes() {
        let monitor = NetworkMonitor::new(immediate());
        let changes = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&changes);
        let _sub = monitor.subscribe(move |change| c.lock().push(*change));

        monitor.set_online(true);
        monitor.set_online(true);
        monitor.report(ConnectivitySignal::online().with_latency(Duration::from_millis(500)));
        monitor.set_online(false);

        let changes = changes.lock();
        assert_eq!(changes.len(), 3);
        assert!(changes[0].came_online());
        assert_eq!(changes[1].current.quality, ConnectionQuality::Fair);
        assert!(changes[2].went_offline());
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_is_debounced() {
        let monitor = NetworkMonitor::new(
            MonitorConfig::default().with_debounce(Duration::from_millis(1000)),
        );
        let changes = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&changes);
        let _sub = monitor.subscribe(move |change| c.lock().push(*change));

        for online in [true, false, true, false, true] {
            monitor.set_online(online);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(changes.lock().is_empty());
        assert!(!monitor.is_online());
        assert!(monitor.latest_signal().online);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(changes.lock().len(), 1);
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn blip_back_to_committed_status_is_silent() {
        let monitor = NetworkMonitor::with_signal(
            MonitorConfig::default().with_debounce(Duration::from_millis(500)),
            ConnectivitySignal::online(),
        );
        let changes = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&changes);
        let _sub = monitor.subscribe(move |change| c.lock().push(*change));

        monitor.set_online(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.set_online(true);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(changes.lock().is_empty());
        assert!(monitor.is_online());
    }
}
