use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::events::{EventBus, OfflineEvent};
use crate::remote::RemoteBackend;

/// Source of the online/offline signal.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the backend is reachable right now.
    async fn check(&self) -> bool;
}

/// Probe that asks the remote backend's health endpoint.
pub struct BackendProbe {
    backend: Arc<dyn RemoteBackend>,
}

impl BackendProbe {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ConnectivityProbe for BackendProbe {
    async fn check(&self) -> bool {
        self.backend.health().await.is_ok()
    }
}

/// Polls the probe and publishes online/offline transitions.
///
/// The current state is exposed through a watch channel; the sync worker
/// subscribes and edge-triggers a queue flush on reconnect.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    state_tx: watch::Sender<bool>,
    events: EventBus,
}

impl ConnectivityMonitor {
    /// Starts offline until the first probe says otherwise.
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        interval: Duration,
        events: EventBus,
    ) -> (watch::Receiver<bool>, Self) {
        let (state_tx, state_rx) = watch::channel(false);

        let monitor = Self {
            probe,
            interval,
            state_tx,
            events,
        };

        (state_rx, monitor)
    }

    /// Run the polling loop until every receiver is gone.
    pub async fn run(self) {
        info!("ConnectivityMonitor: starting");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let online = self.probe.check().await;
            let previous = *self.state_tx.borrow();

            if online != previous {
                info!(
                    "Connectivity changed: {}",
                    if online { "online" } else { "offline" }
                );

                if self.state_tx.send(online).is_err() {
                    debug!("No connectivity subscribers left, stopping monitor");
                    break;
                }

                self.events
                    .publish(OfflineEvent::ConnectivityChanged { online });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProbe {
        online: AtomicBool,
    }

    #[async_trait]
    impl ConnectivityProbe for FakeProbe {
        async fn check(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_edge_transitions_reach_subscribers() {
        let probe = Arc::new(FakeProbe {
            online: AtomicBool::new(false),
        });
        let events = EventBus::new(16);
        let mut subscriber = events.subscribe_to_kinds(vec![EventKind::ConnectivityChanged]);

        let (mut state_rx, monitor) =
            ConnectivityMonitor::new(probe.clone(), Duration::from_millis(10), events);
        tokio::spawn(monitor.run());

        assert!(!*state_rx.borrow());

        probe.online.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), state_rx.changed())
            .await
            .expect("no online transition")
            .unwrap();
        assert!(*state_rx.borrow());

        let event = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
            .await
            .expect("no connectivity event")
            .unwrap();
        match event {
            OfflineEvent::ConnectivityChanged { online } => assert!(online),
            other => panic!("unexpected event: {:?}", other),
        }

        // Back to offline
        probe.online.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), state_rx.changed())
            .await
            .expect("no offline transition")
            .unwrap();
        assert!(!*state_rx.borrow());
    }

    #[tokio::test]
    async fn test_steady_state_emits_no_events() {
        let probe = Arc::new(FakeProbe {
            online: AtomicBool::new(false),
        });
        let events = EventBus::new(16);
        let mut subscriber = events.subscribe();

        let (_state_rx, monitor) =
            ConnectivityMonitor::new(probe, Duration::from_millis(5), events);
        tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(subscriber.try_recv().unwrap().is_none());
    }
}
