// ── Status listener registry ──
//
// Fan-out of decoded status reports to registered observers. Each
// listener owns an unbounded queue drained by its own task, so a slow
// listener delays only itself and a panicking one is contained to the
// delivery that panicked.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use homelink_api::{Inbound, StatusReport};

/// Observer of device status reports.
///
/// Called on the blocking thread pool, one report at a time per
/// listener, never from the broker's event loop. Implementations may
/// block (the reconciler writes to disk); they only delay their own
/// queue.
pub trait StatusListener: Send + Sync + 'static {
    fn on_status(&self, report: &StatusReport);
}

impl<F> StatusListener for F
where
    F: Fn(&StatusReport) + Send + Sync + 'static,
{
    fn on_status(&self, report: &StatusReport) {
        (self)(report);
    }
}

/// Identity of a registration: the address of the listener allocation.
/// Registering the same `Arc` twice yields the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl ListenerId {
    fn of(listener: &Arc<dyn StatusListener>) -> Self {
        Self(Arc::as_ptr(listener).cast::<()>().addr())
    }
}

struct Registration {
    tx: mpsc::UnboundedSender<Arc<StatusReport>>,
    task: JoinHandle<()>,
}

/// Thread-safe set of listeners. Add and remove may race with delivery;
/// a report is delivered to the listeners registered when
/// [`notify_all`](Self::notify_all) runs.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: DashMap<ListenerId, Registration>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.entries.len())
            .finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`. A no-op returning the existing id if the
    /// same allocation is already registered.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        let id = ListenerId::of(&listener);
        match self.entries.entry(id) {
            Entry::Occupied(_) => {
                trace!(?id, "listener already registered");
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let task = tokio::spawn(deliver(listener, rx));
                slot.insert(Registration { tx, task });
                debug!(?id, "listener registered");
            }
        }
        id
    }

    /// Unregister. Reports already queued for the listener are still
    /// delivered. Returns `false` if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            debug!(?id, "listener removed");
        }
        removed
    }

    /// Queue `report` for every registered listener; returns how many
    /// listeners it was queued for.
    pub fn notify_all(&self, report: StatusReport) -> usize {
        let report = Arc::new(report);
        let mut delivered = 0;
        for entry in &self.entries {
            if entry.tx.send(Arc::clone(&report)).is_ok() {
                delivered += 1;
            } else {
                warn!(id = ?entry.key(), "listener task has exited");
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registration and stop their tasks without draining.
    pub fn clear(&self) {
        for entry in &self.entries {
            entry.task.abort();
        }
        self.entries.clear();
    }
}

async fn deliver(
    listener: Arc<dyn StatusListener>,
    mut rx: mpsc::UnboundedReceiver<Arc<StatusReport>>,
) {
    while let Some(report) = rx.recv().await {
        let listener = Arc::clone(&listener);
        let device = report.device_id.clone();
        let delivery = tokio::task::spawn_blocking(move || {
            catch_unwind(AssertUnwindSafe(|| listener.on_status(&report))).is_ok()
        });
        match delivery.await {
            Ok(true) => {}
            Ok(false) => warn!(device_id = %device, "status listener panicked; continuing"),
            Err(e) => warn!(device_id = %device, error = %e, "status delivery aborted"),
        }
    }
}

/// Drain the connector's inbound queue into `registry` until cancelled
/// or the connector is dropped.
pub async fn run_fanout(
    registry: Arc<ListenerRegistry>,
    mut rx: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                match msg {
                    Inbound::Status(report) => {
                        let device = report.device_id.clone();
                        let n = registry.notify_all(report);
                        trace!(device_id = %device, listeners = n, "status fanned out");
                    }
                    Inbound::ControlEcho { device, envelope } => {
                        debug!(device_id = %device, command = %envelope.command, "control echo");
                    }
                }
            }
        }
    }
    debug!("status fan-out stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use homelink_api::CommandEnvelope;

    use super::*;

    fn report(device: &str, brightness: u8) -> StatusReport {
        let mut r = StatusReport::empty(device.parse().unwrap());
        r.brightness = Some(brightness);
        r
    }

    fn recording() -> (
        Arc<dyn StatusListener>,
        mpsc::UnboundedReceiver<StatusReport>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: Arc<dyn StatusListener> = Arc::new(move |r: &StatusReport| {
            let _ = tx.send(r.clone());
        });
        (listener, rx)
    }

    #[tokio::test]
    async fn duplicate_registration_delivers_once() {
        let registry = ListenerRegistry::new();
        let (listener, mut rx) = recording();

        let a = registry.add(Arc::clone(&listener));
        let b = registry.add(Arc::clone(&listener));
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.notify_all(report("d", 1)), 1);
        assert_eq!(registry.notify_all(report("d", 2)), 1);

        assert_eq!(rx.recv().await.unwrap().brightness, Some(1));
        assert_eq!(rx.recv().await.unwrap().brightness, Some(2));
    }

    #[tokio::test]
    async fn panicking_listener_does_not_starve_others() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.add(Arc::new(move |_: &StatusReport| {
            if counter.fetch_add(1, Ordering::SeqCst) < usize::MAX {
                panic!("listener failure");
            }
        }));
        let (listener, mut rx) = recording();
        registry.add(listener);

        registry.notify_all(report("d", 10));
        registry.notify_all(report("d", 20));

        assert_eq!(rx.recv().await.unwrap().brightness, Some(10));
        assert_eq!(rx.recv().await.unwrap().brightness, Some(20));

        // The panicking listener keeps receiving after its first panic.
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn removed_listener_stops_receiving() {
        let registry = ListenerRegistry::new();
        let (listener, _rx) = recording();
        let id = registry.add(listener);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.notify_all(report("d", 1)), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn fanout_routes_status_and_skips_echoes() {
        let registry = Arc::new(ListenerRegistry::new());
        let (listener, mut rx) = recording();
        registry.add(listener);

        let (tx, inbound) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_fanout(Arc::clone(&registry), inbound, cancel.clone()));

        tx.send(Inbound::ControlEcho {
            device: "d".parse().unwrap(),
            envelope: CommandEnvelope::new("ON"),
        })
        .await
        .unwrap();
        tx.send(Inbound::Status(report("d", 5))).await.unwrap();
        tx.send(Inbound::Status(report("e", 6))).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.device_id.as_str(), "d");
        assert_eq!(rx.recv().await.unwrap().device_id.as_str(), "e");

        cancel.cancel();
        task.await.unwrap();
    }
}
