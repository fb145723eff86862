// ── Per-device state streams ──
//
// Subscription handle for one device's reconciled light state.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use homelink_api::DeviceId;

use crate::model::CachedDeviceState;

/// A subscription to one device's [`CachedDeviceState`].
///
/// Offers the snapshot at subscription time, the latest value, and
/// change notification through [`changed`](Self::changed) or as a
/// `Stream`.
#[derive(Debug)]
pub struct DeviceWatch {
    device: DeviceId,
    current: CachedDeviceState,
    receiver: watch::Receiver<CachedDeviceState>,
}

impl DeviceWatch {
    pub(crate) fn new(device: DeviceId, receiver: watch::Receiver<CachedDeviceState>) -> Self {
        let current = *receiver.borrow();
        Self {
            device,
            current,
            receiver,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// State captured at creation or by the last [`changed`](Self::changed).
    pub fn current(&self) -> CachedDeviceState {
        self.current
    }

    pub fn latest(&self) -> CachedDeviceState {
        *self.receiver.borrow()
    }

    /// `true` if a newer state was published since the last
    /// [`changed`](Self::changed).
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// Wait for the next republished state. `None` once the hub is gone.
    pub async fn changed(&mut self) -> Option<CachedDeviceState> {
        self.receiver.changed().await.ok()?;
        let state = *self.receiver.borrow_and_update();
        self.current = state;
        Some(state)
    }

    /// Convert into a `Stream`. The first item is the current state.
    pub fn into_stream(self) -> DeviceWatchStream {
        DeviceWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter over a [`DeviceWatch`].
pub struct DeviceWatchStream {
    inner: WatchStream<CachedDeviceState>,
}

impl Stream for DeviceWatchStream {
    type Item = CachedDeviceState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
