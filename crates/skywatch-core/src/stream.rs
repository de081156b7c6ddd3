// ── Reactive view stream ──
//
// Subscription type for consuming reconciled-view changes from the monitor.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::engine::ReconciledView;

/// A subscription to the reconciled view.
///
/// Provides both point-in-time snapshot access and change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct ViewStream {
    current: Arc<ReconciledView>,
    receiver: watch::Receiver<Arc<ReconciledView>>,
}

impl ViewStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<ReconciledView>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &Arc<ReconciledView> {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<ReconciledView> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the monitor has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<ReconciledView>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The first item is the current snapshot.
    pub fn into_stream(self) -> ViewWatchStream {
        ViewWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct ViewWatchStream {
    inner: WatchStream<Arc<ReconciledView>>,
}

impl Stream for ViewWatchStream {
    type Item = Arc<ReconciledView>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn changed_tracks_latest_snapshot() {
        let (tx, rx) = watch::channel(Arc::new(ReconciledView::default()));
        let mut stream = ViewStream::new(rx);
        assert!(stream.current().is_empty());

        let mut next = ReconciledView::default();
        next.filter.city = Some("Oslo".into());
        tx.send_replace(Arc::new(next));

        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.filter.city.as_deref(), Some("Oslo"));
        assert_eq!(stream.current().filter.city.as_deref(), Some("Oslo"));

        drop(tx);
        assert!(stream.changed().await.is_none());
    }
}
