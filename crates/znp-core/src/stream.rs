// ── Unsolicited event streams ──
//
// Hardware-initiated notifications (node discovery, attribute reports,
// topology, device announce) exposed as `Stream`s instead of callbacks.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::dispatch::{EventDispatcher, Subscription};
use crate::model::{EventKind, RadioEvent};

/// Unbounded stream of one event kind.
///
/// Starts empty at creation (no replay), yields events in arrival order,
/// and ends once the controller is dropped. Dropping the stream removes
/// its handler from the dispatcher.
pub struct EventStream<T> {
    inner: UnboundedReceiverStream<T>,
    subscription: Option<Subscription>,
}

impl<T: Send + 'static> EventStream<T> {
    pub(crate) fn attach<F>(dispatcher: &Arc<EventDispatcher>, kind: EventKind, extract: F) -> Self
    where
        F: Fn(&RadioEvent) -> Option<T> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = dispatcher.subscribe(kind, move |event| {
            if let Some(item) = extract(event) {
                // Receiver gone means the stream is being dropped.
                let _ = tx.send(item);
            }
        });
        Self {
            inner: UnboundedReceiverStream::new(rx),
            subscription: Some(subscription),
        }
    }
}

impl<T> EventStream<T> {
    /// Take the next buffered item without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    #[tokio::test]
    async fn yields_matching_events_in_order() {
        let dispatcher = EventDispatcher::new();
        let mut stream = EventStream::attach(&dispatcher, EventKind::NetworkReady, |ev| {
            matches!(ev, RadioEvent::NetworkReady).then_some(1u8)
        });

        dispatcher.dispatch(&RadioEvent::NetworkReady);
        dispatcher.dispatch(&RadioEvent::NetworkReady);

        assert_eq!(stream.next().await, Some(1));
        assert_eq!(stream.try_next(), Some(1));
        assert_eq!(stream.try_next(), None);
    }

    #[test]
    fn drop_unsubscribes() {
        let dispatcher = EventDispatcher::new();
        let stream = EventStream::attach(&dispatcher, EventKind::NetworkFailed, |_| Some(()));
        assert_eq!(dispatcher.handler_count(EventKind::NetworkFailed), 1);
        drop(stream);
        assert_eq!(dispatcher.handler_count(EventKind::NetworkFailed), 0);
    }

    #[tokio::test]
    async fn ends_when_dispatcher_is_dropped() {
        let dispatcher = EventDispatcher::new();
        let mut stream = EventStream::attach(&dispatcher, EventKind::NetworkReady, |_| Some(()));
        drop(dispatcher);
        assert_eq!(stream.next().await, None);
    }
}
