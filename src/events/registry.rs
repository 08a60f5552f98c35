//! Subscription registry: reference-counted fan-out over shared connections.
//!
//! The first subscriber to a category opens that category's connection; the
//! last one to cancel closes it. Delivery to handlers is isolated - a
//! panicking handler is logged and its siblings still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::event::{emit, RelayCallback, RelayEvent};
use crate::events::connection::EventConnection;
use crate::events::sse::{EventSource, SseSource};
use crate::events::wire::{Category, EventPayload};
use crate::EventConfig;

/// Handler invoked for each event of a subscribed category.
///
/// Handlers run on the connection task and must not call back into the
/// multiplexer (no subscribing or cancelling from inside a handler).
pub type EventHandler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

struct CategoryEntry {
    handlers: Vec<(u64, EventHandler)>,
    cancel: CancellationToken,
}

struct MuxInner {
    source: Arc<dyn EventSource>,
    config: EventConfig,
    callback: Option<RelayCallback>,
    categories: Mutex<HashMap<Category, CategoryEntry>>,
    next_id: AtomicU64,
}

impl MuxInner {
    /// Fans one payload out to every live handler of its category.
    ///
    /// Runs under the registry lock, so a handler removed by `cancel` is
    /// never invoked after the cancel returns.
    fn dispatch(&self, payload: &EventPayload) {
        let categories = self.categories.lock();
        let Some(entry) = categories.get(&payload.category()) else {
            return;
        };
        for (id, handler) in &entry.handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(payload)));
            if result.is_err() {
                tracing::warn!(
                    category = ?payload.category(),
                    subscriber = id,
                    "subscriber handler panicked; siblings unaffected"
                );
            }
        }
    }
}

impl Drop for MuxInner {
    fn drop(&mut self) {
        for entry in self.categories.lock().values() {
            entry.cancel.cancel();
        }
    }
}

/// Demultiplexes one logical event endpoint into per-category subscriptions.
///
/// Construct one per process at startup and pass it to collaborators; there
/// is no global instance. Dropping the multiplexer stops every connection.
///
/// # Example
///
/// ```no_run
/// use stream_relay::{Category, EventConfig, EventMultiplexer};
///
/// # async fn demo() {
/// let mux = EventMultiplexer::sse(
///     "https://localhost:8080/api/events",
///     Some("token".into()),
///     EventConfig::default(),
///     None,
/// );
///
/// let sub = mux.subscribe(Category::Log, |payload| {
///     tracing::info!(?payload, "log event");
/// });
/// // ... later
/// sub.cancel();
/// # }
/// ```
pub struct EventMultiplexer {
    inner: Arc<MuxInner>,
}

impl EventMultiplexer {
    /// Creates a multiplexer over any [`EventSource`].
    #[must_use]
    pub fn new(
        source: Arc<dyn EventSource>,
        config: EventConfig,
        callback: Option<RelayCallback>,
    ) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                source,
                config,
                callback,
                categories: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a multiplexer over the production SSE source.
    #[must_use]
    pub fn sse(
        url: impl Into<String>,
        bearer_token: Option<String>,
        config: EventConfig,
        callback: Option<RelayCallback>,
    ) -> Self {
        Self::new(Arc::new(SseSource::new(url, bearer_token)), config, callback)
    }

    /// Subscribes a handler to a category.
    ///
    /// The first subscriber opens the category's connection; later ones
    /// share it. Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, category: Category, handler: F) -> Subscription
    where
        F: Fn(&EventPayload) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let handler: EventHandler = Arc::new(handler);

        let mut categories = self.inner.categories.lock();
        if let Some(entry) = categories.get_mut(&category) {
            entry.handlers.push((id, handler));
        } else {
            let cancel = CancellationToken::new();
            let weak = Arc::downgrade(&self.inner);
            let deliver = Arc::new(move |payload: &EventPayload| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(payload);
                }
            });

            let connection = EventConnection::new(
                category,
                Arc::clone(&self.inner.source),
                Backoff::new(&self.inner.config),
                deliver,
                self.inner.callback.clone(),
                cancel.clone(),
            );
            tokio::spawn(connection.run());

            categories.insert(
                category,
                CategoryEntry {
                    handlers: vec![(id, handler)],
                    cancel,
                },
            );
        }

        Subscription {
            inner: Arc::downgrade(&self.inner),
            category,
            id,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Whether a physical connection currently exists for the category.
    #[must_use]
    pub fn is_open(&self, category: Category) -> bool {
        self.inner.categories.lock().contains_key(&category)
    }

    /// Live subscriber count for the category.
    #[must_use]
    pub fn subscriber_count(&self, category: Category) -> usize {
        self.inner
            .categories
            .lock()
            .get(&category)
            .map_or(0, |entry| entry.handlers.len())
    }
}

/// A live (category, handler) registration.
///
/// Cancelling (or dropping) removes the handler; once `cancel` returns the
/// handler is never invoked again. The last cancellation for a category
/// stops its connection immediately, even one asleep in a backoff delay.
pub struct Subscription {
    inner: Weak<MuxInner>,
    category: Category,
    id: u64,
    cancelled: AtomicBool,
}

impl Subscription {
    /// Cancels the subscription.
    pub fn cancel(self) {
        self.cancel_inner();
    }

    fn cancel_inner(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let mut categories = inner.categories.lock();
        let Some(entry) = categories.get_mut(&self.category) else {
            return;
        };
        entry.handlers.retain(|(id, _)| *id != self.id);

        if entry.handlers.is_empty() {
            let entry = categories.remove(&self.category).expect("entry present");
            entry.cancel.cancel();
            tracing::debug!(category = ?self.category, "last subscriber gone, closing channel");
            emit(
                inner.callback.as_ref(),
                RelayEvent::ChannelClosed {
                    category: self.category,
                },
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamError;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::atomic::AtomicUsize;

    /// Source that never yields; just tracks open calls.
    struct SilentSource {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl EventSource for SilentSource {
        async fn open(&self) -> Result<crate::events::sse::EnvelopeStream, StreamError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(futures_util::stream::pending().boxed())
        }
    }

    fn silent_mux() -> (EventMultiplexer, Arc<SilentSource>) {
        let source = Arc::new(SilentSource {
            opens: AtomicUsize::new(0),
        });
        let mux = EventMultiplexer::new(source.clone(), EventConfig::default(), None);
        (mux, source)
    }

    #[tokio::test]
    async fn test_connection_open_iff_subscribers() {
        let (mux, _source) = silent_mux();
        assert!(!mux.is_open(Category::Log));

        let sub_a = mux.subscribe(Category::Log, |_| {});
        let sub_b = mux.subscribe(Category::Log, |_| {});
        assert!(mux.is_open(Category::Log));
        assert_eq!(mux.subscriber_count(Category::Log), 2);

        sub_a.cancel();
        assert!(mux.is_open(Category::Log), "one subscriber still live");

        sub_b.cancel();
        assert!(!mux.is_open(Category::Log));
        assert_eq!(mux.subscriber_count(Category::Log), 0);
    }

    #[tokio::test]
    async fn test_one_physical_connection_per_category() {
        let (mux, source) = silent_mux();
        let _a = mux.subscribe(Category::Log, |_| {});
        let _b = mux.subscribe(Category::Log, |_| {});
        let _c = mux.subscribe(Category::Log, |_| {});

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(source.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_connection_after_resubscribe() {
        let (mux, source) = silent_mux();
        let sub = mux.subscribe(Category::Log, |_| {});
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sub.cancel();

        let _sub = mux.subscribe(Category::Log, |_| {});
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(source.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_categories_do_not_share_connections() {
        let (mux, source) = silent_mux();
        let _a = mux.subscribe(Category::Log, |_| {});
        let _b = mux.subscribe(Category::DownloadProgress, |_| {});

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(source.opens.load(Ordering::SeqCst), 2);
        assert!(mux.is_open(Category::Log));
        assert!(mux.is_open(Category::DownloadProgress));
    }

    #[tokio::test]
    async fn test_drop_cancels_subscription() {
        let (mux, _source) = silent_mux();
        {
            let _sub = mux.subscribe(Category::Verification, |_| {});
            assert!(mux.is_open(Category::Verification));
        }
        assert!(!mux.is_open(Category::Verification));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let (mux, _source) = silent_mux();
        let delivered = Arc::new(AtomicUsize::new(0));
        let delivered_clone = delivered.clone();

        let _bad = mux.subscribe(Category::Log, |_| panic!("subscriber bug"));
        let _good = mux.subscribe(Category::Log, move |_| {
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        });

        let payload = EventPayload::Log(crate::LogEvent {
            level: None,
            message: "hello".into(),
        });
        mux.inner.dispatch(&payload);
        mux.inner.dispatch(&payload);

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }
}
