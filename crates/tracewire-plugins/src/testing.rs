//! Log capture shared by unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Counts WARN events seen by the subscriber it is layered onto.
#[derive(Clone, Default)]
pub(crate) struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    /// Run `f` under a thread-local subscriber and return its result with
    /// the number of warnings emitted meanwhile.
    pub(crate) fn capture<T>(f: impl FnOnce() -> T) -> (T, usize) {
        let counter = Self::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, counter.0.load(Ordering::SeqCst))
    }
}

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}
