//! Trailing-edge debounce for bursty events.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Collapses events arriving within a window into the last one.
///
/// Every [`push`](Debouncer::push) restarts the window. When the window
/// passes without another push, the latest value is delivered to the sink.
/// A zero window delivers synchronously, as does a push made outside a
/// tokio runtime.
pub struct Debouncer<T> {
    window: Duration,
    sink: Sink<T>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Creates a debouncer delivering to `sink`.
    pub fn new<F>(window: Duration, sink: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            window,
            sink: Arc::new(sink),
            pending: Mutex::new(None),
        }
    }

    /// The debounce window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Submits a value, replacing any value still waiting out the window.
    pub fn push(&self, value: T) {
        self.cancel();

        if self.window.is_zero() {
            (self.sink)(value);
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            debug!("no runtime available, delivering debounced value immediately");
            (self.sink)(value);
            return;
        };

        let sink = Arc::clone(&self.sink);
        let window = self.window;
        let task = handle.spawn(async move {
            tokio::time::sleep(window).await;
            sink(value);
        });
        *self.pending.lock() = Some(task);
    }

    /// Drops the value waiting out the window, if any.
    pub fn cancel(&self) {
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
    }

    /// Returns true if a value is waiting to be delivered.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        (seen, move |v: u32| sink_seen.lock().push(v))
    }

    #[test]
    fn zero_window_is_synchronous() {
        let (seen, sink) = collecting();
        let debouncer = Debouncer::new(Duration::ZERO, sink);
        debouncer.push(1);
        debouncer.push(2);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_last_value() {
        let (seen, sink) = collecting();
        let debouncer = Debouncer::new(Duration::from_millis(500), sink);

        debouncer.push(1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.push(2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.push(3);
        assert!(seen.lock().is_empty());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*seen.lock(), vec![3]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_value() {
        let (seen, sink) = collecting();
        let debouncer = Debouncer::new(Duration::from_millis(100), sink);

        debouncer.push(7);
        debouncer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(seen.lock().is_empty());
    }
}
