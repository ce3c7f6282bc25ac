//! Generic progress callback trait and implementations.
//!
//! Pipelines report one event per completed unit of work. Runs cannot be
//! cancelled from a callback; the callback only observes.

use std::marker::PhantomData;

/// Generic progress callback trait.
///
/// Type parameter `T` is the progress data type, allowing import and
/// export to report different information through the same pattern.
/// Callbacks may be invoked from any task, so implementations must be
/// `Send + Sync`.
pub trait ProgressCallback<T>: Send + Sync {
    /// Called once per completed unit of work.
    ///
    /// # Arguments
    /// * `progress` - Progress data for the current operation
    fn on_progress(&self, progress: &T);
}

/// A progress callback that ignores every event.
pub struct NoOpProgress;

impl<T> ProgressCallback<T> for NoOpProgress {
    fn on_progress(&self, _progress: &T) {}
}

/// A progress callback that wraps a closure.
pub struct FnProgress<F, T> {
    callback: F,
    _marker: PhantomData<fn(&T)>,
}

impl<F, T> FnProgress<F, T>
where
    F: Fn(&T) + Send + Sync,
{
    /// Create a new closure-based progress callback.
    ///
    /// # Arguments
    /// * `callback` - Closure that receives each progress event
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _marker: PhantomData,
        }
    }
}

impl<F, T> ProgressCallback<T> for FnProgress<F, T>
where
    F: Fn(&T) + Send + Sync,
{
    fn on_progress(&self, progress: &T) {
        (self.callback)(progress)
    }
}

/// Create a progress callback from a closure.
///
/// # Arguments
/// * `f` - Closure that receives each progress event
pub fn progress_fn<F, T>(f: F) -> FnProgress<F, T>
where
    F: Fn(&T) + Send + Sync,
{
    FnProgress::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    struct TestProgress {
        count: u64,
    }

    #[test]
    fn test_noop_progress() {
        let progress: NoOpProgress = NoOpProgress;
        progress.on_progress(&TestProgress { count: 42 });
    }

    #[test]
    fn test_fn_progress_sees_every_event() {
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone: Arc<Mutex<Vec<u64>>> = Arc::clone(&seen);

        let callback = progress_fn(move |p: &TestProgress| {
            seen_clone.lock().unwrap().push(p.count);
        });

        callback.on_progress(&TestProgress { count: 1 });
        callback.on_progress(&TestProgress { count: 2 });

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_fn_progress_as_trait_object() {
        let counter: Arc<AtomicU64> = Arc::new(AtomicU64::new(0));
        let counter_clone: Arc<AtomicU64> = Arc::clone(&counter);

        let callback = progress_fn(move |p: &TestProgress| {
            counter_clone.fetch_add(p.count, Ordering::SeqCst);
        });
        let dynamic: &dyn ProgressCallback<TestProgress> = &callback;

        dynamic.on_progress(&TestProgress { count: 3 });
        dynamic.on_progress(&TestProgress { count: 4 });

        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }
}
