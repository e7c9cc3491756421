//! Callables that run their body once.
//!
//! Each constructor wraps a computation in a shared [`OnceAction`] and returns a
//! closure over it. The closure can be cloned and called from any number of
//! threads; the body runs on the first call and every call, concurrent or
//! later, observes that run. If the body panics, every call panics with the same
//! [`ComputationAbort`](crate::ComputationAbort).

use std::sync::Arc;

use crate::action::OnceAction;

/// Returns a function that runs `f` only once.
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// static CALLS: AtomicUsize = AtomicUsize::new(0);
///
/// let init = keyed_once::once_fn(|| {
///    CALLS.fetch_add(1, Ordering::SeqCst);
/// });
/// init();
/// init();
/// assert_eq!(CALLS.load(Ordering::SeqCst), 1);
/// ```
pub fn once_fn<F>(f: F) -> impl Fn() + Clone + Send + Sync
where
   F: FnOnce() + Send + 'static,
{
   let action = Arc::new(OnceAction::new(f));
   move || {
      action.invoke();
   }
}

/// Returns a function that runs `f` only once and hands out clones of its result.
pub fn once_value<T, F>(f: F) -> impl Fn() -> T + Clone + Send + Sync
where
   F: FnOnce() -> T + Send + 'static,
   T: Clone + Send + Sync + 'static,
{
   let action = Arc::new(OnceAction::new(f));
   move || action.invoke().clone()
}

/// Returns a function that runs `f` only once and hands out clones of the pair it returned.
pub fn once_values<A, B, F>(f: F) -> impl Fn() -> (A, B) + Clone + Send + Sync
where
   F: FnOnce() -> (A, B) + Send + 'static,
   A: Clone + Send + Sync + 'static,
   B: Clone + Send + Sync + 'static,
{
   let action = Arc::new(OnceAction::new(f));
   move || action.invoke().clone()
}
