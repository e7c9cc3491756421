//! Thread-safe "run exactly once" actions, single or keyed.
//!
//! This crate grows a once cell into a keyed collection of independently
//! guarded computations:
//!
//! - [`OnceAction<F, T>`]: owns a computation and runs it at most once. All
//!   invokers wait for that run and share its outcome.
//! - [`once_fn`], [`once_value`], [`once_values`]: the same, packaged as
//!   cloneable closures.
//! - [`OnceMap<K, V>`]: one `OnceAction` per key. Each key's computation runs at
//!   most once until the key is removed, independently of every other key.
//! - [`LazyMap<K, V, F>`]: a `OnceMap` filled on demand by a factory configured
//!   up front.
//!
//! The only failure is a computation that panics. The panic is captured as a
//! [`ComputationAbort`] and replayed to every caller of that action, the one
//! that triggered it and everyone after, instead of being retried or swallowed.
//! Every forcing operation has a `try_` twin returning the abort as an error.
//!
//! # Features
//!
//! - **Lock-free fast path**: Reading a settled outcome is a single atomic load.
//! - **Efficient blocking**: Waiters park on a futex until the outcome is recorded.
//! - **Async support**: Async callers wait without blocking the executor.
//! - **Failure replay**: Aborts are permanent for the lifetime of the action.
//!
//! # Examples
//!
//! ## Keyed computations
//!
//! ```rust
//! use keyed_once::OnceMap;
//!
//! let squares: OnceMap<u64, u64> = OnceMap::new();
//!
//! assert_eq!(squares.get_or_init(3, || 9), 9);
//! // The key already has an action, this closure is dropped without running.
//! assert_eq!(squares.get_or_init(3, || unreachable!()), 9);
//!
//! squares.remove(&3);
//! assert_eq!(squares.get_or_init(3, || 10), 10);
//! ```
//!
//! ## Failure replay
//!
//! ```rust
//! use keyed_once::OnceAction;
//!
//! let action = OnceAction::new(|| -> u32 { panic!("backend unavailable") });
//!
//! let first = action.try_invoke().unwrap_err();
//! let second = action.try_invoke().unwrap_err();
//! assert_eq!(first, second);
//! assert_eq!(first.message(), "backend unavailable");
//! ```

/// Captured computation failures.
mod abort;

/// Run-once action with outcome replay.
mod action;

/// Closures wrapping a once action.
mod func;

/// Factory driven lazy map.
mod lazy;

/// Keyed once actions.
mod map;

/// Internal synchronization state management.
mod state;

pub use abort::ComputationAbort;
pub use action::OnceAction;
pub use func::{once_fn, once_value, once_values};
pub use lazy::LazyMap;
pub use map::{Action, FuncMap, OnceMap, Thunk, ValuesMap};
pub use state::ActionState;
