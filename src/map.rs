//! Keyed collection of once actions.
//!
//! [`OnceMap<K, V>`] maps every key to its own [`OnceAction`]. The first caller
//! to reach a key installs an action bound to its computation; everyone else
//! asking for that key, concurrently or later, shares the outcome of that one
//! action. Keys are independent: running one never runs, blocks or suppresses
//! another.
//!
//! Storage is a sharded [`DashMap`]. Its `entry` API makes installing an action
//! atomic, and the action's own lock makes running it atomic. Actions are kept
//! behind an `Arc` so that no shard lock is held while a computation runs and a
//! removed entry stays alive for whoever is still invoking it.
//!
//! A caller's closure is not guaranteed to run even for a key it has never seen
//! before: when two callers race on a fresh key, only the closure of the one
//! that installs first is kept; the other closure is dropped unexecuted and its
//! caller receives the winner's value.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::ops::ControlFlow;
use std::collections::hash_map::RandomState;
use std::sync::Arc;

use dashmap::DashMap;

use crate::abort::ComputationAbort;
use crate::action::OnceAction;

/// Boxed computation stored in a map entry until it runs.
pub type Thunk<V> = Box<dyn FnOnce() -> V + Send>;

/// The action stored for every key of a [`OnceMap`].
pub type Action<V> = OnceAction<Thunk<V>, V>;

/// A map of side effects keyed by `K`, each run at most once.
pub type FuncMap<K, S = RandomState> = OnceMap<K, (), S>;

/// A map of computations returning two values, each run at most once.
pub type ValuesMap<K, A, B, S = RandomState> = OnceMap<K, (A, B), S>;

/// A concurrent map from keys to values that are computed at most once per key.
///
/// The guarantee holds per key epoch: [`remove`](Self::remove) ends the epoch,
/// and the next [`get_or_init`](Self::get_or_init) for that key installs a
/// fresh action that may run again.
pub struct OnceMap<K, V, S = RandomState> {
   slots: DashMap<K, Arc<Action<V>>, S>,
}

impl<K, V> OnceMap<K, V>
where
   K: Eq + Hash,
{
   /// Creates an empty map.
   #[must_use]
   pub fn new() -> Self {
      Self {
         slots: DashMap::new(),
      }
   }

   /// Creates an empty map with room for at least `capacity` keys.
   #[must_use]
   pub fn with_capacity(capacity: usize) -> Self {
      Self {
         slots: DashMap::with_capacity(capacity),
      }
   }
}

impl<K, V, S> OnceMap<K, V, S>
where
   K: Eq + Hash,
   S: BuildHasher + Clone,
{
   /// Creates an empty map which will use `hasher` to hash keys.
   #[must_use]
   pub fn with_hasher(hasher: S) -> Self {
      Self {
         slots: DashMap::with_hasher(hasher),
      }
   }

   /// Creates an empty map with the given capacity and hasher.
   #[must_use]
   pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
      Self {
         slots: DashMap::with_capacity_and_hasher(capacity, hasher),
      }
   }

   /// Returns the action currently installed for `key`, if any.
   pub(crate) fn existing<Q>(&self, key: &Q) -> Option<Arc<Action<V>>>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.slots.get(key).map(|slot| Arc::clone(slot.value()))
   }

   /// Returns the action for `key`, installing one bound to `f` if there is none.
   ///
   /// `f` is only boxed when this call wins the insert.
   pub(crate) fn slot<F>(&self, key: K, f: F) -> Arc<Action<V>>
   where
      F: FnOnce() -> V + Send + 'static,
   {
      match self.existing(&key) {
         Some(slot) => slot,
         None => self.install(key, f),
      }
   }

   /// Like [`slot`](Self::slot), without looking for an existing action first.
   pub(crate) fn install<F>(&self, key: K, f: F) -> Arc<Action<V>>
   where
      F: FnOnce() -> V + Send + 'static,
   {
      let slot = self.slots.entry(key).or_insert_with(|| {
         log::trace!("installing once action for a new key epoch");
         Arc::new(OnceAction::new(Box::new(f) as Thunk<V>))
      });
      Arc::clone(slot.value())
   }

   /// Returns the value for `key`, computing it with `f` if this key has no action yet.
   ///
   /// Blocks while the key's computation runs on another thread. If the
   /// computation panicked, the recorded abort is raised here, for every caller
   /// until the key is removed.
   pub fn get_or_init<F>(&self, key: K, f: F) -> V
   where
      F: FnOnce() -> V + Send + 'static,
      V: Clone,
   {
      self.slot(key, f).invoke().clone()
   }

   /// Like [`get_or_init`](Self::get_or_init), but returns the abort instead of unwinding.
   pub fn try_get_or_init<F>(&self, key: K, f: F) -> Result<V, ComputationAbort>
   where
      F: FnOnce() -> V + Send + 'static,
      V: Clone,
   {
      self.slot(key, f).try_invoke().cloned()
   }

   /// Async flavour of [`get_or_init`](Self::get_or_init).
   pub async fn get_or_init_async<F>(&self, key: K, f: F) -> V
   where
      F: FnOnce() -> V + Send + 'static,
      V: Clone,
   {
      self.slot(key, f).invoke_async().await.clone()
   }

   /// Async flavour of [`try_get_or_init`](Self::try_get_or_init).
   pub async fn try_get_or_init_async<F>(&self, key: K, f: F) -> Result<V, ComputationAbort>
   where
      F: FnOnce() -> V + Send + 'static,
      V: Clone,
   {
      self.slot(key, f).try_invoke_async().await.cloned()
   }

   /// Removes `key`, ending its epoch. Returns `true` if the key was present.
   ///
   /// Callers already invoking the removed action still observe its outcome.
   pub fn remove<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      let removed = self.slots.remove(key).is_some();
      if removed {
         log::trace!("removed once action, key epoch ended");
      }
      removed
   }

   /// Checks if `key` currently has an action. Never runs anything.
   pub fn contains_key<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.slots.contains_key(key)
   }

   /// Number of keys currently held.
   ///
   /// A point-in-time count, concurrent inserts and removals may or may not be reflected.
   pub fn len(&self) -> usize {
      self.slots.len()
   }

   /// Checks if the map holds no keys.
   pub fn is_empty(&self) -> bool {
      self.slots.is_empty()
   }

   /// Clones out the actions currently installed, without holding any shard lock afterwards.
   fn snapshot(&self) -> Vec<Arc<Action<V>>> {
      self.slots.iter().map(|slot| Arc::clone(slot.value())).collect()
   }

   /// Forces every currently held key and returns the values.
   ///
   /// The order is unspecified. Keys inserted while this runs may be missed. If
   /// any of the computations aborted, its abort is raised here.
   pub fn values(&self) -> Vec<V>
   where
      V: Clone,
   {
      match self.try_values() {
         Ok(values) => values,
         Err(abort) => abort.raise(),
      }
   }

   /// Like [`values`](Self::values), but returns the first abort instead of unwinding.
   pub fn try_values(&self) -> Result<Vec<V>, ComputationAbort>
   where
      V: Clone,
   {
      self
         .snapshot()
         .iter()
         .map(|action| action.try_invoke().cloned())
         .collect()
   }

   /// Calls `visit` for every key and its action, in unspecified order.
   ///
   /// The keys are collected up front and `visit` runs without any lock held, so
   /// it may freely use the map. An entry removed before `visit` reaches it is
   /// skipped; keys inserted meanwhile are not visited. Return
   /// [`ControlFlow::Break`] to stop early.
   pub fn range<G>(&self, mut visit: G)
   where
      K: Clone,
      G: FnMut(&K, &Action<V>) -> ControlFlow<()>,
   {
      let entries: Vec<(K, Arc<Action<V>>)> = self
         .slots
         .iter()
         .map(|slot| (slot.key().clone(), Arc::clone(slot.value())))
         .collect();

      for (key, action) in entries {
         match self.existing(&key) {
            Some(current) if Arc::ptr_eq(&current, &action) => {}
            _ => continue,
         }
         if visit(&key, &action).is_break() {
            break;
         }
      }
   }
}

impl<K, V, S> Default for OnceMap<K, V, S>
where
   K: Eq + Hash,
   S: Default + BuildHasher + Clone,
{
   fn default() -> Self {
      Self::with_hasher(S::default())
   }
}

impl<K, V, S> fmt::Debug for OnceMap<K, V, S>
where
   K: Eq + Hash + fmt::Debug,
   V: fmt::Debug,
   S: BuildHasher + Clone,
{
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_map();
      for slot in self.slots.iter() {
         d.entry(slot.key(), &**slot.value());
      }
      d.finish()
   }
}
