//! Lazily populated map driven by a factory.
//!
//! [`LazyMap`] is configured once with a factory `Fn(&K) -> V` and afterwards
//! only asked for keys. The first request for a key runs the factory for it,
//! exactly once, and every later request until the key is removed gets that
//! same value back.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;
use std::sync::Arc;

use crate::abort::ComputationAbort;
use crate::map::{Action, OnceMap};

/// A concurrent map whose values are produced on first access by a factory.
///
/// The factory should be deterministic in its key; the map only guarantees
/// that each key epoch sees the result of a single factory call.
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use keyed_once::LazyMap;
///
/// #[derive(Default)]
/// struct Person {
///    id: String,
///    name: String,
/// }
///
/// let people = LazyMap::new(|id: &String| {
///    Arc::new(Mutex::new(Person {
///       id: id.clone(),
///       ..Person::default()
///    }))
/// });
///
/// let first = people.get("1");
/// let second = people.get("1");
/// first.lock().unwrap().name = "John Doe".to_string();
/// assert_eq!(second.lock().unwrap().name, "John Doe");
/// assert_eq!(second.lock().unwrap().id, "1");
/// ```
pub struct LazyMap<K, V, F, S = RandomState> {
   factory: Arc<F>,
   entries: OnceMap<K, V, S>,
}

impl<K, V, F> LazyMap<K, V, F>
where
   K: Eq + Hash,
   F: Fn(&K) -> V,
{
   /// Creates an empty map that fills itself with `factory`.
   #[must_use]
   pub fn new(factory: F) -> Self {
      Self {
         factory: Arc::new(factory),
         entries: OnceMap::new(),
      }
   }
}

impl<K, V, F, S> LazyMap<K, V, F, S>
where
   K: Eq + Hash,
   F: Fn(&K) -> V,
   S: BuildHasher + Clone,
{
   /// Creates an empty map that fills itself with `factory` and hashes keys with `hasher`.
   #[must_use]
   pub fn with_hasher(factory: F, hasher: S) -> Self {
      Self {
         factory: Arc::new(factory),
         entries: OnceMap::with_hasher(hasher),
      }
   }

   /// The factory this map was configured with.
   pub fn factory(&self) -> &F {
      &self.factory
   }

   /// Removes `key`; the next [`get`](Self::get) runs the factory again.
   pub fn remove<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.entries.remove(key)
   }

   /// Checks if `key` has been requested since it was last removed.
   pub fn contains_key<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.entries.contains_key(key)
   }

   /// Number of keys currently held.
   pub fn len(&self) -> usize {
      self.entries.len()
   }

   /// Checks if the map holds no keys.
   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }
}

impl<K, V, F, S> LazyMap<K, V, F, S>
where
   K: Eq + Hash + Send + 'static,
   F: Fn(&K) -> V + Send + Sync + 'static,
   S: BuildHasher + Clone,
{
   fn slot<Q>(&self, key: &Q) -> Arc<Action<V>>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
   {
      if let Some(slot) = self.entries.existing(key) {
         return slot;
      }
      let factory = Arc::clone(&self.factory);
      let owned = key.to_owned();
      self.entries.install(key.to_owned(), move || (*factory)(&owned))
   }

   /// Returns the value for `key`, running the factory if the key is new.
   ///
   /// If the factory panicked for this key, the recorded abort is raised here
   /// until the key is removed.
   pub fn get<Q>(&self, key: &Q) -> V
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
      V: Clone,
   {
      self.slot(key).invoke().clone()
   }

   /// Like [`get`](Self::get), but returns the abort instead of unwinding.
   pub fn try_get<Q>(&self, key: &Q) -> Result<V, ComputationAbort>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
      V: Clone,
   {
      self.slot(key).try_invoke().cloned()
   }

   /// Async flavour of [`get`](Self::get).
   pub async fn get_async<Q>(&self, key: &Q) -> V
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
      V: Clone,
   {
      self.slot(key).invoke_async().await.clone()
   }

   /// Async flavour of [`try_get`](Self::try_get).
   pub async fn try_get_async<Q>(&self, key: &Q) -> Result<V, ComputationAbort>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
      V: Clone,
   {
      self.slot(key).try_invoke_async().await.cloned()
   }

   /// Values of every key currently held, forcing any that are still pending.
   pub fn values(&self) -> Vec<V>
   where
      V: Clone,
   {
      self.entries.values()
   }
}

impl<K, V, F, S> fmt::Debug for LazyMap<K, V, F, S>
where
   K: Eq + Hash + fmt::Debug,
   V: fmt::Debug,
   S: BuildHasher + Clone,
{
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("LazyMap")
         .field("entries", &self.entries)
         .finish_non_exhaustive()
   }
}
