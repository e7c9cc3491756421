use std::collections::hash_map::RandomState;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use keyed_once::{ComputationAbort, LazyMap};

#[derive(Debug, Default)]
struct Record {
   id: String,
   name: String,
}

#[test]
fn test_get() {
   let actual = Arc::new(AtomicUsize::new(0));
   let actual_clone = Arc::clone(&actual);
   let pool = Arc::new(LazyMap::new(move |key: &String| {
      actual_clone.fetch_add(1, Ordering::SeqCst);
      key.clone()
   }));

   let threads: Vec<_> = (0..100)
      .map(|_| {
         let pool = Arc::clone(&pool);
         thread::spawn(move || {
            assert_eq!(pool.get("key1"), "key1");
         })
      })
      .collect();
   for handle in threads {
      handle.join().unwrap();
   }

   assert_eq!(pool.get("key2"), "key2");
   assert_eq!(actual.load(Ordering::SeqCst), 2);
   assert_eq!(pool.len(), 2);

   assert!(pool.remove("key1"));
   assert_eq!(pool.len(), 1);
   assert!(!pool.contains_key("key1"));

   // Removal starts a new epoch, the factory runs again
   assert_eq!(pool.get("key1"), "key1");
   assert_eq!(actual.load(Ordering::SeqCst), 3);
}

#[test]
fn test_shared_record_identity() {
   let created = Arc::new(AtomicUsize::new(0));
   let created_clone = Arc::clone(&created);
   let people = Arc::new(LazyMap::new(move |id: &String| {
      created_clone.fetch_add(1, Ordering::SeqCst);
      Arc::new(Mutex::new(Record {
         id: id.clone(),
         ..Record::default()
      }))
   }));

   let threads: Vec<_> = (0..100)
      .map(|_| {
         let people = Arc::clone(&people);
         thread::spawn(move || people.get("1"))
      })
      .collect();
   let records: Vec<_> = threads.into_iter().map(|h| h.join().unwrap()).collect();

   assert_eq!(created.load(Ordering::SeqCst), 1);
   assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));

   records[0].lock().unwrap().name = "John Doe".to_string();
   for record in &records {
      let record = record.lock().unwrap();
      assert_eq!(record.id, "1");
      assert_eq!(record.name, "John Doe");
   }
   assert_eq!(people.get("1").lock().unwrap().name, "John Doe");
}

#[test]
fn test_factory_panic_is_replayed() {
   let calls = Arc::new(AtomicUsize::new(0));
   let calls_clone = Arc::clone(&calls);
   let lazy = LazyMap::new(move |key: &u32| -> u32 {
      calls_clone.fetch_add(1, Ordering::SeqCst);
      if *key == 13 {
         panic!("unlucky key {}", key);
      }
      key * 2
   });

   let first = lazy.try_get(&13).unwrap_err();
   assert_eq!(first.message(), "unlucky key 13");
   for _ in 0..10 {
      assert_eq!(lazy.try_get(&13), Err(first.clone()));
      let payload = panic::catch_unwind(AssertUnwindSafe(|| lazy.get(&13))).unwrap_err();
      assert_eq!(ComputationAbort::from_payload(payload), first);
   }
   assert_eq!(calls.load(Ordering::SeqCst), 1);

   // Other keys are unaffected
   assert_eq!(lazy.get(&4), 8);
   assert_eq!(calls.load(Ordering::SeqCst), 2);

   // Removing the failed key lets the factory run once more
   lazy.remove(&13);
   assert!(lazy.try_get(&13).is_err());
   assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_values_and_len() {
   let lazy = LazyMap::with_hasher(|key: &u32| key + 100, RandomState::new());
   assert!(lazy.is_empty());

   lazy.get(&1);
   lazy.get(&2);
   assert_eq!(lazy.len(), 2);

   let mut values = lazy.values();
   values.sort_unstable();
   assert_eq!(values, vec![101, 102]);

   lazy.remove(&1);
   assert_eq!(lazy.len(), 1);
   assert_eq!(lazy.values(), vec![102]);
   assert_eq!((lazy.factory())(&7), 107);
}

#[test]
fn test_debug() {
   let lazy = LazyMap::new(|key: &u8| *key);
   lazy.get(&3);
   assert_eq!(format!("{:?}", lazy), "LazyMap { entries: {3: OnceAction(3)}, .. }");
}

#[tokio::test]
async fn test_get_async() {
   let calls = Arc::new(AtomicUsize::new(0));
   let calls_clone = Arc::clone(&calls);
   let lazy = LazyMap::new(move |key: &String| {
      calls_clone.fetch_add(1, Ordering::SeqCst);
      key.len()
   });

   assert_eq!(lazy.get_async("four").await, 4);
   assert_eq!(lazy.get_async("four").await, 4);
   assert_eq!(lazy.get("four"), 4);
   assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_try_get_async() {
   let lazy = LazyMap::new(|key: &u8| -> u8 {
      if *key == 0 {
         panic!("zero key");
      }
      *key
   });

   assert_eq!(lazy.try_get_async(&1).await, Ok(1));
   let abort = lazy.try_get_async(&0).await.unwrap_err();
   assert_eq!(abort.message(), "zero key");
   assert_eq!(lazy.try_get(&0), Err(abort));
}

#[tokio::test]
async fn test_get_async_waits_for_thread_on_current_thread_runtime() {
   let started = Arc::new(Barrier::new(2));
   let started_clone = Arc::clone(&started);
   let lazy = Arc::new(LazyMap::new(move |key: &u32| {
      started_clone.wait();
      thread::sleep(Duration::from_millis(300));
      key + 1
   }));

   let runner = {
      let lazy = Arc::clone(&lazy);
      thread::spawn(move || lazy.get(&1))
   };

   started.wait();
   assert_eq!(lazy.get_async(&1).await, 2);
   assert_eq!(runner.join().unwrap(), 2);
}
