use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use keyed_once::{once_fn, once_value, once_values, ComputationAbort};

#[test]
fn test_once_fn() {
   let counter = Arc::new(AtomicUsize::new(0));
   let counter_clone = Arc::clone(&counter);
   let f = once_fn(move || {
      counter_clone.fetch_add(1, Ordering::SeqCst);
   });

   let threads: Vec<_> = (0..100)
      .map(|_| {
         let f = f.clone();
         thread::spawn(move || f())
      })
      .collect();
   for handle in threads {
      handle.join().unwrap();
   }
   f();

   assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_once_value() {
   let called = Arc::new(AtomicI64::new(0));
   let sum = Arc::new(AtomicI64::new(0));
   let called_clone = Arc::clone(&called);
   let f = once_value(move || called_clone.fetch_add(1, Ordering::SeqCst) + 1);

   let threads: Vec<_> = (0..100)
      .map(|_| {
         let f = f.clone();
         let sum = Arc::clone(&sum);
         thread::spawn(move || {
            sum.fetch_add(f(), Ordering::SeqCst);
         })
      })
      .collect();
   for handle in threads {
      handle.join().unwrap();
   }

   assert_eq!(called.load(Ordering::SeqCst), 1);
   // Every caller saw the single run's value
   assert_eq!(sum.load(Ordering::SeqCst), 100);
}

#[test]
fn test_once_values() {
   let called = Arc::new(AtomicI64::new(0));
   let sum1 = Arc::new(AtomicI64::new(0));
   let sum2 = Arc::new(AtomicI64::new(0));
   let called_clone = Arc::clone(&called);
   let f = once_values(move || {
      let n = called_clone.fetch_add(1, Ordering::SeqCst) + 1;
      (n, -n)
   });

   let threads: Vec<_> = (0..100)
      .map(|_| {
         let f = f.clone();
         let sum1 = Arc::clone(&sum1);
         let sum2 = Arc::clone(&sum2);
         thread::spawn(move || {
            let (v1, v2) = f();
            sum1.fetch_add(v1, Ordering::SeqCst);
            sum2.fetch_add(v2, Ordering::SeqCst);
         })
      })
      .collect();
   for handle in threads {
      handle.join().unwrap();
   }

   assert_eq!(called.load(Ordering::SeqCst), 1);
   assert_eq!(sum1.load(Ordering::SeqCst), 100);
   assert_eq!(sum2.load(Ordering::SeqCst), -100);
}

#[test]
fn test_once_value_panics_every_call() {
   let counter = Arc::new(AtomicUsize::new(0));
   let counter_clone = Arc::clone(&counter);
   let f = once_value(move || -> String {
      counter_clone.fetch_add(1, Ordering::SeqCst);
      panic!("test")
   });

   let mut aborts = Vec::new();
   for _ in 0..100 {
      let payload = panic::catch_unwind(AssertUnwindSafe(|| f())).unwrap_err();
      aborts.push(ComputationAbort::from_payload(payload));
   }

   assert_eq!(counter.load(Ordering::SeqCst), 1);
   assert!(aborts.iter().all(|abort| abort.message() == "test"));
}

#[test]
fn test_once_fn_panics_every_call() {
   let counter = Arc::new(AtomicUsize::new(0));
   let counter_clone = Arc::clone(&counter);
   let f = once_fn(move || {
      counter_clone.fetch_add(1, Ordering::SeqCst);
      panic!("test")
   });

   for _ in 0..100 {
      assert!(panic::catch_unwind(AssertUnwindSafe(|| f())).is_err());
   }
   assert_eq!(counter.load(Ordering::SeqCst), 1);
}
