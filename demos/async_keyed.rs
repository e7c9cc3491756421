use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use keyed_once::LazyMap;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

#[tokio::main]
async fn main() {
   let lengths = Arc::new(LazyMap::new(|word: &String| {
      // Runs once per word
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Measuring {}...", word);
      word.len()
   }));

   let tasks: Vec<_> = (0..5)
      .map(|_| {
         let lengths = Arc::clone(&lengths);
         tokio::spawn(async move {
            println!("Task access: {}", lengths.get_async("keyed").await);
         })
      })
      .collect();

   for t in tasks {
      t.await.unwrap();
   }

   assert_eq!(lengths.get("keyed"), 5);
   assert_eq!(COUNTER.load(Ordering::Relaxed), 1);
}
