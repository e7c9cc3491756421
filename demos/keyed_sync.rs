use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use keyed_once::OnceMap;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn load_config(map: &OnceMap<String, String>, name: &str) -> String {
   let owned = name.to_string();
   map.get_or_init(name.to_string(), move || {
      // This closure runs only once per key
      COUNTER.fetch_add(1, Ordering::Relaxed);
      println!("Loading {}...", owned);
      std::thread::sleep(std::time::Duration::from_millis(50));
      format!("contents of {}", owned)
   })
}

fn main() {
   let configs: Arc<OnceMap<String, String>> = Arc::new(OnceMap::new());

   let threads: Vec<_> = (0..10)
      .map(|i| {
         let configs = Arc::clone(&configs);
         std::thread::spawn(move || {
            let name = if i % 2 == 0 { "app.toml" } else { "db.toml" };
            println!("Thread {} got: {}", i, load_config(&configs, name));
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   assert_eq!(COUNTER.load(Ordering::Relaxed), 2); // Once per key
   assert_eq!(configs.len(), 2);

   configs.remove("db.toml");
   load_config(&configs, "db.toml");
   assert_eq!(COUNTER.load(Ordering::Relaxed), 3); // Reloaded after removal
}
