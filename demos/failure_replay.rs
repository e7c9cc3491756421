use std::sync::atomic::{AtomicUsize, Ordering};

use keyed_once::OnceMap;

static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

fn connect(map: &OnceMap<&'static str, String>, host: &'static str, fail: bool) {
   let result = map.try_get_or_init(host, move || {
      ATTEMPTS.fetch_add(1, Ordering::Relaxed);
      println!("Connecting to {} (fail={})...", host, fail);
      if fail {
         panic!("connection to {} refused", host);
      }
      format!("session for {}", host)
   });
   match result {
      Ok(session) => println!("Got {}", session),
      Err(abort) => println!("Caught: {}", abort),
   }
}

fn main() {
   let sessions = OnceMap::new();

   // The first attempt fails, and the failure sticks
   connect(&sessions, "db", true);
   connect(&sessions, "db", false);
   assert_eq!(ATTEMPTS.load(Ordering::Relaxed), 1);

   // Until the key is removed
   sessions.remove("db");
   connect(&sessions, "db", false);
   assert_eq!(ATTEMPTS.load(Ordering::Relaxed), 2);
   assert_eq!(sessions.get_or_init("db", || unreachable!()), "session for db");
}
