use std::sync::{Arc, Mutex};

use keyed_once::LazyMap;

#[derive(Debug, Default)]
struct Person {
   id: String,
   name: String,
}

fn main() {
   let people = LazyMap::new(|id: &String| {
      println!("Creating person {}...", id);
      Arc::new(Mutex::new(Person {
         id: id.clone(),
         ..Person::default()
      }))
   });

   let instance1 = people.get("1");
   let instance2 = people.get("1");

   println!("Before: {:?}", instance2.lock().unwrap());
   instance1.lock().unwrap().name = "John Doe".to_string();
   println!("After: {:?}", instance2.lock().unwrap());

   // Both handles point at the record the factory created once
   assert!(Arc::ptr_eq(&instance1, &instance2));
   assert_eq!(instance2.lock().unwrap().name, "John Doe");
   assert_eq!(people.len(), 1);
}
