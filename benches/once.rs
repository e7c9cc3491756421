use criterion::{black_box, criterion_group, criterion_main, Criterion};
use keyed_once::{once_fn, once_value, once_values, FuncMap, LazyMap, OnceMap, ValuesMap};

fn bench_single(c: &mut Criterion) {
   let f = once_fn(|| {});
   c.bench_function("once_fn", |b| b.iter(|| f()));

   let value = once_value(|| 0_u64);
   c.bench_function("once_value", |b| b.iter(|| black_box(value())));

   let values = once_values(|| (0_u64, 0_u64));
   c.bench_function("once_values", |b| b.iter(|| black_box(values())));
}

fn bench_keyed(c: &mut Criterion) {
   c.bench_function("func_map_get_or_init", |b| {
      let map: FuncMap<u64> = OnceMap::new();
      let mut key = 0_u64;
      b.iter(|| {
         key += 1;
         map.get_or_init(key, || {});
      })
   });

   c.bench_function("once_map_get_or_init", |b| {
      let map: OnceMap<u64, u64> = OnceMap::new();
      let mut key = 0_u64;
      b.iter(|| {
         key += 1;
         black_box(map.get_or_init(key, || 0))
      })
   });

   c.bench_function("values_map_get_or_init", |b| {
      let map: ValuesMap<u64, u64, u64> = OnceMap::new();
      let mut key = 0_u64;
      b.iter(|| {
         key += 1;
         black_box(map.get_or_init(key, || (0, 0)))
      })
   });

   c.bench_function("lazy_map_get", |b| {
      let lazy = LazyMap::new(|key: &u64| *key);
      let mut key = 0_u64;
      b.iter(|| {
         key += 1;
         black_box(lazy.get(&key))
      })
   });

   c.bench_function("once_map_hit", |b| {
      let map: OnceMap<u64, u64> = OnceMap::new();
      map.get_or_init(1, || 1);
      b.iter(|| black_box(map.get_or_init(1, || 2)))
   });
}

criterion_group!(benches, bench_single, bench_keyed);
criterion_main!(benches);
