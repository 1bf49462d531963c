use core::hash::BuildHasher;
use core::hash::Hash;
use core::hint::black_box;

use criterion::AxisScale;
use criterion::BatchSize;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use monohash::HashTable;
use monohash::HeapAllocator;
use monohash::MonoAllocator;
use monohash::hash_map::HashMap as MonoHashMap;
use monohash::hash_table::Cached;
use monohash::hash_table::DefaultEq;
use monohash::recycling::NoRecycling;
use monohash::recycling::Private;
use rand::Rng;
use rand::SeedableRng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand_distr::Zipf;
use siphasher::sip::SipHasher;

#[derive(Clone, Copy)]
struct SipState {
    k0: u64,
    k1: u64,
}

impl BuildHasher for SipState {
    type Hasher = SipHasher;

    fn build_hasher(&self) -> SipHasher {
        SipHasher::new_with_keys(self.k0, self.k1)
    }
}

impl Default for SipState {
    fn default() -> Self {
        let mut rng = OsRng;
        Self {
            k0: rng.try_next_u64().unwrap(),
            k1: rng.try_next_u64().unwrap(),
        }
    }
}

trait BenchKey: Hash + Eq + Clone {
    fn new(key: u64) -> Self;
}

impl BenchKey for u64 {
    fn new(key: u64) -> Self {
        black_box(key)
    }
}

impl BenchKey for String {
    fn new(key: u64) -> Self {
        black_box(format!("key_{:016X}", key))
    }
}

type Mono<'a, K, R = Private> =
    MonoHashMap<'a, K, u64, SipState, DefaultEq, R, Cached, MonoAllocator>;
type Heap<'a, K> = MonoHashMap<'a, K, u64, SipState, DefaultEq, Private, Cached, HeapAllocator>;
type Hashbrown<K> = hashbrown::HashMap<K, u64, SipState>;
type Std<K> = std::collections::HashMap<K, u64, SipState>;

const SIZES: &[usize] = &[
    (1 << 10),
    (1 << 12),
    (1 << 14),
    (1 << 16),
];

fn random_keys<K: BenchKey>(count: usize) -> Vec<K> {
    let mut rng = OsRng;
    (0..count)
        .map(|_| K::new(rng.try_next_u64().unwrap()))
        .collect()
}

fn shuffled<K: Clone>(keys: &[K]) -> Vec<K> {
    let mut keys = keys.to_vec();
    keys.shuffle(&mut SmallRng::from_os_rng());
    keys
}

fn bench_insert_random<K: BenchKey>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("insert_random_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES {
        let keys = random_keys::<K>(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("monohash_mono/{size}"), |b| {
            b.iter_batched(
                || shuffled(&keys),
                |keys| {
                    let allocator = MonoAllocator::new();
                    let mut table: Mono<'_, K> = HashTable::new_in(&allocator);
                    for key in keys {
                        black_box(table.insert((key, 0)));
                    }
                    black_box(table.len())
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("monohash_heap/{size}"), |b| {
            b.iter_batched(
                || shuffled(&keys),
                |keys| {
                    let allocator = HeapAllocator;
                    let mut table: Heap<'_, K> = HashTable::new_in(&allocator);
                    for key in keys {
                        black_box(table.insert((key, 0)));
                    }
                    black_box(table.len())
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || shuffled(&keys),
                |keys| {
                    let mut table = Hashbrown::<K>::default();
                    for key in keys {
                        black_box(table.insert(key, 0));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("std/{size}"), |b| {
            b.iter_batched(
                || shuffled(&keys),
                |keys| {
                    let mut table = Std::<K>::default();
                    for key in keys {
                        black_box(table.insert(key, 0));
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_find_hit_miss<K: BenchKey>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("find_hit_miss_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES {
        let present = random_keys::<K>(size);
        let mut probes = random_keys::<K>(size);
        probes.extend(present.iter().cloned());
        probes.shuffle(&mut SmallRng::from_os_rng());
        group.throughput(Throughput::Elements(probes.len() as u64));

        let allocator = MonoAllocator::new();
        let mut mono: Mono<'_, K> = HashTable::new_in(&allocator);
        mono.extend(present.iter().cloned().map(|key| (key, 0)));
        group.bench_function(format!("monohash/{size}"), |b| {
            b.iter(|| {
                for probe in &probes {
                    black_box(mono.find(probe));
                }
            })
        });

        let hashbrown: Hashbrown<K> = present.iter().cloned().map(|key| (key, 0)).collect();
        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                for probe in &probes {
                    black_box(hashbrown.get(probe));
                }
            })
        });

        let std: Std<K> = present.iter().cloned().map(|key| (key, 0)).collect();
        group.bench_function(format!("std/{size}"), |b| {
            b.iter(|| {
                for probe in &probes {
                    black_box(std.get(probe));
                }
            })
        });
    }

    group.finish();
}

fn bench_churn<K: BenchKey>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("churn_{}", core::any::type_name::<K>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    for &size in SIZES {
        let keys = random_keys::<K>(size);
        let mut operations = keys.iter().chain(keys.iter()).cloned().collect::<Vec<K>>();
        operations.shuffle(&mut SmallRng::from_os_rng());
        group.throughput(Throughput::Elements(operations.len() as u64));

        group.bench_function(format!("monohash_private/{size}"), |b| {
            b.iter_batched(
                || operations.clone(),
                |operations| {
                    let allocator = MonoAllocator::new();
                    let mut table: Mono<'_, K> = HashTable::new_in(&allocator);
                    for key in operations {
                        if table.erase_unique(&key) {
                            continue;
                        }
                        table.insert((key, 0));
                    }
                    black_box(allocator.allocated_bytes())
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("monohash_no_recycling/{size}"), |b| {
            b.iter_batched(
                || operations.clone(),
                |operations| {
                    let allocator = MonoAllocator::new();
                    let mut table: Mono<'_, K, NoRecycling> = HashTable::new_in(&allocator);
                    for key in operations {
                        if table.erase_unique(&key) {
                            continue;
                        }
                        table.insert((key, 0));
                    }
                    black_box(allocator.allocated_bytes())
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || operations.clone(),
                |operations| {
                    let mut table = Hashbrown::<K>::default();
                    for key in operations {
                        if table.remove(&key).is_none() {
                            table.insert(key, 0);
                        }
                    }
                    black_box(table)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[derive(Clone, Copy)]
enum Operation {
    Insert,
    Find,
    Remove,
}

fn bench_mixed_zipf<K: BenchKey>(c: &mut Criterion) {
    const KEY_SPACE_MULTIPLIER: f32 = 2.0;

    for exponent in [1.0, 1.3] {
        let mut group = c.benchmark_group(format!(
            "mixed_zipf_{:.01}_{}",
            exponent,
            core::any::type_name::<K>()
        ));
        group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

        for &size in SIZES {
            let mut rng = SmallRng::from_os_rng();
            let op_distr = Zipf::new(3.0, exponent).unwrap();
            let insert_distr = Zipf::new(size as f32, 1.0).unwrap();
            let lookup_distr = Zipf::new(size as f32 * KEY_SPACE_MULTIPLIER, 1.0).unwrap();

            let workload = (0..size * 3)
                .map(|_| {
                    let op_choice: f64 = rng.sample(op_distr);
                    if op_choice <= 1.0 {
                        (Operation::Find, K::new(rng.sample(lookup_distr) as u64))
                    } else if op_choice <= 2.0 {
                        (Operation::Insert, K::new(rng.sample(insert_distr) as u64))
                    } else {
                        (Operation::Remove, K::new(rng.sample(lookup_distr) as u64))
                    }
                })
                .collect::<Vec<(Operation, K)>>();
            group.throughput(Throughput::Elements(workload.len() as u64));

            group.bench_function(format!("monohash/{size}"), |b| {
                b.iter_batched(
                    || workload.clone(),
                    |workload| {
                        let allocator = MonoAllocator::new();
                        let mut table: Mono<'_, K> = HashTable::new_in(&allocator);
                        for (operation, key) in workload {
                            match operation {
                                Operation::Insert => {
                                    black_box(table.insert_or_assign(key, 1));
                                }
                                Operation::Find => {
                                    black_box(table.find(&key));
                                }
                                Operation::Remove => {
                                    black_box(table.erase_unique(&key));
                                }
                            }
                        }
                        black_box(table.len())
                    },
                    BatchSize::SmallInput,
                )
            });

            group.bench_function(format!("hashbrown/{size}"), |b| {
                b.iter_batched(
                    || workload.clone(),
                    |workload| {
                        let mut table = Hashbrown::<K>::default();
                        for (operation, key) in workload {
                            match operation {
                                Operation::Insert => {
                                    black_box(table.insert(key, 1));
                                }
                                Operation::Find => {
                                    black_box(table.get(&key));
                                }
                                Operation::Remove => {
                                    black_box(table.remove(&key));
                                }
                            }
                        }
                        black_box(table)
                    },
                    BatchSize::SmallInput,
                )
            });
        }

        group.finish();
    }
}

criterion_group!(
    benches,
    bench_insert_random::<u64>,
    bench_insert_random::<String>,
    bench_find_hit_miss::<u64>,
    bench_find_hit_miss::<String>,
    bench_churn::<u64>,
    bench_churn::<String>,
    bench_mixed_zipf::<u64>,
    bench_mixed_zipf::<String>,
);

criterion_main!(benches);
