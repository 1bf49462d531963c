use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use monohash::DefaultHashBuilder;
use monohash::HashMap;
use monohash::HashSet;
use monohash::HashTable;
use monohash::HeapAllocator;
use monohash::MonoAllocator;
use monohash::ValueReference;
use monohash::hash_set::SetRecycler;
use monohash::hash_table::Cached;
use monohash::hash_table::DefaultEq;
use monohash::recycling::NoRecycling;
use monohash::recycling::Shared;
use tracing::Event;
use tracing::Level;
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::prelude::*;

type SharedSet<'a, A> = HashSet<'a, u32, DefaultHashBuilder, DefaultEq, Shared, Cached, A>;

/// Counts `monohash` events at a given level.
struct EventCounter {
    level: Level,
    count: Arc<AtomicUsize>,
}

impl<S: Subscriber> Layer<S> for EventCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() == self.level && metadata.target() == "monohash" {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn count_events(level: Level, f: impl FnOnce()) -> usize {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = EventCounter {
        level,
        count: Arc::clone(&count),
    };
    let subscriber = tracing_subscriber::registry().with(counter);
    tracing::subscriber::with_default(subscriber, f);
    count.load(Ordering::SeqCst)
}

#[test]
fn map_insert_find_erase() {
    let allocator = MonoAllocator::new();
    let mut map: HashMap<'_, i32, &str> = HashMap::new_in(&allocator);

    map.insert((1, "a"));
    map.insert((2, "b"));

    let found = map.find(&1);
    assert_eq!(map.get(found), Some(&(1, "a")));
    assert_eq!(map.erase(&1), 1);
    assert!(map.find(&1).is_end());
    assert_eq!(map.find(&1), map.end());
    assert_eq!(map.len(), 1);
}

#[test]
fn insert_unique_with_duplicate_is_reported_and_kept() {
    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, i32> = HashSet::new_in(&allocator);

    let reports = count_events(Level::ERROR, || {
        set.insert_unique(5);
        set.insert_unique(5);
    });

    assert_eq!(reports, usize::from(cfg!(debug_assertions)));
    assert_eq!(set.len(), 2);

    let (mut position, end) = set.equal_range(&5);
    let mut run = 0;
    while position != end {
        assert_eq!(set.get(position), Some(&5));
        run += 1;
        position = set.advance(position);
    }
    assert_eq!(run, 2);
}

#[test]
fn erase_unique_with_duplicates_is_reported() {
    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, i32> = HashSet::new_in(&allocator);
    set.insert(3);
    set.insert(3);

    let reports = count_events(Level::ERROR, || {
        assert!(set.erase_unique(&3));
    });

    assert_eq!(reports, usize::from(cfg!(debug_assertions)));
    assert_eq!(set.len(), 1);
    assert!(set.contains(&3));
}

#[test]
fn emplace_if_not_existent_twice() {
    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, i32> = HashSet::new_in(&allocator);

    let (first, inserted) = set.emplace_if_not_existent(|| 0);
    assert!(inserted);
    assert_eq!(set.get(first), Some(&0));

    let (second, inserted) = set.emplace_if_not_existent(|| 0);
    assert!(!inserted);
    assert_eq!(first, second);
    assert_eq!(set.len(), 1);
}

#[test]
fn growth_keeps_every_key() {
    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, u32> = HashSet::with_load_factors_in(&allocator, 1.0, 2.0);

    set.insert(0);
    assert_eq!(set.bucket_count(), 97);

    let mut grew_at = None;
    for key in 1..195 {
        let before = set.bucket_count();
        set.insert(key);
        if before != set.bucket_count() {
            grew_at.get_or_insert(key);
        }
    }

    assert_eq!(grew_at, Some(194));
    assert_eq!(set.bucket_count(), 199);
    assert_eq!(set.len(), 195);
    assert!((0..195).all(|key| set.contains(&key)));
}

#[test]
fn extract_change_key_and_reinsert() {
    let allocator = MonoAllocator::new();
    let mut map: HashMap<'_, i32, String> = HashMap::new_in(&allocator);
    for key in 0..5 {
        map.insert((key, format!("value {key}")));
    }

    let mut handle = map.extract(&1);
    assert!(!handle.is_empty());
    *handle.key_mut().unwrap() = 5;

    let position = map.insert_handle_if_not_existent(&mut handle);
    assert!(!position.is_end());
    assert_eq!(map.len(), 5);
    assert!(map.find(&1).is_end());
    assert_eq!(map.get_mapped(&5).map(String::as_str), Some("value 1"));
}

#[test]
fn rekey_loop_without_recycling_keeps_arena_size() {
    let allocator = MonoAllocator::new();
    let mut map: HashMap<'_, u64, &str, DefaultHashBuilder, DefaultEq, NoRecycling> =
        HashMap::new_in(&allocator);
    map.insert((0, "moving"));

    let before = allocator.allocated_bytes();
    for key in 0..100_000 {
        let mut handle = map.extract(&key);
        *handle.key_mut().unwrap() = key + 1;
        map.insert_handle(handle);
    }

    assert_eq!(allocator.allocated_bytes(), before);
    assert_eq!(map.len(), 1);
    assert_eq!(map.get_mapped(&100_000), Some(&"moving"));
}

#[test]
fn extracted_node_is_not_recyclable_while_held() {
    let allocator = MonoAllocator::new();
    let mut map: HashMap<'_, i32, i32> = HashMap::new_in(&allocator);
    map.extend((0..5).map(|key| (key, key)));

    let handle = map.extract(&3);
    assert_eq!(map.recyclables_count(), 0);
    assert_eq!(map.release_handle(handle), Some((3, 3)));
    assert_eq!(map.recyclables_count(), 1);
}

#[test]
fn insert_empty_handle_returns_end() {
    let allocator = MonoAllocator::new();
    let mut map: HashMap<'_, i32, i32> = HashMap::new_in(&allocator);
    map.insert((1, 1));

    let handle = map.extract(&2);
    assert!(handle.is_empty());
    assert!(map.insert_handle(handle).is_end());
    assert_eq!(map.len(), 1);
}

#[test]
fn erase_whole_range() {
    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    set.extend((0..1000).map(|key| key % 300));

    let next = set.erase_range(set.begin(), set.end());
    assert!(next.is_end());
    assert_eq!(set.len(), 0);
    assert_eq!(set.begin(), set.end());
}

#[test]
fn clear_twice() {
    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    set.extend(0..50);

    set.clear();
    assert_eq!(set.len(), 0);
    set.clear();
    assert_eq!(set.len(), 0);
    assert_eq!(set.recyclables_count(), 50);
}

#[test]
fn shared_recycler_collects_dropped_tables_on_heap() {
    let allocator = HeapAllocator;
    let recycler: SetRecycler<'_, u32, HeapAllocator> = SetRecycler::new(&allocator);

    let mut first: SharedSet<'_, HeapAllocator> = HashTable::with_shared_recycler(&recycler);
    first.extend([1, 2]);
    {
        let mut second: SharedSet<'_, HeapAllocator> =
            HashTable::with_shared_recycler(&recycler);
        second.extend([1, 2, 3]);
    }
    assert_eq!(recycler.count(), 3);

    drop(first);
    assert_eq!(recycler.count(), 5);
}

#[test]
fn shared_reset_on_heap_keeps_bucket_array_out() {
    let allocator = HeapAllocator;
    let recycler: SetRecycler<'_, u32, HeapAllocator> = SetRecycler::new(&allocator);
    recycler.reserve(3, ValueReference::Absolute);

    let mut set: SharedSet<'_, HeapAllocator> = HashTable::with_shared_recycler(&recycler);
    set.insert(1);
    assert_eq!(recycler.count(), 2);

    set.reset();
    assert_eq!(recycler.count(), 3);
    assert_eq!(set.bucket_count(), 1);
}

#[test]
fn shared_reset_on_mono_recycles_bucket_array() {
    let allocator = MonoAllocator::new();
    let recycler: SetRecycler<'_, u32> = SetRecycler::new(&allocator);

    let mut set: SharedSet<'_, MonoAllocator> = HashTable::with_shared_recycler(&recycler);
    set.insert(1);
    set.reset();

    assert!(recycler.count() > 4);
    assert!(set.is_empty());
}

#[test]
fn shared_reserve_absolute_and_relative() {
    let allocator = MonoAllocator::new();
    let recycler: SetRecycler<'_, u32> = SetRecycler::new(&allocator);

    recycler.reserve(2, ValueReference::Absolute);
    recycler.reserve(2, ValueReference::Absolute);
    assert_eq!(recycler.count(), 2);

    recycler.reserve(1, ValueReference::Relative);
    assert_eq!(recycler.count(), 3);

    recycler.reset();
    assert_eq!(recycler.count(), 0);
}

#[test]
fn no_recycling_reserve_warns() {
    use monohash::recycling::NoRecycling;

    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, u32, DefaultHashBuilder, DefaultEq, NoRecycling> =
        HashTable::new_in(&allocator);

    let warnings = count_events(Level::WARN, || {
        set.reserve_recyclables(8, ValueReference::Absolute);
    });

    assert_eq!(warnings, usize::from(cfg!(debug_assertions)));
    assert_eq!(set.recyclables_count(), 0);
}

#[test]
fn rehash_is_traced() {
    let allocator = MonoAllocator::new();
    let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    set.insert(1);

    let traces = count_events(Level::TRACE, || set.rehash(1000));

    assert_eq!(traces, 1);
    assert_eq!(set.bucket_count(), 1741);
    assert!(set.contains(&1));
}
