use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use crate::DefaultHashBuilder;
use crate::allocator::Allocator;
use crate::allocator::MonoAllocator;
use crate::hash_table::Cached;
use crate::hash_table::DefaultEq;
use crate::hash_table::Element;
use crate::hash_table::HashCaching;
use crate::hash_table::HashTable;
use crate::hash_table::Iter;
use crate::hash_table::KeyEqual;
use crate::hash_table::Position;
use crate::hash_table::ValueDescriptor;
use crate::recycling::Private;
use crate::recycling::Recycling;
use crate::recycling::SharedRecycler;

/// A [`ValueDescriptor`] whose stored value can be built from a key and a
/// mapped portion, which enables the map-mode operations of [`HashTable`].
pub trait MapDescriptor: ValueDescriptor {
    /// Builds a stored value.
    fn compose(key: Self::Key, mapped: Self::Mapped) -> Self::Stored;
}

/// Map mode over `(K, V)` pairs: `K` is the key, `V` the mapped portion.
pub struct PairDescriptor<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> ValueDescriptor for PairDescriptor<K, V> {
    type Key = K;
    type Mapped = V;
    type Stored = (K, V);

    #[inline(always)]
    fn key(stored: &(K, V)) -> &K {
        &stored.0
    }

    #[inline(always)]
    fn key_mut(stored: &mut (K, V)) -> &mut K {
        &mut stored.0
    }

    #[inline(always)]
    fn mapped(stored: &(K, V)) -> &V {
        &stored.1
    }

    #[inline(always)]
    fn mapped_mut(stored: &mut (K, V)) -> &mut V {
        &mut stored.1
    }
}

impl<K, V> MapDescriptor for PairDescriptor<K, V> {
    #[inline(always)]
    fn compose(key: K, mapped: V) -> (K, V) {
        (key, mapped)
    }
}

/// A hash map over a [`HashTable`] in map mode, storing `(K, V)` pairs.
///
/// Like the table, the map admits multiple entries with equal keys; the
/// `insert_or_assign` and `*_if_not_existent` operations give classic map
/// semantics.
///
/// # Examples
///
/// ```rust
/// use monohash::HashMap;
/// use monohash::MonoAllocator;
///
/// let allocator = MonoAllocator::new();
/// let mut map: HashMap<'_, u32, &str> = HashMap::new_in(&allocator);
///
/// map.insert((1, "a"));
/// map.insert((2, "b"));
/// assert_eq!(map.get_mapped(&1), Some(&"a"));
///
/// assert_eq!(map.erase(&1), 1);
/// assert!(map.find(&1).is_end());
/// assert_eq!(map.len(), 1);
/// ```
pub type HashMap<
    'a,
    K,
    V,
    S = DefaultHashBuilder,
    E = DefaultEq,
    R = Private,
    C = Cached,
    A = MonoAllocator,
> = HashTable<'a, PairDescriptor<K, V>, S, E, R, C, A>;

/// A [`SharedRecycler`] for maps from `K` to `V`.
pub type MapRecycler<'a, K, V, A = MonoAllocator, C = Cached> =
    SharedRecycler<'a, Element<(K, V), C>, A>;

impl<'a, D, S, E, R, C, A> HashTable<'a, D, S, E, R, C, A>
where
    D: MapDescriptor,
    D::Stored: 'a,
    D::Key: Hash,
    S: BuildHasher,
    E: KeyEqual<D::Key>,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    /// Assigns `mapped` to the first entry whose key equals `key`, or inserts
    /// a new entry if there is none.
    ///
    /// Returns the entry's position and whether it was inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashMap;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut map: HashMap<'_, &str, u32> = HashMap::new_in(&allocator);
    ///
    /// assert!(map.insert_or_assign("answer", 41).1);
    /// let (position, inserted) = map.insert_or_assign("answer", 42);
    /// assert!(!inserted);
    /// assert_eq!(map.get(position), Some(&("answer", 42)));
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn insert_or_assign(&mut self, key: D::Key, mapped: D::Mapped) -> (Position, bool) {
        let hash = self.hash_key(&key);
        self.insert_or_assign_with_hash(key, mapped, hash)
    }

    /// Like [`insert_or_assign`](Self::insert_or_assign), with a precomputed
    /// hash code.
    pub fn insert_or_assign_with_hash(
        &mut self,
        key: D::Key,
        mapped: D::Mapped,
        hash: u64,
    ) -> (Position, bool) {
        if let Some((position, stored)) = self.find_entry_mut(&key, hash) {
            *D::mapped_mut(stored) = mapped;
            return (position, false);
        }
        (self.insert_front(D::compose(key, mapped), hash), true)
    }

    /// Inserts an entry unless one with an equal key exists, in which case
    /// `key` and `mapped` are dropped.
    pub fn insert_mapped_if_not_existent(
        &mut self,
        key: D::Key,
        mapped: D::Mapped,
    ) -> (Position, bool) {
        let hash = self.hash_key(&key);
        self.insert_mapped_if_not_existent_with_hash(key, mapped, hash)
    }

    /// Like
    /// [`insert_mapped_if_not_existent`](Self::insert_mapped_if_not_existent),
    /// with a precomputed hash code.
    pub fn insert_mapped_if_not_existent_with_hash(
        &mut self,
        key: D::Key,
        mapped: D::Mapped,
        hash: u64,
    ) -> (Position, bool) {
        let found = self.find_with_hash(&key, hash);
        if !found.is_end() {
            return (found, false);
        }
        (self.insert_front(D::compose(key, mapped), hash), true)
    }

    /// Like [`insert_or_assign`](Self::insert_or_assign), building the mapped
    /// portion with `make`.
    pub fn emplace_or_assign(
        &mut self,
        key: D::Key,
        make: impl FnOnce() -> D::Mapped,
    ) -> (Position, bool) {
        let hash = self.hash_key(&key);
        if let Some((position, stored)) = self.find_entry_mut(&key, hash) {
            *D::mapped_mut(stored) = make();
            return (position, false);
        }
        (self.insert_front(D::compose(key, make()), hash), true)
    }

    /// Inserts an entry for `key` unless one exists. `make` only runs when
    /// the entry is inserted.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashMap;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut map: HashMap<'_, u8, Vec<u8>> = HashMap::new_in(&allocator);
    ///
    /// map.emplace_mapped_if_not_existent(1, || vec![1]);
    /// let (_, inserted) = map.emplace_mapped_if_not_existent(1, || unreachable!());
    /// assert!(!inserted);
    /// ```
    pub fn emplace_mapped_if_not_existent(
        &mut self,
        key: D::Key,
        make: impl FnOnce() -> D::Mapped,
    ) -> (Position, bool) {
        let hash = self.hash_key(&key);
        let found = self.find_with_hash(&key, hash);
        if !found.is_end() {
            return (found, false);
        }
        (self.insert_front(D::compose(key, make()), hash), true)
    }

    /// The mapped portion of the first entry whose key equals `key`.
    pub fn get_mapped(&self, key: &D::Key) -> Option<&D::Mapped> {
        self.get(self.find(key)).map(D::mapped)
    }

    /// The mapped portion of the first entry whose key equals `key`,
    /// mutably.
    pub fn get_mapped_mut(&mut self, key: &D::Key) -> Option<&mut D::Mapped> {
        let hash = self.hash_key(key);
        self.find_entry_mut(key, hash)
            .map(|(_, stored)| D::mapped_mut(stored))
    }
}

impl<'a, K, V, S, E, R, C, A> HashTable<'a, PairDescriptor<K, V>, S, E, R, C, A>
where
    K: 'a,
    V: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    /// An iterator over the keys of all entries.
    pub fn keys(&self) -> Keys<'_, K, V, C> {
        Keys { inner: self.iter() }
    }

    /// An iterator over the mapped values of all entries.
    pub fn values(&self) -> Values<'_, K, V, C> {
        Values { inner: self.iter() }
    }
}

/// An iterator over the keys of a [`HashMap`].
///
/// Created by [`HashTable::keys`].
pub struct Keys<'t, K, V, C: HashCaching = Cached> {
    inner: Iter<'t, (K, V), C>,
}

impl<'t, K, V, C: HashCaching> Iterator for Keys<'t, K, V, C> {
    type Item = &'t K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, C: HashCaching> ExactSizeIterator for Keys<'_, K, V, C> {}

impl<K, V, C: HashCaching> FusedIterator for Keys<'_, K, V, C> {}

/// An iterator over the mapped values of a [`HashMap`].
///
/// Created by [`HashTable::values`].
pub struct Values<'t, K, V, C: HashCaching = Cached> {
    inner: Iter<'t, (K, V), C>,
}

impl<'t, K, V, C: HashCaching> Iterator for Values<'t, K, V, C> {
    type Item = &'t V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, C: HashCaching> ExactSizeIterator for Values<'_, K, V, C> {}

impl<K, V, C: HashCaching> FusedIterator for Values<'_, K, V, C> {}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::allocator::HeapAllocator;
    use crate::hash_table::ValueReference;
    use crate::recycling::Shared;

    #[derive(Clone, Copy)]
    struct TestHasher {
        k0: u64,
        k1: u64,
    }

    impl BuildHasher for TestHasher {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    impl Default for TestHasher {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }
    }

    type TestMap<'a, K, V, R = Private, A = MonoAllocator> =
        HashMap<'a, K, V, TestHasher, DefaultEq, R, Cached, A>;

    #[test]
    fn test_insert_find_erase() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, &str> = HashTable::new_in(&allocator);

        map.insert((1, "a"));
        map.insert((2, "b"));

        let position = map.find(&1);
        assert_eq!(map.get(position).map(|(_, mapped)| *mapped), Some("a"));
        assert_eq!(map.erase(&1), 1);
        assert!(map.find(&1).is_end());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_insert_or_assign() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, String, i32> = HashTable::new_in(&allocator);

        let (first, inserted) = map.insert_or_assign("key".to_string(), 1);
        assert!(inserted);
        let (second, inserted) = map.insert_or_assign("key".to_string(), 2);
        assert!(!inserted);
        assert_eq!(first, second);
        assert_eq!(map.get_mapped(&"key".to_string()), Some(&2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_insert_mapped_if_not_existent() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, String> = HashTable::new_in(&allocator);

        assert!(map.insert_mapped_if_not_existent(1, "one".to_string()).1);
        let (position, inserted) = map.insert_mapped_if_not_existent(1, "uno".to_string());
        assert!(!inserted);
        assert_eq!(map.get(position).map(|(_, v)| v.as_str()), Some("one"));
    }

    #[test]
    fn test_emplace_or_assign() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, Vec<i32>> = HashTable::new_in(&allocator);

        assert!(map.emplace_or_assign(1, || vec![1]).1);
        assert!(!map.emplace_or_assign(1, || vec![1, 1]).1);
        assert_eq!(map.get_mapped(&1), Some(&vec![1, 1]));
    }

    #[test]
    fn test_emplace_mapped_runs_only_on_insert() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, i32> = HashTable::new_in(&allocator);
        let mut calls = 0;

        map.emplace_mapped_if_not_existent(1, || {
            calls += 1;
            10
        });
        map.emplace_mapped_if_not_existent(1, || {
            calls += 1;
            20
        });
        assert_eq!(calls, 1);
        assert_eq!(map.get_mapped(&1), Some(&10));
    }

    #[test]
    fn test_get_mut() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, i32> = HashTable::new_in(&allocator);
        let position = map.insert((7, 70));

        *map.get_mut(position).unwrap() += 1;
        *map.get_mapped_mut(&7).unwrap() += 1;
        assert_eq!(map.get_mapped(&7), Some(&72));
        assert_eq!(map.get_mapped_mut(&8), None);
    }

    #[test]
    fn test_extract_rekey_and_reinsert() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, String> = HashTable::new_in(&allocator);
        for key in 0..5 {
            map.insert((key, key.to_string()));
        }

        let mut handle = map.extract(&1);
        assert_eq!(map.len(), 4);
        assert_eq!(handle.key(), Some(&1));
        *handle.key_mut().unwrap() = 5;

        let position = map.insert_handle_if_not_existent(&mut handle);
        assert!(handle.is_empty());
        assert_eq!(map.len(), 5);
        assert!(map.find(&1).is_end());
        assert_eq!(map.get(position).map(|(key, _)| *key), Some(5));
        assert_eq!(map.get_mapped(&5).map(String::as_str), Some("1"));
    }

    #[test]
    fn test_extract_round_trip() {
        let allocator = HeapAllocator;
        let mut map: TestMap<'_, i32, i32, Private, HeapAllocator> =
            HashTable::new_in(&allocator);
        map.insert((1, 10));
        map.insert((2, 20));

        let handle = map.extract(&2);
        assert_eq!(handle.mapped(), Some(&20));
        map.insert_handle(handle);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get_mapped(&2), Some(&20));
    }

    #[test]
    fn test_keys_and_values() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, i32> = HashTable::new_in(&allocator);
        map.extend((0..10).map(|key| (key, key * key)));

        let mut keys: Vec<i32> = map.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());

        let total: i32 = map.values().sum();
        assert_eq!(total, 285);
        assert_eq!(map.values().len(), 10);
    }

    #[test]
    fn test_iter_mut_touches_mapped_only() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, i32, i32> = HashTable::new_in(&allocator);
        map.extend((0..10).map(|key| (key, 0)));

        for value in map.iter_mut() {
            *value = 5;
        }
        assert!((0..10).all(|key| map.get_mapped(&key) == Some(&5)));
    }

    #[test]
    fn test_shared_map_recycler() {
        let allocator = MonoAllocator::new();
        let recycler: MapRecycler<'_, u32, u32> = SharedRecycler::new(&allocator);
        recycler.reserve(2, ValueReference::Absolute);
        recycler.reserve(2, ValueReference::Absolute);
        assert_eq!(recycler.count(), 2);
        recycler.reserve(1, ValueReference::Relative);
        assert_eq!(recycler.count(), 3);

        let mut map: TestMap<'_, u32, u32, Shared> = HashTable::with_shared_recycler(&recycler);
        map.insert_or_assign(1, 1);
        map.insert_or_assign(2, 2);
        assert_eq!(recycler.count(), 1);

        map.erase(&1);
        assert_eq!(map.recyclables_count(), 2);

        recycler.reset();
        assert_eq!(recycler.count(), 0);
        map.insert_or_assign(3, 3);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_string_keys() {
        let allocator = MonoAllocator::new();
        let mut map: TestMap<'_, String, usize> = HashTable::new_in(&allocator);
        let words = ["alpha", "beta", "gamma", "delta", "alpha", "beta", "alpha"];

        for word in words {
            let (position, inserted) = map.insert_mapped_if_not_existent(word.to_string(), 1);
            if !inserted {
                *map.get_mut(position).unwrap() += 1;
            }
        }

        assert_eq!(map.len(), 4);
        assert_eq!(map.get_mapped(&"alpha".to_string()), Some(&3));
        assert_eq!(map.get_mapped(&"beta".to_string()), Some(&2));
        assert_eq!(map.get_mapped(&"delta".to_string()), Some(&1));
    }
}
