use core::hash::BuildHasher;
use core::hash::Hash;
use core::marker::PhantomData;

use crate::DefaultHashBuilder;
use crate::allocator::Allocator;
use crate::allocator::MonoAllocator;
use crate::hash_table::Cached;
use crate::hash_table::DefaultEq;
use crate::hash_table::Element;
use crate::hash_table::HashCaching;
use crate::hash_table::HashTable;
use crate::hash_table::KeyEqual;
use crate::hash_table::ValueDescriptor;
use crate::recycling::Private;
use crate::recycling::Recycling;
use crate::recycling::SharedRecycler;

/// Set mode: the stored value is its own key.
pub struct IdentDescriptor<T>(PhantomData<fn() -> T>);

impl<T> ValueDescriptor for IdentDescriptor<T> {
    type Key = T;
    type Mapped = T;
    type Stored = T;

    #[inline(always)]
    fn key(stored: &T) -> &T {
        stored
    }

    #[inline(always)]
    fn key_mut(stored: &mut T) -> &mut T {
        stored
    }

    #[inline(always)]
    fn mapped(stored: &T) -> &T {
        stored
    }

    #[inline(always)]
    fn mapped_mut(stored: &mut T) -> &mut T {
        stored
    }
}

/// A hash set over a [`HashTable`] in set mode.
///
/// Like the table, the set admits multiple equal values; use
/// [`insert_if_not_existent`](HashTable::insert_if_not_existent) for classic
/// set semantics.
///
/// # Examples
///
/// ```rust
/// use monohash::HashSet;
/// use monohash::MonoAllocator;
///
/// let allocator = MonoAllocator::new();
/// let mut set: HashSet<'_, i32> = HashSet::new_in(&allocator);
///
/// let (position, inserted) = set.emplace_if_not_existent(|| 0);
/// assert!(inserted);
/// assert_eq!(set.get(position), Some(&0));
///
/// let (again, inserted) = set.emplace_if_not_existent(|| 0);
/// assert!(!inserted);
/// assert_eq!(again, position);
/// assert_eq!(set.len(), 1);
/// ```
pub type HashSet<
    'a,
    T,
    S = DefaultHashBuilder,
    E = DefaultEq,
    R = Private,
    C = Cached,
    A = MonoAllocator,
> = HashTable<'a, IdentDescriptor<T>, S, E, R, C, A>;

/// A [`SharedRecycler`] for sets of `T`.
pub type SetRecycler<'a, T, A = MonoAllocator, C = Cached> = SharedRecycler<'a, Element<T, C>, A>;

impl<'a, T, S, E, R, C, A> HashTable<'a, IdentDescriptor<T>, S, E, R, C, A>
where
    T: Hash + 'a,
    S: BuildHasher,
    E: KeyEqual<T>,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    /// Removes the first value equal to `value` and returns it. The node is
    /// kept for reuse according to the table's recycling policy.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, String> = HashSet::new_in(&allocator);
    /// set.insert("kept".to_string());
    ///
    /// assert_eq!(set.take(&"kept".to_string()), Some("kept".to_string()));
    /// assert_eq!(set.take(&"kept".to_string()), None);
    /// ```
    pub fn take(&mut self, value: &T) -> Option<T> {
        self.remove(value)
    }

    /// Returns `true` if every value of `self` is contained in `other`.
    pub fn is_subset<'b, S2, E2, R2, C2, A2>(
        &self,
        other: &HashTable<'b, IdentDescriptor<T>, S2, E2, R2, C2, A2>,
    ) -> bool
    where
        T: 'b,
        S2: BuildHasher,
        E2: KeyEqual<T>,
        R2: Recycling,
        C2: HashCaching,
        A2: Allocator + 'b,
    {
        self.iter().all(|value| other.contains(value))
    }

    /// Returns `true` if every value of `other` is contained in `self`.
    pub fn is_superset<'b, S2, E2, R2, C2, A2>(
        &self,
        other: &HashTable<'b, IdentDescriptor<T>, S2, E2, R2, C2, A2>,
    ) -> bool
    where
        T: 'b,
        S2: BuildHasher,
        E2: KeyEqual<T>,
        R2: Recycling,
        C2: HashCaching,
        A2: Allocator + 'b,
    {
        other.iter().all(|value| self.contains(value))
    }

    /// Returns `true` if `self` and `other` have no value in common.
    pub fn is_disjoint<'b, S2, E2, R2, C2, A2>(
        &self,
        other: &HashTable<'b, IdentDescriptor<T>, S2, E2, R2, C2, A2>,
    ) -> bool
    where
        T: 'b,
        S2: BuildHasher,
        E2: KeyEqual<T>,
        R2: Recycling,
        C2: HashCaching,
        A2: Allocator + 'b,
    {
        if self.len() <= other.len() {
            self.iter().all(|value| !other.contains(value))
        } else {
            other.iter().all(|value| !self.contains(value))
        }
    }
}
