use core::alloc::Layout;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::mem::size_of;
use core::ptr::NonNull;

#[cfg(feature = "stats")]
use alloc::vec::Vec;

use crate::DefaultHashBuilder;
use crate::allocator::Allocator;
use crate::allocator::MonoAllocator;
use crate::recycling::Node;
use crate::recycling::OwnedRecycler;
use crate::recycling::Private;
use crate::recycling::Recycler;
use crate::recycling::Recycling;
use crate::recycling::ReleaseTarget;
use crate::recycling::Shared;
use crate::recycling::SharedHandle;
use crate::recycling::SharedRecycler;

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        /// Bucket counts a table may take, each roughly twice its predecessor.
        const PRIME_NUMBERS: [usize; 58] = [
            97,
            199,
            409,
            823,
            1741,
            3469,
            6949,
            14033,
            28411,
            57557,
            116731,
            236897,
            480881,
            976369,
            1982627,
            4026031,
            8175383,
            16601593,
            33712729,
            68460391,
            139022417,
            282312799,
            573292817,
            1164186217,
            2364114217,
            4294967291,
            8589934583,
            17179869143,
            34359738337,
            68719476731,
            137438953447,
            274877906899,
            549755813881,
            1099511627689,
            2199023255531,
            4398046511093,
            8796093022151,
            17592186044399,
            35184372088777,
            70368744177643,
            140737488355213,
            281474976710597,
            562949953421231,
            1125899906842597,
            2251799813685119,
            4503599627370449,
            9007199254740881,
            18014398509481951,
            36028797018963913,
            72057594037927931,
            144115188075855859,
            288230376151711717,
            576460752303423433,
            1152921504606846883,
            2305843009213693951,
            4611686018427387847,
            9223372036854775783,
            18446744073709551557,
        ];
    } else {
        /// Bucket counts a table may take, each roughly twice its predecessor.
        const PRIME_NUMBERS: [usize; 26] = [
            97,
            199,
            409,
            823,
            1741,
            3469,
            6949,
            14033,
            28411,
            57557,
            116731,
            236897,
            480881,
            976369,
            1982627,
            4026031,
            8175383,
            16601593,
            33712729,
            68460391,
            139022417,
            282312799,
            573292817,
            1164186217,
            2364114217,
            4294967291,
        ];
    }
}

/// The smallest tabulated prime `>= min`, or the largest one if `min` exceeds
/// them all.
#[inline]
fn bucket_count_for(min: usize) -> usize {
    match PRIME_NUMBERS.iter().find(|&&prime| prime >= min) {
        Some(&prime) => prime,
        None => PRIME_NUMBERS[PRIME_NUMBERS.len() - 1],
    }
}

/// `ceil(count / factor)`, saturating. Avoids `f64::ceil`, which is not
/// available without `std`.
#[inline]
fn ceil_div(count: usize, factor: f32) -> usize {
    let quotient = count as f64 / factor as f64;
    let truncated = quotient as usize;
    if (truncated as f64) < quotient {
        truncated.saturating_add(1)
    } else {
        truncated
    }
}

/// Largest size a table with `bucket_count` buckets may reach before growing.
#[inline]
fn rehash_limit(bucket_count: usize, max_load_factor: f32) -> usize {
    (bucket_count as f64 * max_load_factor as f64) as usize
}

/// Selects whether element nodes store their key's hash code.
///
/// Caching costs one `u64` per element and spares rehashing keys when the
/// bucket array grows, and most key comparisons on lookups.
pub trait HashCaching: 'static {
    /// Whether hash codes are stored at all.
    const CACHED: bool;

    /// What a node stores in place of the hash code.
    type Slot: Copy + Debug + 'static;

    /// Converts a hash code to the stored form.
    fn store(hash: u64) -> Self::Slot;

    /// Recovers the hash code, if it was stored.
    fn load(slot: Self::Slot) -> Option<u64>;
}

/// Nodes store the hash code of their key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cached;

/// Nodes do not store hash codes; they are recomputed when needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncached;

impl HashCaching for Cached {
    const CACHED: bool = true;

    type Slot = u64;

    #[inline(always)]
    fn store(hash: u64) -> u64 {
        hash
    }

    #[inline(always)]
    fn load(slot: u64) -> Option<u64> {
        Some(slot)
    }
}

impl HashCaching for Uncached {
    const CACHED: bool = false;

    type Slot = ();

    #[inline(always)]
    fn store(_hash: u64) {}

    #[inline(always)]
    fn load(_slot: ()) -> Option<u64> {
        None
    }
}

/// Describes how a stored value splits into the key used for hashing and
/// equality, and the mapped portion handed out by mutable accessors.
///
/// In set mode all three are the same type. In map mode the stored value is a
/// pair, see [`PairDescriptor`](crate::hash_map::PairDescriptor).
pub trait ValueDescriptor {
    /// The value kept in each element.
    type Stored;
    /// The portion hashed and compared.
    type Key;
    /// The portion exposed for mutation.
    type Mapped;

    /// The key portion of `stored`.
    fn key(stored: &Self::Stored) -> &Self::Key;

    /// The key portion of `stored`, mutably. Only reachable for values that
    /// are not linked into a table.
    fn key_mut(stored: &mut Self::Stored) -> &mut Self::Key;

    /// The mapped portion of `stored`.
    fn mapped(stored: &Self::Stored) -> &Self::Mapped;

    /// The mapped portion of `stored`, mutably.
    fn mapped_mut(stored: &mut Self::Stored) -> &mut Self::Mapped;
}

/// Key equality used by a table. Must agree with the table's hasher: keys
/// reported equal must hash identically.
pub trait KeyEqual<K: ?Sized> {
    /// Whether `a` and `b` denote the same key.
    fn eq(&self, a: &K, b: &K) -> bool;
}

/// Key equality through [`Eq`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEq;

impl<K: ?Sized + Eq> KeyEqual<K> for DefaultEq {
    #[inline(always)]
    fn eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// How a quantity passed to a reservation is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueReference {
    /// The quantity is a total.
    #[default]
    Absolute,
    /// The quantity is added to what is already there.
    Relative,
}

type Link<T, C> = Option<NonNull<Element<T, C>>>;
type Elem<D, C> = Element<<D as ValueDescriptor>::Stored, C>;
type RecyclerOf<'a, D, R, C, A> = <R as Recycling>::Recycler<'a, Elem<D, C>, A>;

/// A node of a hash table: one stored value, the link to the next node of
/// its bucket, and, with [`Cached`], the hash code of the value's key.
///
/// Nodes are only ever touched by tables and recyclers; the type is public so
/// that [`SharedRecycler`]s can be named.
pub struct Element<T, C: HashCaching = Cached> {
    next: Link<T, C>,
    hash: C::Slot,
    value: MaybeUninit<T>,
}

// SAFETY: Both functions only access the `next` field through raw pointers.
unsafe impl<T, C: HashCaching> Node for Element<T, C> {
    #[inline]
    unsafe fn link(node: NonNull<Self>) -> Option<NonNull<Self>> {
        // SAFETY: Caller guarantees the link was written.
        unsafe { (&raw const (*node.as_ptr()).next).read() }
    }

    #[inline]
    unsafe fn set_link(node: NonNull<Self>, next: Option<NonNull<Self>>) {
        // SAFETY: Caller guarantees `node` is writable.
        unsafe { (&raw mut (*node.as_ptr()).next).write(next) }
    }
}

// All helpers below require `elem` to point at a node that is initialized
// (written by `init`) and whose value has not been taken or dropped.
impl<T, C: HashCaching> Element<T, C> {
    #[inline]
    unsafe fn init(elem: NonNull<Self>, value: T, hash: u64) {
        // SAFETY: Recyclers hand out nodes valid for writes.
        unsafe {
            elem.as_ptr().write(Element {
                next: None,
                hash: C::store(hash),
                value: MaybeUninit::new(value),
            })
        }
    }

    #[inline]
    unsafe fn next(elem: NonNull<Self>) -> Link<T, C> {
        unsafe { (*elem.as_ptr()).next }
    }

    #[inline]
    unsafe fn set_next(elem: NonNull<Self>, next: Link<T, C>) {
        unsafe { (*elem.as_ptr()).next = next }
    }

    #[inline]
    unsafe fn set_hash(elem: NonNull<Self>, hash: u64) {
        unsafe { (*elem.as_ptr()).hash = C::store(hash) }
    }

    #[inline]
    unsafe fn cached_hash(elem: NonNull<Self>) -> Option<u64> {
        unsafe { C::load((*elem.as_ptr()).hash) }
    }

    #[inline]
    unsafe fn value<'t>(elem: NonNull<Self>) -> &'t T {
        unsafe { (*elem.as_ptr()).value.assume_init_ref() }
    }

    #[inline]
    unsafe fn value_mut<'t>(elem: NonNull<Self>) -> &'t mut T {
        unsafe { (*elem.as_ptr()).value.assume_init_mut() }
    }

    #[inline]
    unsafe fn take(elem: NonNull<Self>) -> T {
        unsafe { (*elem.as_ptr()).value.assume_init_read() }
    }

    #[inline]
    unsafe fn drop_value(elem: NonNull<Self>) {
        unsafe { (*elem.as_ptr()).value.assume_init_drop() }
    }
}

/// A position in a [`HashTable`], or its end.
///
/// Positions are plain values: they do not borrow the table, and every
/// operation taking one re-locates the element it denotes. A position whose
/// element was erased is a logic error which is reported by debug assertions
/// and otherwise answered with `None` or the end position.
///
/// Dereferencing through [`HashTable::get`] stays valid across rehashes, while
/// [`HashTable::advance`] requires that no rehash happened since the position
/// was obtained.
///
/// Positions compare equal if they denote the same element, or are both end.
#[derive(Clone, Copy)]
pub struct Position {
    bucket: usize,
    hash: u64,
    element: Option<NonNull<()>>,
}

impl Position {
    #[inline]
    fn new<T, C: HashCaching>(bucket: usize, hash: u64, element: NonNull<Element<T, C>>) -> Self {
        Self {
            bucket,
            hash,
            element: Some(element.cast()),
        }
    }

    #[inline]
    fn end(bucket_count: usize) -> Self {
        Self {
            bucket: bucket_count,
            hash: 0,
            element: None,
        }
    }

    /// Whether this is the end position.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.element.is_none()
    }

    /// The bucket the element was in when the position was obtained.
    #[inline]
    pub fn bucket(&self) -> usize {
        self.bucket
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.element == other.element
    }
}

impl Eq for Position {}

impl Debug for Position {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_end() {
            return f.write_str("Position(end)");
        }
        f.debug_struct("Position")
            .field("bucket", &self.bucket)
            .field("hash", &self.hash)
            .finish()
    }
}

/// A position within a single bucket, or that bucket's end.
///
/// Local positions are invalidated by any rehash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPosition {
    bucket: usize,
    element: Option<NonNull<()>>,
}

impl LocalPosition {
    /// Whether this is the end of its bucket.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.element.is_none()
    }

    /// The bucket this position walks.
    #[inline]
    pub fn bucket(&self) -> usize {
        self.bucket
    }
}

/// An element removed from a table by [`HashTable::extract`], kept with its
/// node so that it can be linked again without allocating.
///
/// The key may be changed through [`key_mut`](ElementHandle::key_mut) before
/// [`HashTable::insert_handle`] links the same node back in. Dropping a
/// non-empty handle drops its value and releases the node: [`Shared`] tables
/// get it back on their shared free list, other tables return it to the
/// allocator. [`HashTable::release_handle`] puts it on the table's own free
/// list instead.
///
/// # Examples
///
/// ```rust
/// use monohash::HashMap;
/// use monohash::MonoAllocator;
///
/// let allocator = MonoAllocator::new();
/// let mut map: HashMap<'_, u32, &str> = HashMap::new_in(&allocator);
/// map.insert((1, "one"));
///
/// let mut handle = map.extract(&1);
/// assert!(map.is_empty());
/// assert_eq!(map.recyclables_count(), 0);
///
/// *handle.key_mut().unwrap() = 10;
/// let position = map.insert_handle(handle);
/// assert_eq!(map.get(position), Some(&(10, "one")));
/// assert_eq!(map.recyclables_count(), 0);
/// ```
pub struct ElementHandle<'a, D, C = Cached, A = MonoAllocator>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    C: HashCaching,
    A: Allocator + 'a,
{
    node: Option<NonNull<Elem<D, C>>>,
    target: Option<ReleaseTarget<'a, Elem<D, C>, A>>,
}

impl<'a, D, C, A> Default for ElementHandle<'a, D, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a, D, C, A> Debug for ElementHandle<'a, D, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a + Debug,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ElementHandle").field(&self.value()).finish()
    }
}

impl<'a, D, C, A> Drop for ElementHandle<'a, D, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn drop(&mut self) {
        if let Some(node) = self.node.take()
            && let Some(target) = self.target
        {
            // SAFETY: The handle owns `node`, which holds an initialized value
            // and is linked nowhere.
            unsafe {
                Element::drop_value(node);
                target.release(node);
            }
        }
    }
}

impl<'a, D, C, A> ElementHandle<'a, D, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    C: HashCaching,
    A: Allocator + 'a,
{
    /// A handle holding nothing.
    pub fn empty() -> Self {
        Self {
            node: None,
            target: None,
        }
    }

    fn new(node: NonNull<Elem<D, C>>, target: ReleaseTarget<'a, Elem<D, C>, A>) -> Self {
        Self {
            node: Some(node),
            target: Some(target),
        }
    }

    /// Whether the handle holds nothing, either because extraction missed or
    /// because the element was inserted again.
    pub fn is_empty(&self) -> bool {
        self.node.is_none()
    }

    /// The held value.
    pub fn value(&self) -> Option<&D::Stored> {
        // SAFETY: A held node carries an initialized value owned by the handle.
        self.node.map(|node| unsafe { Element::value(node) })
    }

    /// The held value, mutably.
    pub fn value_mut(&mut self) -> Option<&mut D::Stored> {
        // SAFETY: As in `value`, and `&mut self` guarantees exclusive access.
        self.node.map(|node| unsafe { Element::value_mut(node) })
    }

    /// The key of the held value.
    pub fn key(&self) -> Option<&D::Key> {
        self.value().map(D::key)
    }

    /// The key of the held value, mutably.
    pub fn key_mut(&mut self) -> Option<&mut D::Key> {
        self.value_mut().map(D::key_mut)
    }

    /// The mapped portion of the held value.
    pub fn mapped(&self) -> Option<&D::Mapped> {
        self.value().map(D::mapped)
    }

    /// The mapped portion of the held value, mutably.
    pub fn mapped_mut(&mut self) -> Option<&mut D::Mapped> {
        self.value_mut().map(D::mapped_mut)
    }

    /// Consumes the handle, returning the held value. The node is released
    /// as on drop.
    pub fn into_value(mut self) -> Option<D::Stored> {
        let node = self.node.take()?;
        let target = self.target?;
        // SAFETY: The handle owns `node`; its value is moved out exactly once
        // before the node is released.
        unsafe {
            let value = Element::take(node);
            target.release(node);
            Some(value)
        }
    }

    /// Gives up the node without touching it.
    fn take_node(&mut self) -> Option<NonNull<Elem<D, C>>> {
        self.node.take()
    }

    /// Whether the node was obtained from `allocator`, so that a table
    /// drawing from it may recycle the node. Zero-sized allocators carry no
    /// state and are interchangeable.
    fn drawn_from(&self, allocator: &A) -> bool {
        size_of::<A>() == 0
            || self
                .target
                .is_some_and(|target| core::ptr::eq(target.allocator(), allocator))
    }
}

/// Bucket size statistics, see [`HashTable::distribution`].
#[cfg(feature = "stats")]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    /// Mean number of elements per bucket, the load factor.
    pub average: f64,
    /// Mean absolute difference between a bucket's size and the average.
    pub deviation: f64,
    /// Size of the emptiest bucket.
    pub min: usize,
    /// Size of the fullest bucket.
    pub max: usize,
}

/// A printable summary of how a table's elements spread over its buckets,
/// see [`HashTable::distribution_report`].
///
/// Lists the figures of [`Distribution`], then how many buckets hold each
/// size, then optionally the size of every single bucket.
#[cfg(feature = "stats")]
#[derive(Debug, Clone)]
pub struct DistributionReport {
    len: usize,
    base_load_factor: f32,
    max_load_factor: f32,
    distribution: Distribution,
    fills: Vec<usize>,
    sizes: Option<Vec<usize>>,
}

#[cfg(feature = "stats")]
impl DistributionReport {
    /// The figures the report is made of.
    pub fn distribution(&self) -> Distribution {
        self.distribution
    }

    /// `fills()[n]` is the number of buckets holding exactly `n` elements.
    pub fn fills(&self) -> &[usize] {
        &self.fills
    }
}

#[cfg(feature = "stats")]
impl core::fmt::Display for DistributionReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let Distribution {
            average,
            deviation,
            min,
            max,
        } = self.distribution;
        let relative = if self.len == 0 { 0.0 } else { deviation / average * 100.0 };

        writeln!(f, "len:          {}", self.len)?;
        writeln!(f, "buckets:      {}", self.fills.iter().sum::<usize>())?;
        writeln!(
            f,
            "load factor:  {average:.2} (base {:.1}, max {:.1})",
            self.base_load_factor, self.max_load_factor
        )?;
        writeln!(f, "deviation:    {deviation:.2} ({relative:.1}%)")?;
        writeln!(f, "smallest:     {min}")?;
        writeln!(f, "largest:      {max}")?;

        writeln!(f, "bucket fills:  size  buckets")?;
        for (size, buckets) in self.fills.iter().enumerate() {
            writeln!(f, "              {size:>4}  {buckets:>7}")?;
        }

        if let Some(sizes) = &self.sizes {
            writeln!(f, "bucket sizes:")?;
            for (bucket, &size) in sizes.iter().enumerate() {
                writeln!(f, "{bucket:>8} ({size:>2}): {:#<size$}", "")?;
            }
        }

        Ok(())
    }
}

/// Prints every bucket of a table with the values it holds, front to back,
/// see [`HashTable::bucket_dump`].
#[cfg(feature = "stats")]
pub struct BucketDump<'t, T, C: HashCaching = Cached> {
    buckets: Option<NonNull<Link<T, C>>>,
    bucket_count: usize,
    _marker: PhantomData<&'t T>,
}

#[cfg(feature = "stats")]
impl<T: Debug, C: HashCaching> core::fmt::Display for BucketDump<'_, T, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let Some(buckets) = self.buckets else {
            return Ok(());
        };

        for bucket in 0..self.bucket_count {
            let values = BucketIter::<'_, T, C> {
                // SAFETY: `bucket` is within the array, which the borrow of
                // the table keeps alive and unchanged.
                current: unsafe { *buckets.as_ptr().add(bucket) },
                _marker: PhantomData,
            };
            write!(f, "{bucket:>8} ({:>2}): ", values.clone().count())?;
            f.debug_list().entries(values).finish()?;
            writeln!(f)?;
        }

        Ok(())
    }
}

/// A hash table of singly linked buckets whose nodes live in an external
/// allocator.
///
/// The table is generic over:
/// - `D`, a [`ValueDescriptor`] selecting set mode
///   ([`HashSet`](crate::HashSet)) or map mode ([`HashMap`](crate::HashMap)),
/// - `S`, the [`BuildHasher`] for keys,
/// - `E`, the [`KeyEqual`] for keys,
/// - `R`, the [`Recycling`] policy for erased nodes,
/// - `C`, the [`HashCaching`] mode of the nodes,
/// - `A`, the [`Allocator`] borrowed for nodes and bucket arrays.
///
/// Multiple elements with equal keys are allowed. They always sit next to
/// each other in their bucket, so [`equal_range`](HashTable::equal_range) can
/// walk them in one go.
///
/// Nothing is allocated until the first insertion, which creates 97 buckets.
/// The table grows to roughly `len() / base_load_factor()` buckets as soon as
/// `len()` exceeds `bucket_count() * max_load_factor()`. Erased nodes are
/// kept for reuse or returned to the allocator according to `R`.
///
/// # Examples
///
/// ```rust
/// use monohash::HashSet;
/// use monohash::MonoAllocator;
///
/// let allocator = MonoAllocator::new();
/// let mut set: HashSet<'_, &str> = HashSet::new_in(&allocator);
///
/// set.insert("apple");
/// set.insert("apple");
/// set.insert("pear");
///
/// assert_eq!(set.len(), 3);
/// assert_eq!(set.bucket_count(), 97);
///
/// let (first, end) = set.equal_range(&"apple");
/// let second = set.advance(first);
/// assert_eq!(set.get(second), Some(&"apple"));
/// assert_eq!(set.advance(second), end);
///
/// assert_eq!(set.erase(&"apple"), 2);
/// assert_eq!(set.recyclables_count(), 2);
/// ```
pub struct HashTable<
    'a,
    D,
    S = DefaultHashBuilder,
    E = DefaultEq,
    R = Private,
    C = Cached,
    A = MonoAllocator,
> where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    recycler: RecyclerOf<'a, D, R, C, A>,
    buckets: Option<NonNull<Link<D::Stored, C>>>,
    bucket_count: usize,
    size: usize,
    size_limit_to_rehash: usize,
    base_load_factor: f32,
    max_load_factor: f32,
    hash_builder: S,
    key_equal: E,
    _marker: PhantomData<D::Stored>,
}

impl<'a, D, S, E, R, C, A> Debug for HashTable<'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a + Debug,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        struct Values<'t, T, C: HashCaching>(Iter<'t, T, C>);

        impl<T: Debug, C: HashCaching> Debug for Values<'_, T, C> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.debug_list().entries(self.0.clone()).finish()
            }
        }

        f.debug_struct("HashTable")
            .field("len", &self.size)
            .field("bucket_count", &self.bucket_count)
            .field("base_load_factor", &self.base_load_factor)
            .field("max_load_factor", &self.max_load_factor)
            .field("values", &Values(self.iter()))
            .finish()
    }
}

impl<'a, D, S, E, R, C, A> Drop for HashTable<'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn drop(&mut self) {
        self.release();
    }
}

impl<'a, D, S, E, R, C, A> HashTable<'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
    RecyclerOf<'a, D, R, C, A>: OwnedRecycler<'a, Elem<D, C>, A>,
{
    /// Creates an empty table drawing from `allocator`, with a base load
    /// factor of `1.0` and a maximum load factor of `2.0`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashMap;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let map: HashMap<'_, u32, String> = HashMap::new_in(&allocator);
    /// assert!(map.is_empty());
    /// assert_eq!(map.bucket_count(), 1);
    /// ```
    pub fn new_in(allocator: &'a A) -> Self
    where
        S: Default,
        E: Default,
    {
        Self::with_hasher_in(allocator, S::default(), E::default())
    }

    /// Creates an empty table with the given load factors.
    ///
    /// Passing `f32::MAX` as `max_load_factor` disables automatic growth after
    /// the first insertion.
    pub fn with_load_factors_in(
        allocator: &'a A,
        base_load_factor: f32,
        max_load_factor: f32,
    ) -> Self
    where
        S: Default,
        E: Default,
    {
        let mut table = Self::new_in(allocator);
        table.base_load_factor = base_load_factor;
        table.max_load_factor = max_load_factor;
        table
    }

    /// Creates an empty table using the given hasher and key equality.
    pub fn with_hasher_in(allocator: &'a A, hash_builder: S, key_equal: E) -> Self {
        let recycler =
            <RecyclerOf<'a, D, R, C, A> as OwnedRecycler<'a, Elem<D, C>, A>>::with_allocator(
                allocator,
            );
        Self::from_parts(recycler, hash_builder, key_equal)
    }
}

impl<'a, D, S, E, C, A> HashTable<'a, D, S, E, Shared, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    C: HashCaching,
    A: Allocator + 'a,
{
    /// Creates an empty table drawing nodes from `recycler`.
    ///
    /// When the table is dropped or [`reset`](HashTable::reset), its nodes go
    /// to `recycler`, and so does its bucket array if the allocator permits
    /// splitting memory.
    pub fn with_shared_recycler(recycler: &'a SharedRecycler<'a, Elem<D, C>, A>) -> Self
    where
        S: Default,
        E: Default,
    {
        Self::with_shared_recycler_and_hasher(recycler, S::default(), E::default())
    }

    /// Creates an empty table drawing nodes from `recycler`, with the given
    /// load factors.
    pub fn with_shared_recycler_and_load_factors(
        recycler: &'a SharedRecycler<'a, Elem<D, C>, A>,
        base_load_factor: f32,
        max_load_factor: f32,
    ) -> Self
    where
        S: Default,
        E: Default,
    {
        let mut table = Self::with_shared_recycler(recycler);
        table.base_load_factor = base_load_factor;
        table.max_load_factor = max_load_factor;
        table
    }

    /// Creates an empty table drawing nodes from `recycler`, using the given
    /// hasher and key equality.
    pub fn with_shared_recycler_and_hasher(
        recycler: &'a SharedRecycler<'a, Elem<D, C>, A>,
        hash_builder: S,
        key_equal: E,
    ) -> Self {
        Self::from_parts(SharedHandle::new(recycler), hash_builder, key_equal)
    }
}

impl<'a, D, S, E, R, C, A> HashTable<'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn from_parts(recycler: RecyclerOf<'a, D, R, C, A>, hash_builder: S, key_equal: E) -> Self {
        Self {
            recycler,
            buckets: None,
            bucket_count: 1,
            size: 0,
            size_limit_to_rehash: 0,
            base_load_factor: 1.0,
            max_load_factor: 2.0,
            hash_builder,
            key_equal,
            _marker: PhantomData,
        }
    }

    /// Returns the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the table holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the number of buckets. Before the first insertion this is `1`,
    /// a virtual empty bucket.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Returns the number of elements in bucket `bucket`.
    pub fn bucket_size(&self, bucket: usize) -> usize {
        debug_assert!(
            bucket < self.bucket_count,
            "bucket {bucket} out of range for {} buckets",
            self.bucket_count
        );
        self.bucket_iter(bucket).count()
    }

    /// The load factor used to size the bucket array when it grows.
    #[inline]
    pub fn base_load_factor(&self) -> f32 {
        self.base_load_factor
    }

    /// The load factor above which the bucket array grows.
    #[inline]
    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Sets the load factor used by future growth.
    pub fn set_base_load_factor(&mut self, base_load_factor: f32) {
        self.base_load_factor = base_load_factor;
    }

    /// Number of nodes available for reuse without touching the allocator.
    ///
    /// For [`Shared`] tables this is the count of the shared recycler; for
    /// [`NoRecycling`](crate::recycling::NoRecycling) tables it is always `0`.
    #[inline]
    pub fn recyclables_count(&self) -> usize {
        self.recycler.count()
    }

    /// Whether erased nodes are kept for reuse, which is the case for every
    /// policy except [`NoRecycling`](crate::recycling::NoRecycling).
    #[inline]
    pub fn is_recycling(&self) -> bool {
        <RecyclerOf<'a, D, R, C, A> as Recycler<'a, Elem<D, C>, A>>::IS_RECYCLING
    }

    /// Whether elements store the hash code of their key.
    #[inline]
    pub fn is_caching_hashes(&self) -> bool {
        C::CACHED
    }

    /// The allocator the table draws from.
    #[inline]
    pub fn allocator(&self) -> &'a A {
        self.recycler.allocator()
    }

    /// The table's hasher.
    #[inline]
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// The table's key equality.
    #[inline]
    pub fn key_equal(&self) -> &E {
        &self.key_equal
    }

    /// An iterator over all stored values, bucket by bucket.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u8> = HashSet::new_in(&allocator);
    /// set.extend([3, 1, 2]);
    ///
    /// let mut values: Vec<u8> = set.iter().copied().collect();
    /// values.sort();
    /// assert_eq!(values, [1, 2, 3]);
    /// ```
    pub fn iter(&self) -> Iter<'_, D::Stored, C> {
        Iter {
            cursor: Cursor::new(self.buckets, self.bucket_count, self.size),
            _marker: PhantomData,
        }
    }

    /// An iterator over the mapped portions of all elements.
    ///
    /// In set mode the mapped portion is the whole value; changing it so that
    /// its hash or equality changes leaves the element unreachable by key.
    pub fn iter_mut(&mut self) -> IterMut<'_, D, C> {
        IterMut {
            cursor: Cursor::new(self.buckets, self.bucket_count, self.size),
            _marker: PhantomData,
        }
    }

    /// An iterator over the values of bucket `bucket`, front to back.
    pub fn bucket_iter(&self, bucket: usize) -> BucketIter<'_, D::Stored, C> {
        BucketIter {
            current: self.head(bucket),
            _marker: PhantomData,
        }
    }

    /// Removes all elements, yielding them by value. Their nodes are
    /// recycled. Elements not consumed are removed when the iterator is
    /// dropped.
    pub fn drain(&mut self) -> Drain<'_, 'a, D, S, E, R, C, A> {
        Drain {
            table: self,
            bucket: 0,
        }
    }

    /// Removes all elements, recycling their nodes. The bucket array is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    /// set.extend(0..10);
    ///
    /// set.clear();
    /// assert!(set.is_empty());
    /// assert_eq!(set.bucket_count(), 97);
    /// assert_eq!(set.recyclables_count(), 10);
    /// ```
    pub fn clear(&mut self) {
        let Some(buckets) = self.buckets else {
            return;
        };
        if self.size == 0 {
            return;
        }

        for index in 0..self.bucket_count {
            // SAFETY: `index` is within the materialized array, and every link
            // refers to a live element of this table.
            unsafe {
                let mut cursor = buckets.as_ptr().add(index).replace(None);
                while let Some(elem) = cursor {
                    cursor = Element::next(elem);
                    self.size -= 1;
                    Element::drop_value(elem);
                    self.recycler.recycle(elem);
                }
            }
        }

        debug_assert_eq!(self.size, 0);
    }

    /// Removes all elements and returns the table to its freshly constructed
    /// state, without an allocation.
    ///
    /// Nodes and the bucket array go back to the allocator, or to the shared
    /// recycler for [`Shared`] tables. A [`Private`] table also gives up its
    /// recyclables.
    pub fn reset(&mut self) {
        self.release();
        self.recycler.reset();
    }

    fn release(&mut self) {
        if let Some(buckets) = self.buckets.take() {
            for index in 0..self.bucket_count {
                // SAFETY: `index` is within the array, and every link refers to a
                // live element of this table.
                unsafe {
                    let mut cursor = *buckets.as_ptr().add(index);
                    while let Some(elem) = cursor {
                        cursor = Element::next(elem);
                        Element::drop_value(elem);
                        self.recycler.dispose(elem);
                    }
                }
            }

            let layout = Layout::array::<Link<D::Stored, C>>(self.bucket_count)
                .expect("allocation size overflow");
            // SAFETY: The array was allocated from the recycler's allocator with
            // this layout and is no longer referenced.
            unsafe { self.recycler.dispose_chunk(buckets.cast(), layout) };
        }

        self.bucket_count = 1;
        self.size = 0;
        self.size_limit_to_rehash = 0;
    }

    /// Reports how evenly elements are spread over the buckets.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    /// set.extend(0..97);
    ///
    /// let distribution = set.distribution();
    /// assert_eq!(distribution.average, 1.0);
    /// assert!(distribution.min <= 1 && distribution.max >= 1);
    /// ```
    #[cfg(feature = "stats")]
    pub fn distribution(&self) -> Distribution {
        let average = self.size as f64 / self.bucket_count as f64;
        let mut deviation = 0.0;
        let mut min = usize::MAX;
        let mut max = 0;
        let mut total = 0;

        for bucket in 0..self.bucket_count {
            let size = self.bucket_iter(bucket).count();
            total += size;
            min = min.min(size);
            max = max.max(size);

            let diff = size as f64 - average;
            deviation += if diff > 0.0 { diff } else { -diff };
        }

        debug_assert_eq!(total, self.size, "bucket sizes do not add up to len");

        Distribution {
            average,
            deviation: deviation / self.bucket_count as f64,
            min,
            max,
        }
    }

    /// Summarizes [`distribution`](Self::distribution) together with a
    /// histogram of bucket sizes, ready to be printed. With `per_bucket`,
    /// the size of every bucket is listed as well.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    /// set.extend(0..150);
    ///
    /// let report = set.distribution_report(false);
    /// assert_eq!(report.fills().iter().sum::<usize>(), set.bucket_count());
    /// println!("{report}");
    /// ```
    #[cfg(feature = "stats")]
    pub fn distribution_report(&self, per_bucket: bool) -> DistributionReport {
        let distribution = self.distribution();
        let sizes: Vec<usize> = (0..self.bucket_count)
            .map(|bucket| self.bucket_iter(bucket).count())
            .collect();

        let mut fills = alloc::vec![0; distribution.max + 1];
        for &size in &sizes {
            fills[size] += 1;
        }

        DistributionReport {
            len: self.size,
            base_load_factor: self.base_load_factor,
            max_load_factor: self.max_load_factor,
            distribution,
            fills,
            sizes: per_bucket.then_some(sizes),
        }
    }

    /// Lists the values of every bucket, for inspecting how a hasher places
    /// keys.
    #[cfg(feature = "stats")]
    pub fn bucket_dump(&self) -> BucketDump<'_, D::Stored, C> {
        BucketDump {
            buckets: self.buckets,
            bucket_count: self.bucket_count,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.bucket_count as u64) as usize
    }

    #[inline]
    fn head(&self, index: usize) -> Link<D::Stored, C> {
        match self.buckets {
            // SAFETY: `index` is bounds checked against the materialized array.
            Some(buckets) if index < self.bucket_count => unsafe { *buckets.as_ptr().add(index) },
            _ => None,
        }
    }

    /// # Safety
    /// The bucket array must be materialized and `index < bucket_count`.
    #[inline]
    unsafe fn bucket_slot(&self, index: usize) -> *mut Link<D::Stored, C> {
        debug_assert!(self.buckets.is_some() && index < self.bucket_count);
        // SAFETY: Caller guarantees the array exists and `index` is in bounds.
        unsafe { self.buckets.unwrap_unchecked().as_ptr().add(index) }
    }

    /// Finds `target` in bucket `index`, returning the link that points at it.
    fn locate_in(
        &self,
        index: usize,
        target: NonNull<()>,
    ) -> Option<(*mut Link<D::Stored, C>, NonNull<Elem<D, C>>)> {
        let buckets = self.buckets?;
        if index >= self.bucket_count {
            return None;
        }

        // SAFETY: `index` is in bounds and links refer to live elements.
        unsafe {
            let mut slot = buckets.as_ptr().add(index);
            while let Some(elem) = *slot {
                if elem.cast::<()>() == target {
                    return Some((slot, elem));
                }
                slot = &raw mut (*elem.as_ptr()).next;
            }
        }

        None
    }

    /// Takes the value out of an unlinked element and recycles its node.
    ///
    /// # Safety
    /// `elem` must hold an initialized value, be linked nowhere and come from
    /// this table's allocator.
    unsafe fn detach(&mut self, elem: NonNull<Elem<D, C>>) -> D::Stored {
        // SAFETY: Caller guarantees the value is initialized and the node is
        // ours.
        unsafe {
            let value = Element::take(elem);
            self.recycler.recycle(elem);
            value
        }
    }

    /// Drops the value of an unlinked element and recycles its node.
    ///
    /// # Safety
    /// Same as [`detach`](Self::detach).
    unsafe fn destroy(&mut self, elem: NonNull<Elem<D, C>>) {
        // SAFETY: Forwarded caller guarantees.
        unsafe {
            Element::drop_value(elem);
            self.recycler.recycle(elem);
        }
    }
}

impl<'a, D, S, E, R, C, A> HashTable<'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    D::Key: Hash,
    S: BuildHasher,
    E: KeyEqual<D::Key>,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    /// Sets the load factor above which the bucket array grows.
    ///
    /// If the table is already above the new limit, it is rehashed right
    /// away.
    pub fn set_max_load_factor(&mut self, max_load_factor: f32) {
        self.max_load_factor = max_load_factor;
        if self.buckets.is_none() {
            return;
        }

        self.size_limit_to_rehash = rehash_limit(self.bucket_count, max_load_factor);
        if self.size > self.size_limit_to_rehash {
            let target = ceil_div(self.size, self.base_load_factor)
                .max(ceil_div(self.size, max_load_factor));
            self.rehash_to(target);
        }
    }

    /// Rebuilds the bucket array with at least `min_bucket_count` buckets,
    /// rounded up to the next tabulated prime. Passing `0` picks the count
    /// the base load factor calls for.
    ///
    /// Shrinking is allowed. A table shrunk below its maximum load factor
    /// grows again on the next insertion.
    ///
    /// Elements keep their nodes; only links are rewritten. The replaced
    /// bucket array is handed to the recycler.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    /// set.extend(0..10);
    ///
    /// set.rehash(300);
    /// assert_eq!(set.bucket_count(), 409);
    /// assert!((0..10).all(|value| set.contains(&value)));
    ///
    /// set.rehash(0);
    /// assert_eq!(set.bucket_count(), 97);
    /// ```
    pub fn rehash(&mut self, min_bucket_count: usize) {
        let min = if min_bucket_count == 0 {
            ceil_div(self.size, self.base_load_factor)
        } else {
            min_bucket_count
        };
        self.rehash_to(min);
    }

    /// Grows the bucket array so that the expected number of elements fits
    /// without further rehashing. Never shrinks.
    pub fn reserve(&mut self, qty: usize, reference: ValueReference) {
        let expected = match reference {
            ValueReference::Absolute => qty,
            ValueReference::Relative => self.size.saturating_add(qty),
        };

        let min = ceil_div(expected, self.base_load_factor);
        if min > self.bucket_count {
            self.rehash_to(min);
        }
    }

    /// Reserves buckets like [`reserve`](Self::reserve), then fills the
    /// recycler so that inserting up to the expected number of elements
    /// needs no node allocation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    /// use monohash::ValueReference;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    /// set.insert(1);
    ///
    /// set.reserve_recyclables(10, ValueReference::Absolute);
    /// assert_eq!(set.recyclables_count(), 9);
    ///
    /// set.reserve_recyclables(10, ValueReference::Relative);
    /// assert_eq!(set.recyclables_count(), 10);
    /// ```
    pub fn reserve_recyclables(&mut self, qty: usize, reference: ValueReference) {
        self.reserve(qty, reference);

        let wanted = match reference {
            ValueReference::Absolute => qty.saturating_sub(self.size),
            ValueReference::Relative => qty,
        };
        let missing = wanted.saturating_sub(self.recycler.count());
        if missing > 0 {
            self.recycler.reserve(missing);
        }
    }

    /// The bucket `key` hashes to under the current bucket count.
    pub fn bucket_index(&self, key: &D::Key) -> usize {
        self.bucket_of(self.hash_key(key))
    }

    /// Inserts `value`, allowing duplicates.
    ///
    /// An element with a key equal to existing ones is linked right in front
    /// of them.
    pub fn insert(&mut self, value: D::Stored) -> Position {
        let hash = self.hash_key(D::key(&value));
        self.insert_with_hash(value, hash)
    }

    /// Like [`insert`](Self::insert), with a precomputed hash code. `hash`
    /// must be what the table's hasher yields for the key.
    pub fn insert_with_hash(&mut self, value: D::Stored, hash: u64) -> Position {
        let elem = self.new_element(value, hash);
        self.increase_size();
        // SAFETY: `increase_size` materialized the array, and `elem` is
        // initialized and unlinked.
        let index = unsafe { self.link_element(elem, hash) };
        Position::new(index, hash, elem)
    }

    /// Inserts `value`, which the caller promises has no equal key in the
    /// table.
    ///
    /// The promise is not checked in release builds. Debug builds report a
    /// violation through `tracing` and insert the duplicate anyway.
    pub fn insert_unique(&mut self, value: D::Stored) -> Position {
        let hash = self.hash_key(D::key(&value));
        self.insert_unique_with_hash(value, hash)
    }

    /// Like [`insert_unique`](Self::insert_unique), with a precomputed hash
    /// code.
    pub fn insert_unique_with_hash(&mut self, value: D::Stored, hash: u64) -> Position {
        let position = self.insert_front(value, hash);
        #[cfg(debug_assertions)]
        self.report_duplicates(position, "insert_unique");
        position
    }

    /// Inserts the value built by `make`, allowing duplicates.
    pub fn emplace(&mut self, make: impl FnOnce() -> D::Stored) -> Position {
        self.insert(make())
    }

    /// Inserts the value built by `make`, with the promise of
    /// [`insert_unique`](Self::insert_unique).
    pub fn emplace_unique(&mut self, make: impl FnOnce() -> D::Stored) -> Position {
        let value = make();
        let hash = self.hash_key(D::key(&value));
        let position = self.insert_front(value, hash);
        #[cfg(debug_assertions)]
        self.report_duplicates(position, "emplace_unique");
        position
    }

    /// Inserts `value` unless an element with an equal key exists.
    ///
    /// Returns the position of the new or existing element and whether
    /// `value` was inserted. If not, `value` is dropped.
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
    /// let (first, inserted) = set.insert_if_not_existent(0);
    /// assert!(inserted);
    /// let (second, inserted) = set.insert_if_not_existent(0);
    /// assert!(!inserted);
    /// assert_eq!(first, second);
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn insert_if_not_existent(&mut self, value: D::Stored) -> (Position, bool) {
        let hash = self.hash_key(D::key(&value));
        self.insert_if_not_existent_with_hash(value, hash)
    }

    /// Like [`insert_if_not_existent`](Self::insert_if_not_existent), with a
    /// precomputed hash code.
    pub fn insert_if_not_existent_with_hash(
        &mut self,
        value: D::Stored,
        hash: u64,
    ) -> (Position, bool) {
        let found = self.find_with_hash(D::key(&value), hash);
        if !found.is_end() {
            return (found, false);
        }
        (self.insert_front(value, hash), true)
    }

    /// Inserts the value built by `make` unless an element with an equal key
    /// exists. `make` always runs, since the key is part of its result.
    pub fn emplace_if_not_existent(
        &mut self,
        make: impl FnOnce() -> D::Stored,
    ) -> (Position, bool) {
        self.insert_if_not_existent(make())
    }

    /// Links the element held by `handle` back in, allowing duplicates. The
    /// handle's node is reused and its cached hash refreshed.
    ///
    /// Returns the end position if the handle is empty.
    pub fn insert_handle(&mut self, mut handle: ElementHandle<'a, D, C, A>) -> Position {
        if !handle.drawn_from(self.allocator()) {
            return match handle.into_value() {
                Some(value) => self.insert(value),
                None => self.end(),
            };
        }

        let Some(elem) = handle.take_node() else {
            return self.end();
        };
        // SAFETY: The handle owned `elem`, an initialized node linked nowhere
        // and obtained from our allocator.
        unsafe {
            let hash = self.hash_key(D::key(Element::value(elem)));
            Element::set_hash(elem, hash);
            self.increase_size();
            let index = self.link_element(elem, hash);
            Position::new(index, hash, elem)
        }
    }

    /// Links the element held by `handle` back in unless an element with an
    /// equal key exists.
    ///
    /// On insertion the handle is emptied and the new position returned. If
    /// an equal key exists, the handle keeps its element and the position of
    /// the existing one is returned. Returns the end position if the handle
    /// is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashMap;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut map: HashMap<'_, u32, &str> = HashMap::new_in(&allocator);
    /// map.insert((1, "one"));
    /// map.insert((2, "two"));
    ///
    /// let mut handle = map.extract(&1);
    /// *handle.key_mut().unwrap() = 2;
    /// let position = map.insert_handle_if_not_existent(&mut handle);
    /// assert!(!handle.is_empty());
    /// assert_eq!(map.get(position), Some(&(2, "two")));
    ///
    /// *handle.key_mut().unwrap() = 3;
    /// let position = map.insert_handle_if_not_existent(&mut handle);
    /// assert!(handle.is_empty());
    /// assert_eq!(map.get(position), Some(&(3, "one")));
    /// ```
    pub fn insert_handle_if_not_existent(
        &mut self,
        handle: &mut ElementHandle<'a, D, C, A>,
    ) -> Position {
        let Some(elem) = handle.node else {
            return self.end();
        };

        // SAFETY: The handle owns `elem`, which holds an initialized value.
        let key = unsafe { D::key(Element::value(elem)) };
        let hash = self.hash_key(key);
        let found = self.find_with_hash(key, hash);
        if !found.is_end() {
            return found;
        }

        if !handle.drawn_from(self.allocator()) {
            return match core::mem::take(handle).into_value() {
                Some(value) => self.insert_front(value, hash),
                None => self.end(),
            };
        }

        handle.take_node();
        // SAFETY: As above; the handle gave up `elem`, which is linked nowhere
        // and obtained from our allocator.
        unsafe {
            Element::set_hash(elem, hash);
            self.link_front(elem, hash)
        }
    }

    /// Takes the value out of `handle` and puts its node on this table's
    /// free list.
    ///
    /// Dropping a handle of a [`Private`] table returns its node to the
    /// allocator, which a [`MonoAllocator`] cannot reuse. Releasing it here
    /// keeps it for the next insertion.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    /// set.insert(4);
    ///
    /// let handle = set.extract(&4);
    /// assert_eq!(set.release_handle(handle), Some(4));
    /// assert_eq!(set.recyclables_count(), 1);
    /// ```
    pub fn release_handle(&mut self, mut handle: ElementHandle<'a, D, C, A>) -> Option<D::Stored> {
        if !handle.drawn_from(self.allocator()) {
            return handle.into_value();
        }

        let elem = handle.take_node()?;
        // SAFETY: The handle owned `elem`, an initialized node linked nowhere
        // and obtained from our allocator.
        Some(unsafe { self.detach(elem) })
    }

    /// The position of the first element whose key equals `key`, or the end
    /// position.
    pub fn find(&self, key: &D::Key) -> Position {
        self.find_with_hash(key, self.hash_key(key))
    }

    /// Like [`find`](Self::find), with a precomputed hash code.
    pub fn find_with_hash(&self, key: &D::Key, hash: u64) -> Position {
        let index = self.bucket_of(hash);
        match self.find_slot(index, key, hash) {
            Some((_, elem)) => Position::new(index, hash, elem),
            None => self.end(),
        }
    }

    /// Whether an element with a key equal to `key` exists.
    pub fn contains(&self, key: &D::Key) -> bool {
        !self.find(key).is_end()
    }

    /// The run of elements whose key equals `key`, as a half-open pair of
    /// positions. Both are the end position if there is none.
    pub fn equal_range(&self, key: &D::Key) -> (Position, Position) {
        let hash = self.hash_key(key);
        let index = self.bucket_of(hash);
        let Some((_, first)) = self.find_slot(index, key, hash) else {
            return (self.end(), self.end());
        };

        // SAFETY: `first` and its successors are live elements of bucket
        // `index`.
        unsafe {
            let mut last = first;
            while let Some(next) = Element::next(last)
                && self.matches(next, key, hash)
            {
                last = next;
            }
            (Position::new(index, hash, first), self.position_after(index, last))
        }
    }

    /// Unlinks the first element whose key equals `key` and hands it over in
    /// a handle, node included. The handle is empty if there is none.
    pub fn extract(&mut self, key: &D::Key) -> ElementHandle<'a, D, C, A> {
        self.extract_with_hash(key, self.hash_key(key))
    }

    /// Like [`extract`](Self::extract), with a precomputed hash code.
    pub fn extract_with_hash(&mut self, key: &D::Key, hash: u64) -> ElementHandle<'a, D, C, A> {
        let index = self.bucket_of(hash);
        let Some((slot, elem)) = self.find_slot(index, key, hash) else {
            return ElementHandle::empty();
        };

        // SAFETY: `slot` links to `elem`, a live element we now unlink.
        unsafe { *slot = Element::next(elem) };
        self.size -= 1;
        ElementHandle::new(elem, self.recycler.release_target())
    }

    /// Unlinks the element at `position` and hands it over in a handle.
    pub fn extract_at(&mut self, position: Position) -> ElementHandle<'a, D, C, A> {
        let located = self.locate(position);
        debug_assert!(
            located.is_some(),
            "extracting through a position that refers to no element"
        );
        let Some((slot, elem)) = located else {
            return ElementHandle::empty();
        };

        // SAFETY: `slot` links to `elem`, a live element we now unlink.
        unsafe { *slot = Element::next(elem) };
        self.size -= 1;
        ElementHandle::new(elem, self.recycler.release_target())
    }

    /// Removes the first element whose key equals `key` and returns its
    /// value. The node is recycled.
    pub(crate) fn remove(&mut self, key: &D::Key) -> Option<D::Stored> {
        let hash = self.hash_key(key);
        let index = self.bucket_of(hash);
        let (slot, elem) = self.find_slot(index, key, hash)?;

        // SAFETY: `slot` links to `elem`, a live element we now unlink.
        unsafe {
            *slot = Element::next(elem);
            self.size -= 1;
            Some(self.detach(elem))
        }
    }

    /// Removes every element whose key equals `key`, returning how many
    /// were removed.
    pub fn erase(&mut self, key: &D::Key) -> usize {
        self.erase_with_hash(key, self.hash_key(key))
    }

    /// Like [`erase`](Self::erase), with a precomputed hash code.
    pub fn erase_with_hash(&mut self, key: &D::Key, hash: u64) -> usize {
        let index = self.bucket_of(hash);
        let Some((slot, _)) = self.find_slot(index, key, hash) else {
            return 0;
        };

        let mut erased = 0;
        // SAFETY: Equal elements are contiguous, so unlinking from `slot` until
        // the first mismatch removes exactly the equal run.
        unsafe {
            while let Some(elem) = *slot {
                if !self.matches(elem, key, hash) {
                    break;
                }
                *slot = Element::next(elem);
                self.size -= 1;
                erased += 1;
                self.destroy(elem);
            }
        }

        erased
    }

    /// Removes the single element whose key equals `key`. Returns whether
    /// one was found.
    ///
    /// The caller promises at most one such element exists. Debug builds
    /// report a violation through `tracing`; only the first match is removed
    /// either way.
    pub fn erase_unique(&mut self, key: &D::Key) -> bool {
        self.erase_unique_with_hash(key, self.hash_key(key))
    }

    /// Like [`erase_unique`](Self::erase_unique), with a precomputed hash
    /// code.
    pub fn erase_unique_with_hash(&mut self, key: &D::Key, hash: u64) -> bool {
        let index = self.bucket_of(hash);
        let Some((slot, elem)) = self.find_slot(index, key, hash) else {
            return false;
        };

        // SAFETY: `slot` links to `elem`, a live element we now unlink.
        unsafe {
            let next = Element::next(elem);
            #[cfg(debug_assertions)]
            if let Some(next) = next
                && self.matches(next, key, hash)
            {
                tracing::error!(
                    target: "monohash",
                    operation = "erase_unique",
                    "more than one element matches the key"
                );
            }

            *slot = next;
            self.size -= 1;
            self.destroy(elem);
        }

        true
    }

    /// Removes the element at `position`, returning the position of the
    /// element after it.
    pub fn erase_at(&mut self, position: Position) -> Position {
        let located = self.locate(position);
        debug_assert!(
            located.is_some(),
            "erasing through a position that refers to no element"
        );
        let Some((slot, elem)) = located else {
            return self.end();
        };

        let index = self.bucket_of(position.hash);
        // SAFETY: `slot` links to `elem`, a live element we now unlink; the
        // successor is computed before the value is dropped.
        unsafe {
            *slot = Element::next(elem);
            let next = match *slot {
                Some(next) => Position::new(index, self.element_hash(next), next),
                None => self.first_from(index + 1),
            };
            self.size -= 1;
            self.destroy(elem);
            next
        }
    }

    /// Removes the elements from `start` up to, not including, `end`.
    /// Returns the position following the last removed element.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashSet;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
    /// set.extend(0..500);
    ///
    /// let end = set.erase_range(set.begin(), set.end());
    /// assert!(end.is_end());
    /// assert!(set.is_empty());
    /// assert_eq!(set.begin(), set.end());
    /// ```
    pub fn erase_range(&mut self, start: Position, end: Position) -> Position {
        let mut position = start;
        while position != end && !position.is_end() {
            position = self.erase_at(position);
        }
        position
    }

    /// The position of the first element, or the end position.
    pub fn begin(&self) -> Position {
        self.first_from(0)
    }

    /// The end position.
    #[inline]
    pub fn end(&self) -> Position {
        Position::end(self.bucket_count)
    }

    /// The position following `position`: the next element of its bucket,
    /// or the first element of the next non-empty bucket.
    ///
    /// `position` must have been obtained after the last rehash.
    pub fn advance(&self, position: Position) -> Position {
        debug_assert!(!position.is_end(), "advancing the end position");
        let located = position
            .element
            .and_then(|target| self.locate_in(position.bucket, target));
        debug_assert!(
            position.is_end() || located.is_some(),
            "advancing a position that is stale or was invalidated by a rehash"
        );

        match located {
            // SAFETY: `elem` is a live element of bucket `position.bucket`.
            Some((_, elem)) => unsafe { self.position_after(position.bucket, elem) },
            None => self.end(),
        }
    }

    /// The value at `position`, or `None` for the end position.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use monohash::HashMap;
    /// use monohash::MonoAllocator;
    ///
    /// let allocator = MonoAllocator::new();
    /// let mut map: HashMap<'_, u32, &str> = HashMap::new_in(&allocator);
    /// let position = map.insert((7, "seven"));
    ///
    /// // Positions survive rehashing for dereferencing.
    /// map.rehash(1000);
    /// assert_eq!(map.get(position), Some(&(7, "seven")));
    /// ```
    pub fn get(&self, position: Position) -> Option<&D::Stored> {
        let (_, elem) = self.locate(position)?;
        // SAFETY: `elem` is a live element of this table.
        Some(unsafe { Element::value(elem) })
    }

    /// The mapped portion of the value at `position`, mutably.
    pub fn get_mut(&mut self, position: Position) -> Option<&mut D::Mapped> {
        let (_, elem) = self.locate(position)?;
        // SAFETY: `elem` is a live element of this table, and `&mut self`
        // guarantees exclusive access.
        Some(D::mapped_mut(unsafe { Element::value_mut(elem) }))
    }

    /// The key of the value at `position`.
    pub fn key_at(&self, position: Position) -> Option<&D::Key> {
        self.get(position).map(D::key)
    }

    /// The first position of bucket `bucket`.
    pub fn bucket_begin(&self, bucket: usize) -> LocalPosition {
        debug_assert!(
            bucket < self.bucket_count,
            "bucket {bucket} out of range for {} buckets",
            self.bucket_count
        );
        LocalPosition {
            bucket,
            element: self.head(bucket).map(NonNull::cast),
        }
    }

    /// The end position of bucket `bucket`.
    pub fn bucket_end(&self, bucket: usize) -> LocalPosition {
        LocalPosition {
            bucket,
            element: None,
        }
    }

    /// The value at a local position.
    pub fn get_local(&self, position: LocalPosition) -> Option<&D::Stored> {
        let (_, elem) = self.locate_in(position.bucket, position.element?)?;
        // SAFETY: `elem` is a live element of this table.
        Some(unsafe { Element::value(elem) })
    }

    /// The mapped portion of the value at a local position, mutably.
    pub fn get_local_mut(&mut self, position: LocalPosition) -> Option<&mut D::Mapped> {
        let (_, elem) = self.locate_in(position.bucket, position.element?)?;
        // SAFETY: `elem` is a live element of this table, and `&mut self`
        // guarantees exclusive access.
        Some(D::mapped_mut(unsafe { Element::value_mut(elem) }))
    }

    /// The local position following `position` in its bucket.
    pub fn advance_local(&self, position: LocalPosition) -> LocalPosition {
        let located = position
            .element
            .and_then(|target| self.locate_in(position.bucket, target));
        debug_assert!(located.is_some(), "advancing an invalid local position");

        let element = match located {
            // SAFETY: `elem` is a live element of this table.
            Some((_, elem)) => unsafe { Element::next(elem) },
            None => None,
        };
        LocalPosition {
            bucket: position.bucket,
            element: element.map(NonNull::cast),
        }
    }

    /// Removes the element at a local position, returning the local position
    /// after it.
    pub fn erase_local(&mut self, position: LocalPosition) -> LocalPosition {
        let located = position
            .element
            .and_then(|target| self.locate_in(position.bucket, target));
        debug_assert!(located.is_some(), "erasing through an invalid local position");
        let Some((slot, elem)) = located else {
            return self.bucket_end(position.bucket);
        };

        // SAFETY: `slot` links to `elem`, a live element we now unlink.
        unsafe {
            let next = Element::next(elem);
            *slot = next;
            self.size -= 1;
            self.destroy(elem);
            LocalPosition {
                bucket: position.bucket,
                element: next.map(NonNull::cast),
            }
        }
    }

    /// Removes the elements of one bucket from `start` up to, not including,
    /// `end`.
    pub fn erase_local_range(&mut self, start: LocalPosition, end: LocalPosition) -> LocalPosition {
        debug_assert_eq!(start.bucket, end.bucket, "local positions of different buckets");
        let mut position = start;
        while position != end && !position.is_end() {
            position = self.erase_local(position);
        }
        position
    }

    pub(crate) fn hash_key(&self, key: &D::Key) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Links a new element at the front of its bucket, without looking for
    /// equal keys.
    pub(crate) fn insert_front(&mut self, value: D::Stored, hash: u64) -> Position {
        let elem = self.new_element(value, hash);
        // SAFETY: `elem` is initialized and unlinked.
        unsafe { self.link_front(elem, hash) }
    }

    /// Counts `elem` in and links it at the front of its bucket.
    ///
    /// # Safety
    /// `elem` must be initialized, linked nowhere and store `hash` if hashes
    /// are cached.
    unsafe fn link_front(&mut self, elem: NonNull<Elem<D, C>>, hash: u64) -> Position {
        self.increase_size();
        let index = self.bucket_of(hash);
        // SAFETY: `increase_size` materialized the array; caller guarantees
        // `elem` is unlinked.
        unsafe {
            let slot = self.bucket_slot(index);
            Element::set_next(elem, *slot);
            *slot = Some(elem);
        }
        Position::new(index, hash, elem)
    }

    /// The position and value of the first element whose key equals `key`.
    pub(crate) fn find_entry_mut(
        &mut self,
        key: &D::Key,
        hash: u64,
    ) -> Option<(Position, &mut D::Stored)> {
        let index = self.bucket_of(hash);
        let (_, elem) = self.find_slot(index, key, hash)?;
        // SAFETY: `elem` is a live element, and `&mut self` guarantees
        // exclusive access.
        Some((Position::new(index, hash, elem), unsafe { Element::value_mut(elem) }))
    }

    fn new_element(&mut self, value: D::Stored, hash: u64) -> NonNull<Elem<D, C>> {
        let elem = self.recycler.get();
        // SAFETY: Recyclers hand out unused nodes.
        unsafe { Element::init(elem, value, hash) };
        elem
    }

    fn increase_size(&mut self) {
        self.size += 1;
        if self.size > self.size_limit_to_rehash {
            let target = ceil_div(self.size, self.base_load_factor).max(self.bucket_count + 1);
            self.rehash_to(target);
        }
    }

    fn rehash_to(&mut self, min_bucket_count: usize) {
        let new_count = bucket_count_for(min_bucket_count);
        if self.buckets.is_some() && new_count == self.bucket_count {
            return;
        }

        let new_buckets = self
            .recycler
            .allocator()
            .allocate_array::<Link<D::Stored, C>>(new_count);
        for index in 0..new_count {
            // SAFETY: The array was just allocated with `new_count` slots.
            unsafe { new_buckets.as_ptr().add(index).write(None) };
        }

        let old_buckets = self.buckets.replace(new_buckets);
        let old_count = core::mem::replace(&mut self.bucket_count, new_count);
        self.size_limit_to_rehash = rehash_limit(new_count, self.max_load_factor);

        if let Some(old_buckets) = old_buckets {
            for index in 0..old_count {
                // SAFETY: `index` is within the old array, whose links still
                // refer to live elements. Each element is relinked into the new
                // array after its successor has been read.
                unsafe {
                    let mut cursor = *old_buckets.as_ptr().add(index);
                    while let Some(elem) = cursor {
                        cursor = Element::next(elem);
                        let hash = self.element_hash(elem);
                        self.link_element(elem, hash);
                    }
                }
            }

            let layout =
                Layout::array::<Link<D::Stored, C>>(old_count).expect("allocation size overflow");
            // SAFETY: The old array came from our allocator with this layout and
            // nothing refers to it anymore.
            unsafe { self.recycler.recycle_chunk(old_buckets.cast(), layout) };
        }

        tracing::trace!(
            target: "monohash",
            old_bucket_count = old_count,
            new_bucket_count = new_count,
            len = self.size,
            "rehashed"
        );
    }

    /// Links `elem` in front of the run of elements equal to it, or at the
    /// front of its bucket. Returns the bucket index.
    ///
    /// # Safety
    /// The array must be materialized and `elem` initialized and unlinked.
    unsafe fn link_element(&mut self, elem: NonNull<Elem<D, C>>, hash: u64) -> usize {
        let index = self.bucket_of(hash);
        // SAFETY: Caller guarantees `elem` is initialized and the array exists.
        unsafe {
            let key = D::key(Element::value(elem));
            let slot = match self.find_slot(index, key, hash) {
                Some((slot, _)) => slot,
                None => self.bucket_slot(index),
            };
            Element::set_next(elem, *slot);
            *slot = Some(elem);
        }
        index
    }

    /// Finds the first element of bucket `index` equal to `key`, returning it
    /// and the link that points at it.
    fn find_slot(
        &self,
        index: usize,
        key: &D::Key,
        hash: u64,
    ) -> Option<(*mut Link<D::Stored, C>, NonNull<Elem<D, C>>)> {
        let buckets = self.buckets?;
        debug_assert!(index < self.bucket_count);

        // SAFETY: `index` is in bounds and links refer to live elements.
        unsafe {
            let mut slot = buckets.as_ptr().add(index);
            while let Some(elem) = *slot {
                if self.matches(elem, key, hash) {
                    return Some((slot, elem));
                }
                slot = &raw mut (*elem.as_ptr()).next;
            }
        }

        None
    }

    fn locate(
        &self,
        position: Position,
    ) -> Option<(*mut Link<D::Stored, C>, NonNull<Elem<D, C>>)> {
        let target = position.element?;
        self.locate_in(self.bucket_of(position.hash), target)
    }

    fn first_from(&self, start: usize) -> Position {
        for index in start..self.bucket_count {
            if let Some(head) = self.head(index) {
                // SAFETY: `head` is a live element of this table.
                return Position::new(index, unsafe { self.element_hash(head) }, head);
            }
        }
        self.end()
    }

    /// # Safety
    /// `elem` must be a live element of bucket `index`.
    unsafe fn position_after(&self, index: usize, elem: NonNull<Elem<D, C>>) -> Position {
        // SAFETY: Caller guarantees `elem` is live, hence so is its successor.
        unsafe {
            match Element::next(elem) {
                Some(next) => Position::new(index, self.element_hash(next), next),
                None => self.first_from(index + 1),
            }
        }
    }

    /// # Safety
    /// `elem` must be a live element of this table.
    #[inline]
    unsafe fn element_hash(&self, elem: NonNull<Elem<D, C>>) -> u64 {
        // SAFETY: Caller guarantees `elem` is live.
        unsafe {
            match Element::cached_hash(elem) {
                Some(hash) => hash,
                None => self.hash_key(D::key(Element::value(elem))),
            }
        }
    }

    /// # Safety
    /// `elem` must be a live element of this table.
    #[inline]
    unsafe fn matches(&self, elem: NonNull<Elem<D, C>>, key: &D::Key, hash: u64) -> bool {
        // SAFETY: Caller guarantees `elem` is live.
        unsafe {
            if let Some(cached) = Element::cached_hash(elem)
                && cached != hash
            {
                return false;
            }
            self.key_equal.eq(D::key(Element::value(elem)), key)
        }
    }

    #[cfg(debug_assertions)]
    fn report_duplicates(&self, position: Position, operation: &'static str) {
        let Some((_, elem)) = self.locate(position) else {
            return;
        };

        // SAFETY: `elem` and its successors are live elements.
        unsafe {
            let key = D::key(Element::value(elem));
            let mut cursor = Element::next(elem);
            while let Some(other) = cursor {
                if self.matches(other, key, position.hash) {
                    tracing::error!(
                        target: "monohash",
                        operation,
                        "an element with an equal key is already present"
                    );
                    return;
                }
                cursor = Element::next(other);
            }
        }
    }
}

impl<'a, D, S, E, R, C, A> Extend<D::Stored> for HashTable<'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    D::Key: Hash,
    S: BuildHasher,
    E: KeyEqual<D::Key>,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn extend<I: IntoIterator<Item = D::Stored>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(lower, ValueReference::Relative);
        for value in iter {
            self.insert(value);
        }
    }
}

impl<'t, 'a, D, S, E, R, C, A> IntoIterator for &'t HashTable<'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    type IntoIter = Iter<'t, D::Stored, C>;
    type Item = &'t D::Stored;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walks the buckets of a table in order, counting down the elements left.
struct Cursor<T, C: HashCaching> {
    buckets: Option<NonNull<Link<T, C>>>,
    bucket_count: usize,
    next_bucket: usize,
    current: Link<T, C>,
    remaining: usize,
}

impl<T, C: HashCaching> Clone for Cursor<T, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, C: HashCaching> Copy for Cursor<T, C> {}

impl<T, C: HashCaching> Cursor<T, C> {
    fn new(buckets: Option<NonNull<Link<T, C>>>, bucket_count: usize, len: usize) -> Self {
        Self {
            buckets,
            bucket_count,
            next_bucket: 0,
            current: None,
            remaining: len,
        }
    }

    fn next_element(&mut self) -> Option<NonNull<Element<T, C>>> {
        loop {
            if let Some(elem) = self.current {
                // SAFETY: The borrow held by the owning iterator keeps the table,
                // and thus every linked element, alive and unchanged.
                self.current = unsafe { Element::next(elem) };
                self.remaining -= 1;
                return Some(elem);
            }

            let buckets = self.buckets?;
            if self.next_bucket >= self.bucket_count {
                return None;
            }
            // SAFETY: `next_bucket` is bounds checked above.
            self.current = unsafe { *buckets.as_ptr().add(self.next_bucket) };
            self.next_bucket += 1;
        }
    }
}

/// An iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::iter`].
pub struct Iter<'t, T, C: HashCaching = Cached> {
    cursor: Cursor<T, C>,
    _marker: PhantomData<&'t T>,
}

impl<T, C: HashCaching> Clone for Iter<'_, T, C> {
    fn clone(&self) -> Self {
        Self {
            cursor: self.cursor,
            _marker: PhantomData,
        }
    }
}

impl<'t, T, C: HashCaching> Iterator for Iter<'t, T, C> {
    type Item = &'t T;

    fn next(&mut self) -> Option<Self::Item> {
        let elem = self.cursor.next_element()?;
        // SAFETY: Elements reached through the cursor are live for `'t`.
        Some(unsafe { Element::value(elem) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.cursor.remaining, Some(self.cursor.remaining))
    }
}

impl<T, C: HashCaching> ExactSizeIterator for Iter<'_, T, C> {}

impl<T, C: HashCaching> FusedIterator for Iter<'_, T, C> {}

/// An iterator over the mapped portions of the values of a [`HashTable`].
///
/// Created by [`HashTable::iter_mut`].
pub struct IterMut<'t, D: ValueDescriptor, C: HashCaching = Cached> {
    cursor: Cursor<D::Stored, C>,
    _marker: PhantomData<&'t mut D::Stored>,
}

impl<'t, D: ValueDescriptor, C: HashCaching> Iterator for IterMut<'t, D, C>
where
    D::Mapped: 't,
{
    type Item = &'t mut D::Mapped;

    fn next(&mut self) -> Option<Self::Item> {
        let elem = self.cursor.next_element()?;
        // SAFETY: Each element is yielded once, and the table is mutably
        // borrowed for `'t`.
        Some(D::mapped_mut(unsafe { Element::value_mut(elem) }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.cursor.remaining, Some(self.cursor.remaining))
    }
}

impl<'t, D: ValueDescriptor, C: HashCaching> ExactSizeIterator for IterMut<'t, D, C> where
    D::Mapped: 't
{
}

impl<'t, D: ValueDescriptor, C: HashCaching> FusedIterator for IterMut<'t, D, C> where
    D::Mapped: 't
{
}

/// An iterator over the values of one bucket.
///
/// Created by [`HashTable::bucket_iter`].
pub struct BucketIter<'t, T, C: HashCaching = Cached> {
    current: Link<T, C>,
    _marker: PhantomData<&'t T>,
}

impl<T, C: HashCaching> Clone for BucketIter<'_, T, C> {
    fn clone(&self) -> Self {
        Self {
            current: self.current,
            _marker: PhantomData,
        }
    }
}

impl<'t, T, C: HashCaching> Iterator for BucketIter<'t, T, C> {
    type Item = &'t T;

    fn next(&mut self) -> Option<Self::Item> {
        let elem = self.current?;
        // SAFETY: The table is borrowed for `'t`, keeping the bucket intact.
        unsafe {
            self.current = Element::next(elem);
            Some(Element::value(elem))
        }
    }
}

impl<T, C: HashCaching> FusedIterator for BucketIter<'_, T, C> {}

/// A draining iterator over the values of a [`HashTable`].
///
/// Created by [`HashTable::drain`]. Yields owned values and recycles their
/// nodes.
///
/// # Examples
///
/// ```rust
/// use monohash::HashMap;
/// use monohash::MonoAllocator;
///
/// let allocator = MonoAllocator::new();
/// let mut map: HashMap<'_, u32, String> = HashMap::new_in(&allocator);
/// map.insert((1, "a".to_string()));
/// map.insert((2, "b".to_string()));
///
/// let mut values: Vec<(u32, String)> = map.drain().collect();
/// values.sort();
/// assert_eq!(values, [(1, "a".to_string()), (2, "b".to_string())]);
/// assert!(map.is_empty());
/// assert_eq!(map.recyclables_count(), 2);
/// ```
pub struct Drain<'t, 'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    table: &'t mut HashTable<'a, D, S, E, R, C, A>,
    bucket: usize,
}

impl<'a, D, S, E, R, C, A> Drop for Drain<'_, 'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

impl<'a, D, S, E, R, C, A> Iterator for Drain<'_, 'a, D, S, E, R, C, A>
where
    D: ValueDescriptor,
    D::Stored: 'a,
    R: Recycling,
    C: HashCaching,
    A: Allocator + 'a,
{
    type Item = D::Stored;

    fn next(&mut self) -> Option<Self::Item> {
        let buckets = self.table.buckets?;

        while self.bucket < self.table.bucket_count {
            // SAFETY: `bucket` is bounds checked, and links refer to live
            // elements which we unlink before detaching.
            unsafe {
                let slot = buckets.as_ptr().add(self.bucket);
                if let Some(elem) = *slot {
                    *slot = Element::next(elem);
                    self.table.size -= 1;
                    return Some(self.table.detach(elem));
                }
            }
            self.bucket += 1;
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.size, Some(self.table.size))
    }
}
