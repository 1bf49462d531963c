//! Node recycling policies.
//!
//! A monotonic allocator cannot take single nodes back, so erased nodes go
//! to a *recycler*, a free list the next insertion draws from. Which recycler
//! a table uses is selected by one of the policy markers in this module:
//!
//! - [`Private`]: each table owns its free list.
//! - [`Shared`]: several tables draw from one [`SharedRecycler`] that must
//!   outlive them all.
//! - [`NoRecycling`]: erased nodes are returned to the allocator, which for a
//!   [`MonoAllocator`](crate::MonoAllocator) means they are abandoned until the
//!   arena is reset.

use core::alloc::Layout;
use core::cell::Cell;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem::align_of;
use core::mem::size_of;
use core::ptr::NonNull;

use crate::allocator::Allocator;
use crate::hash_table::ValueReference;

/// An intrusively linked node that can sit on a free list.
///
/// # Safety
///
/// [`link`](Node::link) and [`set_link`](Node::set_link) must only access the
/// link field, so that they are valid on nodes whose payload is uninitialized
/// or already dropped.
pub unsafe trait Node: Sized {
    /// Reads the link of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be valid for reads and its link must have been written.
    unsafe fn link(node: NonNull<Self>) -> Option<NonNull<Self>>;

    /// Overwrites the link of `node`.
    ///
    /// # Safety
    ///
    /// `node` must be valid for writes.
    unsafe fn set_link(node: NonNull<Self>, next: Option<NonNull<Self>>);
}

/// The storage side of a recycling policy, used by a hash table to obtain and
/// release element nodes and bucket arrays.
pub trait Recycler<'a, N: Node, A: Allocator> {
    /// `false` only for the non-recycling policy.
    const IS_RECYCLING: bool;

    /// The allocator nodes are obtained from when the free list is empty.
    fn allocator(&self) -> &'a A;

    /// Where a node goes once it has left the table and is released without
    /// being linked again.
    fn release_target(&self) -> ReleaseTarget<'a, N, A>;

    /// Pops a node from the free list, or allocates a fresh one.
    ///
    /// The returned node is uninitialized.
    fn get(&mut self) -> NonNull<N>;

    /// Takes back a node whose payload has been dropped or moved out.
    ///
    /// # Safety
    ///
    /// `node` must have been obtained from [`get`](Recycler::get) on a
    /// recycler with the same allocator, be unlinked from any table and never
    /// be used by the caller again.
    unsafe fn recycle(&mut self, node: NonNull<N>);

    /// Like [`recycle`](Recycler::recycle), but called while a table is being
    /// disposed of. Owned free lists may release the node instead.
    ///
    /// # Safety
    ///
    /// Same as [`recycle`](Recycler::recycle).
    unsafe fn dispose(&mut self, node: NonNull<N>);

    /// Takes back a bucket array that was replaced by a rehash.
    ///
    /// If the allocator permits it, the block is sliced into nodes. Otherwise
    /// it is freed.
    ///
    /// # Safety
    ///
    /// `chunk` must have been allocated from this recycler's allocator with
    /// `layout` and must not be used again.
    unsafe fn recycle_chunk(&mut self, chunk: NonNull<u8>, layout: Layout);

    /// Takes back a bucket array while a table is being disposed of.
    ///
    /// # Safety
    ///
    /// Same as [`recycle_chunk`](Recycler::recycle_chunk).
    unsafe fn dispose_chunk(&mut self, chunk: NonNull<u8>, layout: Layout);

    /// Number of nodes currently available for reuse.
    fn count(&self) -> usize;

    /// Makes sure `qty` additional nodes sit on the free list.
    fn reserve(&mut self, qty: usize);

    /// Forgets the free list, returning owned nodes to the allocator.
    fn reset(&mut self);
}

/// The destination of a node released outside of any table, see
/// [`ElementHandle`](crate::ElementHandle).
///
/// A table's private free list cannot be reached once the node has left the
/// table, so such nodes return to the allocator. Nodes of [`Shared`] tables
/// return to the shared free list.
pub enum ReleaseTarget<'a, N: Node, A: Allocator> {
    /// The node is freed to the allocator.
    Allocator(&'a A),
    /// The node is pushed on the shared free list.
    Shared(&'a SharedRecycler<'a, N, A>),
}

impl<N: Node, A: Allocator> Clone for ReleaseTarget<'_, N, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N: Node, A: Allocator> Copy for ReleaseTarget<'_, N, A> {}

impl<N: Node, A: Allocator> Debug for ReleaseTarget<'_, N, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Allocator(_) => f.write_str("ReleaseTarget::Allocator"),
            Self::Shared(shared) => f
                .debug_tuple("ReleaseTarget::Shared")
                .field(shared)
                .finish(),
        }
    }
}

impl<'a, N: Node, A: Allocator> ReleaseTarget<'a, N, A> {
    /// The allocator the node was obtained from.
    pub fn allocator(&self) -> &'a A {
        match self {
            Self::Allocator(allocator) => allocator,
            Self::Shared(shared) => shared.allocator,
        }
    }

    /// # Safety
    /// `node` must come from [`allocator`](Self::allocator) as a single node,
    /// hold no live payload and be unlinked from any table.
    pub(crate) unsafe fn release(&self, node: NonNull<N>) {
        match self {
            // SAFETY: Caller guarantees provenance and that the node is unused.
            Self::Allocator(allocator) => unsafe {
                allocator.free(node.cast(), Layout::new::<N>())
            },
            // SAFETY: As above; the shared list takes unused nodes.
            Self::Shared(shared) => shared.with_list(|list| unsafe { list.push(node) }),
        }
    }
}

/// A recycler that can be created from nothing but an allocator.
pub trait OwnedRecycler<'a, N: Node, A: Allocator>: Recycler<'a, N, A> {
    /// Creates an empty recycler drawing from `allocator`.
    fn with_allocator(allocator: &'a A) -> Self;
}

mod sealed {
    pub trait Sealed {}
}

/// A recycling policy, selecting the recycler type a table stores.
pub trait Recycling: sealed::Sealed {
    /// The recycler a table with this policy stores for nodes `N` from `A`.
    type Recycler<'a, N: Node + 'a, A: Allocator + 'a>: Recycler<'a, N, A>;
}

/// Each table keeps its own free list, released when the table is dropped or
/// reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Private;

/// Tables draw from and return to an external [`SharedRecycler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Shared;

/// Erased nodes go straight back to the allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecycling;

impl sealed::Sealed for Private {}
impl sealed::Sealed for Shared {}
impl sealed::Sealed for NoRecycling {}

impl Recycling for Private {
    type Recycler<'a, N: Node + 'a, A: Allocator + 'a> = PrivateRecycler<'a, N, A>;
}

impl Recycling for Shared {
    type Recycler<'a, N: Node + 'a, A: Allocator + 'a> = SharedHandle<'a, N, A>;
}

impl Recycling for NoRecycling {
    type Recycler<'a, N: Node + 'a, A: Allocator + 'a> = NoRecycler<'a, N, A>;
}

struct FreeList<N> {
    head: Option<NonNull<N>>,
    count: usize,
}

impl<N> Clone for FreeList<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for FreeList<N> {}

impl<N: Node> FreeList<N> {
    const EMPTY: Self = Self {
        head: None,
        count: 0,
    };

    /// # Safety
    /// `node` must be valid for writes and not already on a list.
    #[inline]
    unsafe fn push(&mut self, node: NonNull<N>) {
        // SAFETY: Caller guarantees `node` is writable.
        unsafe { N::set_link(node, self.head) };
        self.head = Some(node);
        self.count += 1;
    }

    #[inline]
    fn pop(&mut self) -> Option<NonNull<N>> {
        let node = self.head?;
        // SAFETY: Every node on the list had its link written by `push`.
        self.head = unsafe { N::link(node) };
        self.count -= 1;
        Some(node)
    }

    /// Adds `qty` fresh nodes, in one block when the allocator can split
    /// memory and one by one otherwise.
    fn reserve<A: Allocator>(&mut self, allocator: &A, qty: usize) {
        if qty == 0 {
            return;
        }

        if A::ALLOWS_MEM_SPLIT {
            let block = allocator.allocate_array::<N>(qty);
            for i in 0..qty {
                // SAFETY: `block` holds `qty` node slots, and split memory may
                // be released node by node.
                unsafe { self.push(block.add(i)) };
            }
        } else {
            for _ in 0..qty {
                let node = allocator.allocate(Layout::new::<N>()).cast::<N>();
                // SAFETY: Freshly allocated for exactly one node.
                unsafe { self.push(node) };
            }
        }
    }

    /// Slices `chunk` into as many aligned nodes as fit and pushes them.
    ///
    /// # Safety
    /// `chunk` must be valid for writes of `layout.size()` bytes and unused.
    unsafe fn push_chunk(&mut self, chunk: NonNull<u8>, layout: Layout) -> usize {
        let start = chunk.as_ptr() as usize;
        let mut offset = start.next_multiple_of(align_of::<N>()) - start;
        let mut pushed = 0;

        while offset + size_of::<N>() <= layout.size() {
            // SAFETY: `offset..offset + size_of::<N>()` lies within the chunk and
            // is aligned for `N`.
            unsafe { self.push(chunk.add(offset).cast::<N>()) };
            offset += size_of::<N>();
            pushed += 1;
        }

        pushed
    }

    /// Returns every node to `allocator` and empties the list.
    fn release<A: Allocator>(&mut self, allocator: &A) {
        while let Some(node) = self.pop() {
            // SAFETY: Nodes on the list are either single-node allocations or
            // pieces of split memory, both of which `free` accepts.
            unsafe { allocator.free(node.cast(), Layout::new::<N>()) };
        }
    }
}

/// # Safety
/// `chunk` must come from `allocator` with `layout` and be unused.
unsafe fn take_chunk<N: Node, A: Allocator>(
    list: &mut FreeList<N>,
    allocator: &A,
    chunk: NonNull<u8>,
    layout: Layout,
) {
    if !A::ALLOWS_MEM_SPLIT {
        // SAFETY: Caller guarantees provenance and layout.
        unsafe { allocator.free(chunk, layout) };
        return;
    }

    // SAFETY: Caller guarantees the chunk is unused.
    let pushed = unsafe { list.push_chunk(chunk, layout) };
    #[cfg(debug_assertions)]
    if pushed == 0 {
        tracing::warn!(
            target: "monohash",
            chunk_size = layout.size(),
            node_size = size_of::<N>(),
            "recycled chunk too small to hold a single node"
        );
    }
    #[cfg(not(debug_assertions))]
    let _ = pushed;
}

/// The recycler of the [`Private`] policy.
pub struct PrivateRecycler<'a, N: Node, A: Allocator> {
    allocator: &'a A,
    list: FreeList<N>,
}

impl<'a, N: Node, A: Allocator> Debug for PrivateRecycler<'a, N, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrivateRecycler")
            .field("count", &self.list.count)
            .finish()
    }
}

impl<'a, N: Node, A: Allocator> Drop for PrivateRecycler<'a, N, A> {
    fn drop(&mut self) {
        self.list.release(self.allocator);
    }
}

impl<'a, N: Node, A: Allocator> OwnedRecycler<'a, N, A> for PrivateRecycler<'a, N, A> {
    fn with_allocator(allocator: &'a A) -> Self {
        Self {
            allocator,
            list: FreeList::EMPTY,
        }
    }
}

impl<'a, N: Node, A: Allocator> Recycler<'a, N, A> for PrivateRecycler<'a, N, A> {
    const IS_RECYCLING: bool = true;

    #[inline]
    fn allocator(&self) -> &'a A {
        self.allocator
    }

    #[inline]
    fn release_target(&self) -> ReleaseTarget<'a, N, A> {
        ReleaseTarget::Allocator(self.allocator)
    }

    #[inline]
    fn get(&mut self) -> NonNull<N> {
        match self.list.pop() {
            Some(node) => node,
            None => self.allocator.allocate(Layout::new::<N>()).cast(),
        }
    }

    #[inline]
    unsafe fn recycle(&mut self, node: NonNull<N>) {
        // SAFETY: Caller hands over an unused node.
        unsafe { self.list.push(node) };
    }

    unsafe fn dispose(&mut self, node: NonNull<N>) {
        // SAFETY: Caller guarantees the node came from our allocator.
        unsafe { self.allocator.free(node.cast(), Layout::new::<N>()) };
    }

    unsafe fn recycle_chunk(&mut self, chunk: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded caller guarantees.
        unsafe { take_chunk(&mut self.list, self.allocator, chunk, layout) };
    }

    unsafe fn dispose_chunk(&mut self, chunk: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded caller guarantees.
        unsafe { self.allocator.free(chunk, layout) };
    }

    fn count(&self) -> usize {
        self.list.count
    }

    fn reserve(&mut self, qty: usize) {
        self.list.reserve(self.allocator, qty);
    }

    fn reset(&mut self) {
        self.list.release(self.allocator);
    }
}

/// The recycler of the [`NoRecycling`] policy. It stores nothing.
pub struct NoRecycler<'a, N: Node, A: Allocator> {
    allocator: &'a A,
    _marker: PhantomData<fn() -> N>,
}

impl<'a, N: Node, A: Allocator> Debug for NoRecycler<'a, N, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("NoRecycler")
    }
}

impl<'a, N: Node, A: Allocator> OwnedRecycler<'a, N, A> for NoRecycler<'a, N, A> {
    fn with_allocator(allocator: &'a A) -> Self {
        Self {
            allocator,
            _marker: PhantomData,
        }
    }
}

impl<'a, N: Node, A: Allocator> Recycler<'a, N, A> for NoRecycler<'a, N, A> {
    const IS_RECYCLING: bool = false;

    #[inline]
    fn allocator(&self) -> &'a A {
        self.allocator
    }

    #[inline]
    fn release_target(&self) -> ReleaseTarget<'a, N, A> {
        ReleaseTarget::Allocator(self.allocator)
    }

    #[inline]
    fn get(&mut self) -> NonNull<N> {
        self.allocator.allocate(Layout::new::<N>()).cast()
    }

    #[inline]
    unsafe fn recycle(&mut self, node: NonNull<N>) {
        // SAFETY: Caller guarantees the node came from our allocator.
        unsafe { self.allocator.free(node.cast(), Layout::new::<N>()) };
    }

    unsafe fn dispose(&mut self, node: NonNull<N>) {
        // SAFETY: Forwarded caller guarantees.
        unsafe { self.recycle(node) };
    }

    unsafe fn recycle_chunk(&mut self, chunk: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded caller guarantees.
        unsafe { self.allocator.free(chunk, layout) };
    }

    unsafe fn dispose_chunk(&mut self, chunk: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded caller guarantees.
        unsafe { self.allocator.free(chunk, layout) };
    }

    fn count(&self) -> usize {
        0
    }

    fn reserve(&mut self, qty: usize) {
        #[cfg(debug_assertions)]
        if qty > 0 {
            tracing::warn!(
                target: "monohash",
                qty,
                "reserving recyclables on a table that does not recycle"
            );
        }
        #[cfg(not(debug_assertions))]
        let _ = qty;
    }

    fn reset(&mut self) {}
}

/// A free list shared by several hash tables of the same node type.
///
/// The recycler must outlive every table attached to it, which the borrow in
/// [`Shared`] tables enforces. Nodes returned by one table are handed out to
/// the next table that inserts, and when an attached table is dropped or
/// reset all of its nodes (and, with a splitting allocator, its bucket array)
/// land here.
///
/// # Examples
///
/// ```rust
/// use monohash::DefaultHashBuilder;
/// use monohash::HashTable;
/// use monohash::HeapAllocator;
/// use monohash::hash_set::HashSet;
/// use monohash::hash_set::SetRecycler;
/// use monohash::hash_table::Cached;
/// use monohash::hash_table::DefaultEq;
/// use monohash::recycling::Shared;
///
/// type SharedSet<'a> = HashSet<'a, u32, DefaultHashBuilder, DefaultEq, Shared, Cached, HeapAllocator>;
///
/// let allocator = HeapAllocator;
/// let recycler: SetRecycler<'_, u32, HeapAllocator> = SetRecycler::new(&allocator);
/// {
///     let mut first: SharedSet<'_> = HashTable::with_shared_recycler(&recycler);
///     first.insert(1);
///     first.insert(2);
/// }
/// assert_eq!(recycler.count(), 2);
///
/// let mut second: SharedSet<'_> = HashTable::with_shared_recycler(&recycler);
/// second.insert(3);
/// assert_eq!(recycler.count(), 1);
/// ```
pub struct SharedRecycler<'a, N: Node, A: Allocator> {
    allocator: &'a A,
    list: Cell<FreeList<N>>,
}

impl<'a, N: Node, A: Allocator> Debug for SharedRecycler<'a, N, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedRecycler")
            .field("count", &self.count())
            .finish()
    }
}

impl<'a, N: Node, A: Allocator> Drop for SharedRecycler<'a, N, A> {
    fn drop(&mut self) {
        self.list.get_mut().release(self.allocator);
    }
}

impl<'a, N: Node, A: Allocator> SharedRecycler<'a, N, A> {
    /// Creates an empty recycler drawing from `allocator`.
    pub fn new(allocator: &'a A) -> Self {
        Self {
            allocator,
            list: Cell::new(FreeList::EMPTY),
        }
    }

    /// The allocator nodes are obtained from.
    pub fn allocator(&self) -> &'a A {
        self.allocator
    }

    /// Number of nodes currently available for reuse.
    pub fn count(&self) -> usize {
        self.list.get().count
    }

    /// Grows the free list.
    ///
    /// With [`ValueReference::Absolute`] the list is topped up to `qty` nodes;
    /// with [`ValueReference::Relative`] `qty` nodes are added.
    pub fn reserve(&self, qty: usize, reference: ValueReference) {
        let missing = match reference {
            ValueReference::Absolute => qty.saturating_sub(self.count()),
            ValueReference::Relative => qty,
        };
        self.with_list(|list| list.reserve(self.allocator, missing));
    }

    /// Returns every stored node to the allocator.
    ///
    /// Attached tables keep working and simply allocate afresh.
    pub fn reset(&self) {
        self.with_list(|list| list.release(self.allocator));
    }

    #[inline]
    fn with_list<T>(&self, f: impl FnOnce(&mut FreeList<N>) -> T) -> T {
        let mut list = self.list.get();
        let result = f(&mut list);
        self.list.set(list);
        result
    }
}

/// The per-table side of the [`Shared`] policy, referring to a
/// [`SharedRecycler`].
pub struct SharedHandle<'a, N: Node, A: Allocator> {
    shared: &'a SharedRecycler<'a, N, A>,
}

impl<'a, N: Node, A: Allocator> SharedHandle<'a, N, A> {
    pub(crate) fn new(shared: &'a SharedRecycler<'a, N, A>) -> Self {
        Self { shared }
    }
}

impl<'a, N: Node, A: Allocator> Debug for SharedHandle<'a, N, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("SharedHandle").field(self.shared).finish()
    }
}

impl<'a, N: Node, A: Allocator> Recycler<'a, N, A> for SharedHandle<'a, N, A> {
    const IS_RECYCLING: bool = true;

    #[inline]
    fn allocator(&self) -> &'a A {
        self.shared.allocator
    }

    #[inline]
    fn release_target(&self) -> ReleaseTarget<'a, N, A> {
        ReleaseTarget::Shared(self.shared)
    }

    #[inline]
    fn get(&mut self) -> NonNull<N> {
        match self.shared.with_list(FreeList::pop) {
            Some(node) => node,
            None => self.shared.allocator.allocate(Layout::new::<N>()).cast(),
        }
    }

    #[inline]
    unsafe fn recycle(&mut self, node: NonNull<N>) {
        // SAFETY: Caller hands over an unused node.
        self.shared.with_list(|list| unsafe { list.push(node) });
    }

    unsafe fn dispose(&mut self, node: NonNull<N>) {
        // SAFETY: Forwarded caller guarantees.
        unsafe { self.recycle(node) };
    }

    unsafe fn recycle_chunk(&mut self, chunk: NonNull<u8>, layout: Layout) {
        let allocator = self.shared.allocator;
        // SAFETY: Forwarded caller guarantees.
        self.shared
            .with_list(|list| unsafe { take_chunk(list, allocator, chunk, layout) });
    }

    unsafe fn dispose_chunk(&mut self, chunk: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarded caller guarantees.
        unsafe { self.recycle_chunk(chunk, layout) };
    }

    fn count(&self) -> usize {
        self.shared.count()
    }

    fn reserve(&mut self, qty: usize) {
        self.shared.reserve(qty, ValueReference::Relative);
    }

    fn reset(&mut self) {}
}
