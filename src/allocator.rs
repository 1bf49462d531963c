use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::ptr::NonNull;

use bumpalo::Bump;

/// A memory source for hash table nodes and bucket arrays.
///
/// Tables borrow their allocator and never return memory to it on their own
/// initiative, except through [`free`](Allocator::free), which monotonic
/// allocators implement as a no-op.
///
/// # Safety
///
/// - [`allocate`](Allocator::allocate) must return memory valid for reads and
///   writes of `layout.size()` bytes, aligned to `layout.align()`, which stays
///   valid until it is passed to `free` or the allocator is reset or dropped.
/// - If [`ALLOWS_MEM_SPLIT`](Allocator::ALLOWS_MEM_SPLIT) is `true`, any
///   aligned sub-range of an allocation may be passed to `free` on its own with
///   a layout describing just that range.
pub unsafe trait Allocator {
    /// Whether a single allocation may be sliced into independently reusable
    /// pieces.
    ///
    /// Hash tables use this to decide if the bucket array replaced by a rehash
    /// can be turned into recyclable nodes.
    const ALLOWS_MEM_SPLIT: bool;

    /// Allocates a block of memory for `layout`.
    ///
    /// Exhaustion is not recoverable: implementations abort or panic rather
    /// than returning.
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Returns memory to the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Allocator::allocate) on
    /// this allocator with the same `layout` (or be a sub-range of such a
    /// block, if [`ALLOWS_MEM_SPLIT`](Allocator::ALLOWS_MEM_SPLIT) is `true`),
    /// and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);

    /// Allocates uninitialized storage for `len` values of `T`.
    #[inline]
    fn allocate_array<T>(&self, len: usize) -> NonNull<T> {
        let layout = Layout::array::<T>(len).expect("allocation size overflow");
        self.allocate(layout).cast()
    }
}

/// A monotonic (bump) allocator.
///
/// Individual allocations are never released; [`reset`](MonoAllocator::reset)
/// reclaims everything at once. Since `reset` takes `&mut self`, no table
/// borrowing the allocator can be alive across it.
///
/// # Examples
///
/// ```rust
/// use monohash::HashSet;
/// use monohash::MonoAllocator;
///
/// let mut allocator = MonoAllocator::new();
/// {
///     let mut set: HashSet<'_, u32> = HashSet::new_in(&allocator);
///     set.insert(7);
///     assert!(set.contains(&7));
/// }
/// assert!(allocator.allocated_bytes() > 0);
/// allocator.reset();
/// ```
#[derive(Default)]
pub struct MonoAllocator {
    bump: Bump,
}

impl Debug for MonoAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MonoAllocator")
            .field("allocated_bytes", &self.bump.allocated_bytes())
            .finish()
    }
}

impl MonoAllocator {
    /// Creates an empty allocator. The first chunk is requested lazily.
    pub fn new() -> Self {
        Self { bump: Bump::new() }
    }

    /// Creates an allocator whose first chunk holds at least `bytes` bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bump: Bump::with_capacity(bytes),
        }
    }

    /// Total bytes of the chunks currently owned by the allocator.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Releases every allocation made so far.
    ///
    /// Destructors of values living in the arena are not run; hash tables
    /// drop their values themselves before they release the borrow.
    pub fn reset(&mut self) {
        self.bump.reset();
    }
}

// SAFETY: `Bump` hands out properly aligned, exclusively owned blocks that stay
// valid until the bump is reset or dropped, both of which need `&mut self` or
// ownership. `free` does nothing, so any sub-range may be passed to it.
unsafe impl Allocator for MonoAllocator {
    const ALLOWS_MEM_SPLIT: bool = true;

    #[inline]
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        self.bump.alloc_layout(layout)
    }

    #[inline]
    unsafe fn free(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

/// An allocator backed by the global heap.
///
/// Nodes are allocated and freed one by one. Heap blocks cannot be split, so
/// bucket arrays replaced by a rehash are freed instead of being recycled.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

// SAFETY: Non-empty blocks come straight from the global allocator and are
// released with the layout they were allocated with. Zero-sized requests get a
// dangling, aligned pointer that is never freed.
unsafe impl Allocator for HeapAllocator {
    const ALLOWS_MEM_SPLIT: bool = false;

    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        if layout.size() == 0 {
            // SAFETY: Alignments are never zero.
            return unsafe { NonNull::new_unchecked(layout.align() as *mut u8) };
        }

        // SAFETY: We have validated that the layout size is non-zero.
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => handle_alloc_error(layout),
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            // SAFETY: Caller guarantees `ptr` was allocated by us with `layout`.
            unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }
}
