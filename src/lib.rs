#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Memory sources for nodes and bucket arrays: a monotonic arena and the
/// global heap.
pub mod allocator;

/// Map mode: `(K, V)` pairs keyed by `K`, with assign-or-insert operations.
pub mod hash_map;

/// Set mode: the whole stored value is the key.
pub mod hash_set;

/// The chained table engine shared by both modes, with its positions,
/// element handles and iterators.
pub mod hash_table;

pub mod recycling;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hash builder used when none is specified.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hash builder used when none is specified.
        pub type DefaultHashBuilder = std::collections::hash_map::RandomState;
    } else {
        compile_error!("either the `foldhash` or the `std` feature must be enabled");
    }
}

pub use allocator::Allocator;
pub use allocator::HeapAllocator;
pub use allocator::MonoAllocator;
pub use hash_map::HashMap;
pub use hash_map::MapRecycler;
pub use hash_set::HashSet;
pub use hash_set::SetRecycler;
pub use hash_table::ElementHandle;
pub use hash_table::HashTable;
pub use hash_table::LocalPosition;
pub use hash_table::Position;
pub use hash_table::ValueReference;
pub use recycling::SharedRecycler;
