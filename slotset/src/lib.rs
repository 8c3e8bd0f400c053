//! # slotset
//!
//! An **indexed ordered set**: a container that is simultaneously an
//! ordered set over a caller-supplied total order and a slot-addressable
//! array whose integer handles stay valid for the whole lifetime of an
//! element.
//!
//! ## Design
//!
//! Every tree node, sentinel included, lives in one contiguous growable
//! arena ([`slotset_arena::Arena`]). Nodes link to parent and children by
//! *relative* byte offsets, never by address, which gives the container
//! three properties that normally fight each other:
//!
//! - **No per-element allocation.** An insertion is a free-list pop or an
//!   arena append; elements are packed at node granularity.
//! - **Stable O(1) handles.** A [`Slot`] is the node's byte offset divided
//!   by the node size. Reallocation moves bytes, not indices.
//! - **Trivial deep copy.** With no absolute pointers in the buffer,
//!   cloning the container is one `memcpy` plus two scalars.
//!
//! Balance is maintained AVL-style with a per-node three-state tilt tag,
//! so lookups, insertions, and erasures are O(log n) with depth at most
//! `1.44 * log2(n + 2)`.
//!
//! Erased nodes are zeroized and chained into a LIFO free list headed at
//! the sentinel record, and get recycled before the arena grows again; a
//! slot may therefore be reused for a different element after its original
//! element is erased.
//!
//! ## Payload contract
//!
//! Payloads must be [`Pod`]: bit-copyable, with no drop glue. The arena
//! relocates records with a raw byte copy and never runs per-element move
//! hooks. The ordering comes from a [`Compare`] implementation chosen at
//! construction; the default [`Natural`] uses the payload's `Ord`.
//!
//! ## Concurrency
//!
//! No synchronization built in. The set is a single-owner value; `&`/`&mut`
//! borrows give the usual shared-reader / exclusive-writer discipline, and
//! iterators borrow the set, so every mutation invalidates them at compile
//! time. The container is `Send` when the payload and comparator are `Send`,
//! and `Sync` when both are `Sync`.
//!
//! # Example
//!
//! ```
//! use slotset::{Slot, SlotSet};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
//! #[repr(C)]
//! struct Point {
//!     x: i16,
//!     y: i16,
//!     z: i16,
//! }
//!
//! let mut cloud: SlotSet<Point> = SlotSet::new();
//!
//! let (origin, _) = cloud.insert(Point { x: 0, y: 0, z: 0 }).unwrap();
//! cloud.insert(Point { x: 1, y: 2, z: 3 }).unwrap();
//!
//! // The handle keeps working across unrelated churn.
//! for x in 0..100 {
//!     cloud.insert(Point { x, y: 1, z: 1 }).unwrap();
//! }
//! assert_eq!(cloud.get_at(origin), Some(&Point { x: 0, y: 0, z: 0 }));
//! ```

mod node;
mod order;
mod pod;
mod set;
mod tree;

pub use order::{Compare, Natural};
pub use pod::Pod;
pub use set::{Iter, Slot, SlotSet};
pub use tree::Stats;

pub use slotset_arena::OutOfMemory;
