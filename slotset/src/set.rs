//! The public indexed ordered set.

use std::fmt;
use std::marker::PhantomData;

use slotset_arena::OutOfMemory;

use crate::node::Node;
use crate::order::{Compare, Natural};
use crate::pod::Pod;
use crate::tree::{AvlTree, Stats};

// =============================================================================
// Slot
// =============================================================================

/// Stable integer handle to an element.
///
/// A slot is assigned when an element is inserted and stays valid until
/// that element is erased, surviving any number of insertions, erasures,
/// and arena reallocations in between. After an erase the slot may be
/// handed out again for a *different* element; holding on to a slot past
/// its element's erase observes the recycling.
///
/// [`Slot::NONE`] (index 0) never names an element; lookups use it as the
/// "absent" answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot(u32);

impl Slot {
    /// The reserved "no element" handle.
    pub const NONE: Slot = Slot(0);

    /// Returns `true` if this is the reserved empty handle.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this handle may name an element.
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Returns the raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Constructs a slot from a raw index.
    ///
    /// # Safety
    ///
    /// The caller must ensure the value was previously obtained from
    /// [`Slot::index`] on the same container, or is 0.
    #[inline]
    pub const unsafe fn from_raw(index: u32) -> Self {
        Slot(index)
    }
}

// =============================================================================
// SlotSet
// =============================================================================

/// An ordered set whose elements are also addressable by stable slots.
///
/// Elements are kept in a self-balancing binary tree, so value lookups,
/// insertions, and erasures are O(log n); slot access is O(1). All nodes
/// live in one contiguous arena and link to each other by relative byte
/// offsets, which buys two properties at once:
///
/// - **Stable slots**: a slot is an index, not an address, so it survives
///   arena reallocation. Erased slots are recycled LIFO.
/// - **Byte-for-byte cloning**: the structure contains no absolute
///   pointers, so [`Clone`] is a single buffer copy plus two scalars.
///
/// The ordering is supplied by the `C` parameter, a [`Compare`]
/// implementation chosen at construction; [`Natural`] (the payload's own
/// `Ord`) is the default. Payloads must be [`Pod`].
///
/// # Example
///
/// ```
/// use slotset::SlotSet;
///
/// let mut set: SlotSet<u32> = SlotSet::new();
///
/// let (slot, inserted) = set.insert(20).unwrap();
/// assert!(inserted);
/// set.insert(10).unwrap();
/// set.insert(30).unwrap();
///
/// // Value access and slot access name the same element.
/// assert_eq!(set.get(&20), Some(&20));
/// assert_eq!(set.get_at(slot), Some(&20));
///
/// // Iteration is in key order.
/// let sorted: Vec<u32> = set.iter().copied().collect();
/// assert_eq!(sorted, vec![10, 20, 30]);
///
/// // The slot outlives unrelated mutations.
/// assert_eq!(set.remove(&10), Some(10));
/// set.insert(15).unwrap();
/// assert_eq!(set.get_at(slot), Some(&20));
/// ```
pub struct SlotSet<T: Pod, C: Compare<T> = Natural> {
    tree: AvlTree<T>,
    cmp: C,
    _marker: PhantomData<T>,
}

impl<T: Pod, C: Compare<T> + Default> SlotSet<T, C> {
    /// Creates an empty set with a default-constructed comparator.
    ///
    /// Does not allocate; the first insertion does.
    pub fn new() -> Self {
        Self::with_comparator(C::default())
    }

    /// Creates an empty set sized for `elements` insertions up front.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] if the initial allocation fails.
    pub fn with_capacity(elements: u32) -> Result<Self, OutOfMemory> {
        let mut set = Self::new();
        set.reserve(elements)?;
        Ok(set)
    }
}

impl<T: Pod, C: Compare<T> + Default> Default for SlotSet<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod, C: Compare<T>> SlotSet<T, C> {
    const NODE: u32 = Node::<T>::SIZE;

    /// Creates an empty set ordered by `cmp`.
    pub fn with_comparator(cmp: C) -> Self {
        Self {
            tree: AvlTree::new(),
            cmp,
            _marker: PhantomData,
        }
    }

    #[inline]
    fn to_slot(at: u32) -> Slot {
        debug_assert!(at % Self::NODE == 0);
        Slot(at / Self::NODE)
    }

    /// Offset for a slot, or 0 when the slot cannot name a live record.
    #[inline]
    fn to_offset(&self, slot: Slot) -> u32 {
        let at = slot.0 as u64 * Self::NODE as u64;
        if at == 0 || at + Self::NODE as u64 > self.tree.arena().len() as u64 {
            return 0;
        }
        at as u32
    }

    /// Returns the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len() as usize
    }

    /// Returns `true` if the set holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    /// Returns how many elements fit before the arena must grow.
    #[inline]
    pub fn capacity(&self) -> u32 {
        (self.tree.arena().capacity() / Self::NODE).saturating_sub(1)
    }

    /// Ensures room for `elements` elements in total.
    ///
    /// Counts from zero, not from the current length: `reserve(n)` sizes
    /// the arena for the sentinel record plus `n` element nodes. Growing
    /// invalidates nothing observable; slots and values carry over.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] if the allocation fails. The set is unchanged.
    pub fn reserve(&mut self, elements: u32) -> Result<(), OutOfMemory> {
        self.tree.reserve(elements)
    }

    /// Inserts `value`, returning its slot and whether it was newly added.
    ///
    /// When an equivalent element is already present, nothing changes and
    /// its slot is returned with `false`.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] if the arena needed to grow and could not. The set
    /// is unchanged on error.
    pub fn insert(&mut self, value: T) -> Result<(Slot, bool), OutOfMemory> {
        let (at, inserted) = self.tree.insert(&self.cmp, value)?;
        Ok((Self::to_slot(at), inserted))
    }

    /// Inserts `value` if absent; returns the slot holding the element
    /// equivalent to it either way.
    ///
    /// # Errors
    ///
    /// [`OutOfMemory`] if the arena needed to grow and could not.
    pub fn get_or_insert(&mut self, value: T) -> Result<Slot, OutOfMemory> {
        let (slot, _) = self.insert(value)?;
        Ok(slot)
    }

    /// Removes the element equivalent to `value`, returning it.
    ///
    /// Returns `None` (and changes nothing) when no such element exists.
    pub fn remove(&mut self, value: &T) -> Option<T> {
        let at = self.tree.find(&self.cmp, value);
        if at == 0 {
            return None;
        }
        self.tree.erase_at(at)
    }

    /// Removes the element at `slot`, returning it.
    ///
    /// Returns `None` (and changes nothing) for [`Slot::NONE`], an
    /// out-of-range slot, or a slot whose element was already erased.
    pub fn remove_at(&mut self, slot: Slot) -> Option<T> {
        let at = self.to_offset(slot);
        self.tree.erase_at(at)
    }

    /// Returns the stored element equivalent to `value`.
    #[inline]
    pub fn get(&self, value: &T) -> Option<&T> {
        let at = self.tree.find(&self.cmp, value);
        if at == 0 {
            return None;
        }
        Some(self.tree.payload(at))
    }

    /// Returns `true` if an element equivalent to `value` is present.
    #[inline]
    pub fn contains(&self, value: &T) -> bool {
        self.tree.find(&self.cmp, value) != 0
    }

    /// Returns the slot of the element equivalent to `value`, or
    /// [`Slot::NONE`].
    #[inline]
    pub fn slot_of(&self, value: &T) -> Slot {
        Self::to_slot(self.tree.find(&self.cmp, value))
    }

    /// Returns the element at `slot`.
    ///
    /// Checks that the slot names a live record; [`Slot::NONE`],
    /// out-of-range slots, and recycled-but-vacant slots answer `None`.
    #[inline]
    pub fn get_at(&self, slot: Slot) -> Option<&T> {
        let at = self.to_offset(slot);
        if !self.tree.is_live(at) {
            return None;
        }
        Some(self.tree.payload(at))
    }

    /// Returns the element at `slot` without validation.
    ///
    /// # Safety
    ///
    /// `slot` must have been returned by an insertion into this set and
    /// its element must not have been erased since.
    #[inline]
    pub unsafe fn get_at_unchecked(&self, slot: Slot) -> &T {
        debug_assert!(self.tree.is_live(slot.0 * Self::NODE));
        self.tree.payload(slot.0 * Self::NODE)
    }

    /// Returns an iterator over the elements in key order.
    pub fn iter(&self) -> Iter<'_, T> {
        let root = self.tree.root();
        Iter {
            tree: &self.tree,
            at: if root == 0 { 0 } else { self.tree.leftmost(root) },
        }
    }

    /// Removes every element and releases the arena.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Returns a balance and occupancy snapshot.
    pub fn stats(&self) -> Stats {
        self.tree.stats()
    }

    /// Full structural validation; used by the tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        self.tree.check_invariants(&self.cmp)
    }
}

impl<T: Pod, C: Compare<T> + Clone> Clone for SlotSet<T, C> {
    /// Clones by copying the arena bytes and two scalars.
    ///
    /// Every link inside the arena is a relative offset, so the copy needs
    /// no fix-up pass; slots, iteration order, and free-list state carry
    /// over exactly.
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            cmp: self.cmp.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Pod + fmt::Debug, C: Compare<T>> fmt::Debug for SlotSet<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// Safety: the set exclusively owns its arena; sending it moves the stored
// T values and the comparator with it, so both must be Send.
unsafe impl<T: Pod + Send, C: Compare<T> + Send> Send for SlotSet<T, C> {}

// Safety: &self methods only read the arena and the comparator; shared
// readers are safe while no &mut exists, so both must be Sync.
unsafe impl<T: Pod + Sync, C: Compare<T> + Sync> Sync for SlotSet<T, C> {}

// =============================================================================
// Iter
// =============================================================================

/// Forward in-order iterator over a [`SlotSet`].
///
/// Expressed as an (arena, offset) pair rather than a pointer, so it costs
/// nothing to copy; the borrow on the set keeps every mutating operation
/// away while any iterator is alive.
pub struct Iter<'a, T: Pod> {
    tree: &'a AvlTree<T>,
    /// Offset of the next node to yield, or 0 when done.
    at: u32,
}

impl<'a, T: Pod> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.at == 0 {
            return None;
        }
        let value = self.tree.payload(self.at);
        self.at = self.tree.inorder_next(self.at);
        Some(value)
    }
}

impl<'a, T: Pod> Clone for Iter<'a, T> {
    fn clone(&self) -> Self {
        Self {
            tree: self.tree,
            at: self.at,
        }
    }
}

impl<'a, T: Pod> fmt::Debug for Iter<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("at", &self.at).finish()
    }
}

impl<'a, T: Pod, C: Compare<T>> IntoIterator for &'a SlotSet<T, C> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
