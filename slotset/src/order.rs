//! Caller-supplied ordering for set elements.

/// A strict weak order over `T`, supplied at container construction.
///
/// The container infers equivalence as `!less(a, b) && !less(b, a)`; two
/// equivalent values occupy one slot. The relation must be deterministic
/// and side-effect free, or the tree order becomes meaningless.
///
/// Comparators are usually zero-sized and monomorphized away. A stateful
/// comparator works too, as long as its verdicts never change while any
/// element it ordered is still in the set.
///
/// # Example
///
/// ```
/// use slotset::{Compare, SlotSet};
///
/// /// Orders quotes by price only; quantity is payload.
/// #[derive(Clone, Copy, Default)]
/// struct ByPrice;
///
/// impl Compare<(u64, u64)> for ByPrice {
///     fn less(&self, a: &(u64, u64), b: &(u64, u64)) -> bool {
///         a.0 < b.0
///     }
/// }
///
/// let mut set: SlotSet<(u64, u64), ByPrice> = SlotSet::new();
/// set.insert((100, 5)).unwrap();
///
/// // Same price, different quantity: equivalent, not inserted.
/// let (_, inserted) = set.insert((100, 9)).unwrap();
/// assert!(!inserted);
/// ```
pub trait Compare<T> {
    /// Returns `true` when `a` orders strictly before `b`.
    fn less(&self, a: &T, b: &T) -> bool;
}

/// The default comparator: the type's own [`Ord`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Natural;

impl<T: Ord> Compare<T> for Natural {
    #[inline]
    fn less(&self, a: &T, b: &T) -> bool {
        a < b
    }
}
