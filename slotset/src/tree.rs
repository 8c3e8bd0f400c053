//! The single-arena AVL core.
//!
//! All nodes, including the sentinel head at offset 0, live in one
//! [`Arena`]. The tree never holds a pointer across an operation that can
//! grow the arena; every node access re-derives its address from the
//! current base and an absolute byte offset, and every stored link is a
//! relative byte distance. The offsets this module passes around are
//! absolute; the `i32` values stored in node records are relative.
//!
//! The sentinel head is not a tree element. Its `right` link is the head
//! of a LIFO chain of decommissioned nodes, which is why offset 0 can
//! serve as the universal "no node" value everywhere else.

use std::marker::PhantomData;
use std::mem::{align_of, MaybeUninit};

use slotset_arena::{Arena, OutOfMemory, ARENA_ALIGN, MAX_CAPACITY};

use crate::node::{Node, Side, Tilt};
use crate::order::Compare;
use crate::pod::Pod;

/// Applies a relative link to an absolute offset.
#[inline]
fn step(at: u32, link: i32) -> u32 {
    debug_assert!(link != 0, "followed an absent link");
    (at as i64 + link as i64) as u32
}

/// The relative link that would lead from `from` to `to`.
#[inline]
fn off(from: u32, to: u32) -> i32 {
    (to as i64 - from as i64) as i32
}

/// A balance summary of the live tree, plus arena occupancy numbers.
///
/// Leaf depths are counted in edges from the root; a single-element tree
/// reports 0 for both extremes. For a healthy tree the two stay within the
/// AVL bound of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Bytes currently allocated by the arena.
    pub allocated_bytes: u32,
    /// Bytes occupied by records (sentinel included).
    pub used_bytes: u32,
    /// Buffer reallocations over the container's lifetime.
    pub reallocs: u32,
    /// Nodes reachable from the root.
    pub live_nodes: u32,
    /// Decommissioned nodes waiting on the free list.
    pub free_nodes: u32,
    /// Live nodes with no children.
    pub leaf_nodes: u32,
    /// Shallowest leaf, in edges from the root.
    pub min_leaf_depth: u32,
    /// Deepest leaf, in edges from the root.
    pub max_leaf_depth: u32,
}

/// The AVL tree over one arena: root offset, live count, storage.
///
/// Comparator-free by itself; ordering is passed into each operation so
/// that the public container can own the comparator instance.
pub(crate) struct AvlTree<T: Pod> {
    arena: Arena,
    /// Offset of the root node, or 0 when the tree is empty.
    root: u32,
    /// Live element count.
    len: u32,
    /// The arena stores T only as bytes; tie the payload type back in so
    /// auto traits see it.
    _marker: PhantomData<T>,
}

impl<T: Pod> AvlTree<T> {
    const NODE: u32 = Node::<T>::SIZE;

    const _ALIGN_OK: () = assert!(
        align_of::<Node<T>>() <= ARENA_ALIGN,
        "payload alignment exceeds the arena alignment"
    );

    pub(crate) fn new() -> Self {
        let _ = Self::_ALIGN_OK;
        let _ = T::_ASSERT_NO_DROP;
        Self {
            arena: Arena::new(),
            root: 0,
            len: 0,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub(crate) fn root(&self) -> u32 {
        self.root
    }

    #[inline]
    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Ensures room for the sentinel plus `elements` nodes.
    pub(crate) fn reserve(&mut self, elements: u32) -> Result<(), OutOfMemory> {
        let total = (elements as u64 + 1) * Self::NODE as u64;
        if total > MAX_CAPACITY as u64 {
            return Err(OutOfMemory);
        }
        self.arena.reserve(total as u32)
    }

    pub(crate) fn clear(&mut self) {
        // Pod payloads carry no drop glue, so releasing the buffer is the
        // whole teardown.
        self.root = 0;
        self.len = 0;
        self.arena.reset();
    }

    // -------------------------------------------------------------------------
    // Record access
    // -------------------------------------------------------------------------

    #[inline]
    fn node(&self, at: u32) -> &Node<T> {
        debug_assert!(
            at % Self::NODE == 0 && at + Self::NODE <= self.arena.len(),
            "node offset out of range"
        );
        // Safety: `at` names a whole record inside the initialized region,
        // and the arena base satisfies Node<T>'s alignment (checked at
        // construction against ARENA_ALIGN).
        unsafe { &*(self.arena.as_ptr().add(at as usize) as *const Node<T>) }
    }

    #[inline]
    fn node_mut(&mut self, at: u32) -> &mut Node<T> {
        debug_assert!(
            at % Self::NODE == 0 && at + Self::NODE <= self.arena.len(),
            "node offset out of range"
        );
        // Safety: as in `node`, and &mut self guarantees exclusivity.
        unsafe { &mut *(self.arena.as_mut_ptr().add(at as usize) as *mut Node<T>) }
    }

    /// Payload of a live node.
    #[inline]
    pub(crate) fn payload(&self, at: u32) -> &T {
        let node = self.node(at);
        debug_assert!(!node.is_empty(), "payload read from a decommissioned node");
        // Safety: live nodes always hold an initialized payload.
        unsafe { node.payload.assume_init_ref() }
    }

    /// Whether `at` names a live record. Offset 0 (the sentinel) is not.
    #[inline]
    pub(crate) fn is_live(&self, at: u32) -> bool {
        at != 0
            && at % Self::NODE == 0
            && at + Self::NODE <= self.arena.len()
            && !self.node(at).is_empty()
    }

    #[inline]
    fn parent(&self, at: u32) -> i32 {
        self.node(at).parent
    }

    #[inline]
    fn left(&self, at: u32) -> i32 {
        self.node(at).left
    }

    #[inline]
    fn right(&self, at: u32) -> i32 {
        self.node(at).right
    }

    #[inline]
    fn tilt(&self, at: u32) -> Tilt {
        self.node(at).tilt
    }

    #[inline]
    fn child(&self, at: u32, side: Side) -> i32 {
        self.node(at).link(side)
    }

    #[inline]
    fn set_parent(&mut self, at: u32, link: i32) {
        self.node_mut(at).parent = link;
    }

    #[inline]
    fn set_left(&mut self, at: u32, link: i32) {
        self.node_mut(at).left = link;
    }

    #[inline]
    fn set_right(&mut self, at: u32, link: i32) {
        self.node_mut(at).right = link;
    }

    #[inline]
    fn set_child(&mut self, at: u32, side: Side, link: i32) {
        self.node_mut(at).set_link(side, link);
    }

    #[inline]
    fn set_tilt(&mut self, at: u32, tilt: Tilt) {
        self.node_mut(at).tilt = tilt;
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Which side of its parent `at` hangs on; `None` for the root.
    #[inline]
    fn branch(&self, at: u32) -> Option<Side> {
        let up = self.parent(at);
        if up == 0 {
            return None;
        }
        let parent = step(at, up);
        if self.left(parent) == -up {
            Some(Side::Left)
        } else {
            Some(Side::Right)
        }
    }

    /// Climbs parent links until the root.
    fn root_from(&self, mut at: u32) -> u32 {
        while self.parent(at) != 0 {
            at = step(at, self.parent(at));
        }
        at
    }

    pub(crate) fn leftmost(&self, mut at: u32) -> u32 {
        while self.left(at) != 0 {
            at = step(at, self.left(at));
        }
        at
    }

    /// The next node in key order, or 0 past the maximum.
    pub(crate) fn inorder_next(&self, mut at: u32) -> u32 {
        if self.right(at) != 0 {
            return self.leftmost(step(at, self.right(at)));
        }
        // Climb until we arrive at a parent from its left side.
        loop {
            match self.branch(at) {
                None => return 0,
                Some(Side::Left) => return step(at, self.parent(at)),
                Some(Side::Right) => at = step(at, self.parent(at)),
            }
        }
    }

    /// Walks the comparison path for `value`.
    ///
    /// Returns the last node visited and the side a new node would be
    /// attached on, or `None` for the side when an equivalent element
    /// already sits at the returned offset. The tree must not be empty.
    fn locate<C: Compare<T>>(&self, cmp: &C, value: &T) -> (u32, Option<Side>) {
        debug_assert!(self.root != 0);
        let mut at = self.root;
        loop {
            if cmp.less(self.payload(at), value) {
                if self.right(at) != 0 {
                    at = step(at, self.right(at));
                } else {
                    return (at, Some(Side::Right));
                }
            } else if cmp.less(value, self.payload(at)) {
                if self.left(at) != 0 {
                    at = step(at, self.left(at));
                } else {
                    return (at, Some(Side::Left));
                }
            } else {
                return (at, None);
            }
        }
    }

    /// Offset of the node equivalent to `value`, or 0.
    pub(crate) fn find<C: Compare<T>>(&self, cmp: &C, value: &T) -> u32 {
        if self.root == 0 {
            return 0;
        }
        match self.locate(cmp, value) {
            (at, None) => at,
            _ => 0,
        }
    }

    // -------------------------------------------------------------------------
    // Insertion
    // -------------------------------------------------------------------------

    /// Inserts `value`, returning its node offset and whether a new node
    /// was created. On `Err` the tree is unchanged.
    pub(crate) fn insert<C: Compare<T>>(
        &mut self,
        cmp: &C,
        value: T,
    ) -> Result<(u32, bool), OutOfMemory> {
        if self.arena.is_empty() {
            // The sentinel head occupies slot 0 once, before any element.
            self.arena.append_zero(Self::NODE)?;
        }

        if self.root == 0 {
            let at = self.acquire(value)?;
            self.root = at;
            self.len += 1;
            return Ok((at, true));
        }

        let (parent, side) = self.locate(cmp, &value);
        let Some(side) = side else {
            // Equivalent element already present.
            return Ok((parent, false));
        };

        let at = self.acquire(value)?;
        self.set_child(parent, side, off(parent, at));
        self.set_parent(at, off(at, parent));
        self.retrace_insert(parent, side);

        // A rotation at the old root displaces it by exactly one hop; its
        // parent link then leads to the new root.
        if self.parent(self.root) != 0 {
            self.root = step(self.root, self.parent(self.root));
        }

        self.len += 1;
        Ok((at, true))
    }

    /// Produces a fresh live node holding `value`: recycles the most
    /// recently decommissioned record if one exists, otherwise appends
    /// zeroed bytes.
    fn acquire(&mut self, value: T) -> Result<u32, OutOfMemory> {
        let head_link = self.right(0);
        let at = if head_link != 0 {
            let at = step(0, head_link);
            let next = self.right(at);
            // Dequeue: the sentinel skips over the head to its successor.
            self.set_right(0, if next != 0 { head_link + next } else { 0 });
            self.set_right(at, 0);
            at
        } else {
            self.arena.append_zero(Self::NODE)?
        };

        let node = self.node_mut(at);
        node.tilt = Tilt::Even;
        node.payload = MaybeUninit::new(value);
        Ok(at)
    }

    /// Walks upward from `at` after its `grown` side gained one level.
    fn retrace_insert(&mut self, mut at: u32, mut grown: Side) {
        loop {
            match self.tilt(at) {
                Tilt::Even => {
                    self.set_tilt(at, grown.tilt());
                    match self.branch(at) {
                        Some(side) => {
                            grown = side;
                            at = step(at, self.parent(at));
                        }
                        None => break,
                    }
                }
                tilt => {
                    if tilt == grown.tilt() {
                        // Same side grew twice: height 2 imbalance.
                        self.rotate_insert(at);
                    } else {
                        // Counterbalanced; height above is unchanged.
                        self.set_tilt(at, Tilt::Even);
                    }
                    break;
                }
            }
        }
    }

    /// Rotates the imbalanced node `z` after an insertion. The rotated
    /// subtree returns to its pre-insertion height, so retrace stops here.
    fn rotate_insert(&mut self, z: u32) {
        let z_side = self.tilt(z).side().expect("rotation on a balanced node");
        let y = step(z, self.child(z, z_side));
        let y_side = self.tilt(y).side().expect("heavy child is balanced");

        match (z_side, y_side) {
            (Side::Left, Side::Left) => {
                self.rotate_ll(z, y);
                self.set_tilt(z, Tilt::Even);
                self.set_tilt(y, Tilt::Even);
            }
            (Side::Right, Side::Right) => {
                self.rotate_rr(z, y);
                self.set_tilt(z, Tilt::Even);
                self.set_tilt(y, Tilt::Even);
            }
            (Side::Left, Side::Right) => {
                let x = step(y, self.right(y));
                let x_tilt = self.tilt(x);
                self.rotate_lr(z, y, x);
                self.set_tilt(y, if x_tilt == Tilt::Right { Tilt::Left } else { Tilt::Even });
                self.set_tilt(z, if x_tilt == Tilt::Left { Tilt::Right } else { Tilt::Even });
                self.set_tilt(x, Tilt::Even);
            }
            (Side::Right, Side::Left) => {
                let x = step(y, self.left(y));
                let x_tilt = self.tilt(x);
                self.rotate_rl(z, y, x);
                self.set_tilt(y, if x_tilt == Tilt::Left { Tilt::Right } else { Tilt::Even });
                self.set_tilt(z, if x_tilt == Tilt::Right { Tilt::Left } else { Tilt::Even });
                self.set_tilt(x, Tilt::Even);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Rotations (link rewiring only; tilt is fixed up by the caller)
    // -------------------------------------------------------------------------

    /// Single right rotation: `z` left-heavy, `y` its left child. `y`
    /// takes `z`'s position, `z` becomes `y`'s right child, and `y`'s
    /// former right subtree moves under `z` on the left.
    fn rotate_ll(&mut self, z: u32, y: u32) {
        let zp = self.parent(z);
        let zl = self.left(z);

        if zp != 0 {
            let p = step(z, zp);
            // y inherits z's parent; p's link to z now reaches one node deeper.
            self.set_parent(y, self.parent(y) + zp);
            if self.left(p) == -zp {
                let link = self.left(p);
                self.set_left(p, link + zl);
            } else {
                let link = self.right(p);
                self.set_right(p, link + zl);
            }
        } else {
            self.set_parent(y, 0);
        }

        self.set_parent(z, zl);

        let yr = self.right(y);
        if yr != 0 {
            let link = zl + yr;
            self.set_left(z, link);
            let t2 = step(z, link);
            self.set_parent(t2, -link);
        } else {
            self.set_left(z, 0);
        }

        self.set_right(y, -zl);
    }

    /// Single left rotation; mirror of [`rotate_ll`](Self::rotate_ll).
    fn rotate_rr(&mut self, z: u32, y: u32) {
        let zp = self.parent(z);
        let zr = self.right(z);

        if zp != 0 {
            let p = step(z, zp);
            self.set_parent(y, self.parent(y) + zp);
            if self.left(p) == -zp {
                let link = self.left(p);
                self.set_left(p, link + zr);
            } else {
                let link = self.right(p);
                self.set_right(p, link + zr);
            }
        } else {
            self.set_parent(y, 0);
        }

        self.set_parent(z, zr);

        let yl = self.left(y);
        if yl != 0 {
            let link = zr + yl;
            self.set_right(z, link);
            let t2 = step(z, link);
            self.set_parent(t2, -link);
        } else {
            self.set_right(z, 0);
        }

        self.set_left(y, -zr);
    }

    /// Double rotation: `z` left-heavy, `y` right-heavy, pivot `x`. `x`
    /// takes `z`'s position with `y` and `z` as its children; `x`'s former
    /// subtrees split between them.
    fn rotate_lr(&mut self, z: u32, y: u32, x: u32) {
        let zp = self.parent(z);
        if zp != 0 {
            let p = step(z, zp);
            if self.left(p) == -zp {
                self.set_left(p, off(p, x));
            } else {
                self.set_right(p, off(p, x));
            }
            self.set_parent(x, off(x, p));
        } else {
            self.set_parent(x, 0);
        }

        self.set_parent(z, off(z, x));
        let xr = self.right(x);
        if xr != 0 {
            let link = off(z, x) + xr;
            self.set_left(z, link);
            let t = step(z, link);
            self.set_parent(t, -link);
        } else {
            self.set_left(z, 0);
        }

        let yx = self.right(y);
        self.set_parent(y, yx);
        let xl = self.left(x);
        if xl != 0 {
            let link = yx + xl;
            self.set_right(y, link);
            let t = step(y, link);
            self.set_parent(t, -link);
        } else {
            self.set_right(y, 0);
        }

        self.set_right(x, off(x, z));
        self.set_left(x, off(x, y));
    }

    /// Double rotation; mirror of [`rotate_lr`](Self::rotate_lr).
    fn rotate_rl(&mut self, z: u32, y: u32, x: u32) {
        let zp = self.parent(z);
        if zp != 0 {
            let p = step(z, zp);
            if self.left(p) == -zp {
                self.set_left(p, off(p, x));
            } else {
                self.set_right(p, off(p, x));
            }
            self.set_parent(x, off(x, p));
        } else {
            self.set_parent(x, 0);
        }

        self.set_parent(z, off(z, x));
        let xl = self.left(x);
        if xl != 0 {
            let link = off(z, x) + xl;
            self.set_right(z, link);
            let t = step(z, link);
            self.set_parent(t, -link);
        } else {
            self.set_right(z, 0);
        }

        let yx = self.left(y);
        self.set_parent(y, yx);
        let xr = self.right(x);
        if xr != 0 {
            let link = yx + xr;
            self.set_left(y, link);
            let t = step(y, link);
            self.set_parent(t, -link);
        } else {
            self.set_left(y, 0);
        }

        self.set_right(x, off(x, y));
        self.set_left(x, off(x, z));
    }

    // -------------------------------------------------------------------------
    // Erase
    // -------------------------------------------------------------------------

    /// Erases the node at `at`, if it is live. Returns the payload.
    pub(crate) fn erase_at(&mut self, at: u32) -> Option<T> {
        if !self.is_live(at) {
            return None;
        }
        // Safety: live node, checked above.
        let value = unsafe { self.node(at).payload.assume_init_read() };
        self.unlink(at);
        self.decommission(at);
        self.len -= 1;
        Some(value)
    }

    /// Detaches the live node at `at` from the tree and rebalances.
    fn unlink(&mut self, at: u32) {
        // A node with two children first trades places with its in-order
        // neighbor on the heavy side, which has at most one child; the
        // splice below then only ever removes a node with 0 or 1 children.
        if self.left(at) != 0 && self.right(at) != 0 {
            let swap = if self.tilt(at) == Tilt::Right {
                let mut s = step(at, self.right(at));
                while self.left(s) != 0 {
                    s = step(s, self.left(s));
                }
                s
            } else {
                let mut s = step(at, self.left(at));
                while self.right(s) != 0 {
                    s = step(s, self.right(s));
                }
                s
            };
            self.swap_with(at, swap);
        }

        let up = self.parent(at);
        let l = self.left(at);
        let r = self.right(at);
        debug_assert!(l == 0 || r == 0, "splice target still has two children");

        if up != 0 {
            let p = step(at, up);
            let side = if self.left(p) == -up { Side::Left } else { Side::Right };
            let child = if l != 0 { l } else { r };
            if child != 0 {
                let c = step(at, child);
                self.set_parent(c, off(c, p));
                self.set_child(p, side, off(p, c));
            } else {
                self.set_child(p, side, 0);
            }
            self.retrace_erase(p, side);
            self.root = self.root_from(p);
        } else if l != 0 {
            let c = step(at, l);
            self.set_parent(c, 0);
            self.root = c;
        } else if r != 0 {
            let c = step(at, r);
            self.set_parent(c, 0);
            self.root = c;
        } else {
            self.root = 0;
        }

        let node = self.node_mut(at);
        node.parent = 0;
        node.left = 0;
        node.right = 0;
    }

    /// Exchanges the tree positions of `a` (which has two children) and
    /// `b`, its in-order neighbor (0 or 1 children, never `a`'s ancestor).
    /// Payloads stay with their records, so slots stay stable; only links
    /// and tilts move.
    fn swap_with(&mut self, a: u32, b: u32) {
        let ap = self.parent(a);
        let al_link = self.left(a);
        let ar_link = self.right(a);
        let al = step(a, al_link);
        let ar = step(a, ar_link);

        if b == al {
            // b is a's own left child; as the in-order predecessor it may
            // carry a left subtree but never a right one.
            if ap != 0 {
                let p = step(a, ap);
                if self.left(p) == -ap {
                    self.set_left(p, off(p, b));
                } else {
                    self.set_right(p, off(p, b));
                }
                self.set_parent(b, off(b, p));
            } else {
                self.set_parent(b, 0);
            }

            self.set_parent(a, al_link);

            let bl = self.left(b);
            if bl != 0 {
                let c = step(b, bl);
                self.set_parent(c, off(c, a));
                self.set_left(a, off(a, c));
            } else {
                self.set_left(a, 0);
            }

            self.set_parent(ar, off(ar, b));
            self.set_left(b, off(b, a));
            self.set_right(b, off(b, ar));
            self.set_right(a, 0);
        } else if b == ar {
            // Mirror: b is a's own right child, the in-order successor.
            if ap != 0 {
                let p = step(a, ap);
                if self.left(p) == -ap {
                    self.set_left(p, off(p, b));
                } else {
                    self.set_right(p, off(p, b));
                }
                self.set_parent(b, off(b, p));
            } else {
                self.set_parent(b, 0);
            }

            self.set_parent(a, ar_link);

            let br = self.right(b);
            if br != 0 {
                let c = step(b, br);
                self.set_parent(c, off(c, a));
                self.set_right(a, off(a, c));
            } else {
                self.set_right(a, 0);
            }

            self.set_parent(al, off(al, b));
            self.set_right(b, off(b, a));
            self.set_left(b, off(b, al));
            self.set_left(a, 0);
        } else {
            // Unrelated positions; links can be rewired in any order.
            let bp = self.parent(b);
            let pb = step(b, bp);
            if self.left(pb) == -bp {
                self.set_left(pb, off(pb, a));
            } else {
                self.set_right(pb, off(pb, a));
            }

            if ap != 0 {
                let pa = step(a, ap);
                if self.left(pa) == -ap {
                    self.set_left(pa, off(pa, b));
                } else {
                    self.set_right(pa, off(pa, b));
                }
                self.set_parent(b, off(b, pa));
            } else {
                self.set_parent(b, 0);
            }

            self.set_parent(a, off(a, pb));

            self.set_parent(al, off(al, b));
            let bl = self.left(b);
            if bl != 0 {
                let c = step(b, bl);
                self.set_parent(c, off(c, a));
                self.set_left(a, off(a, c));
            } else {
                self.set_left(a, 0);
            }
            self.set_left(b, off(b, al));

            self.set_parent(ar, off(ar, b));
            let br = self.right(b);
            if br != 0 {
                let c = step(b, br);
                self.set_parent(c, off(c, a));
                self.set_right(a, off(a, c));
            } else {
                self.set_right(a, 0);
            }
            self.set_right(b, off(b, ar));
        }

        let ta = self.tilt(a);
        let tb = self.tilt(b);
        self.set_tilt(a, tb);
        self.set_tilt(b, ta);
    }

    /// Walks upward from `at` after its `shrunk` side lost one level.
    /// Unlike the insert retrace, this may rotate at several ancestors.
    fn retrace_erase(&mut self, mut at: u32, mut shrunk: Side) {
        loop {
            let tilt = self.tilt(at);
            if tilt == Tilt::Even {
                // Losing a level on one side of a balanced node does not
                // change the height seen from above.
                self.set_tilt(at, shrunk.opposite().tilt());
                break;
            } else if tilt == shrunk.tilt() {
                self.set_tilt(at, Tilt::Even);
                // This subtree got shorter; keep climbing.
            } else {
                let sub = self.rotate_erase(at);
                if sub == 0 {
                    break;
                }
                at = sub;
            }

            match self.branch(at) {
                Some(side) => {
                    shrunk = side;
                    at = step(at, self.parent(at));
                }
                None => break,
            }
        }
    }

    /// Rotates the imbalanced node `z` during an erase retrace.
    ///
    /// Returns the offset of the subtree's new root when the subtree also
    /// got shorter (retrace continues from there), or 0 when its height is
    /// unchanged (retrace stops).
    ///
    /// When `y` is balanced, `x` is deliberately taken on `z`'s heavy side
    /// so the straight (LL/RR) shape applies; that shape keeps the subtree
    /// height and ends the retrace in one step. The skew shapes would also
    /// be correct but keep walking.
    fn rotate_erase(&mut self, z: u32) -> u32 {
        let z_side = self.tilt(z).side().expect("rotation on a balanced node");
        let y = step(z, self.child(z, z_side));
        let y_even = self.tilt(y) == Tilt::Even;
        let x_side = if y_even {
            z_side
        } else {
            self.tilt(y).side().expect("unbalanced tilt without side")
        };

        match (z_side, x_side) {
            (Side::Left, Side::Left) => {
                self.rotate_ll(z, y);
                if y_even {
                    // y picks up z as an extra right level; z and x keep
                    // their tilt and the subtree height is unchanged.
                    self.set_tilt(y, Tilt::Right);
                    0
                } else {
                    self.set_tilt(z, Tilt::Even);
                    self.set_tilt(y, Tilt::Even);
                    y
                }
            }
            (Side::Right, Side::Right) => {
                self.rotate_rr(z, y);
                if y_even {
                    self.set_tilt(y, Tilt::Left);
                    0
                } else {
                    self.set_tilt(z, Tilt::Even);
                    self.set_tilt(y, Tilt::Even);
                    y
                }
            }
            (Side::Left, Side::Right) => {
                let x = step(y, self.right(y));
                let x_tilt = self.tilt(x);
                self.rotate_lr(z, y, x);
                self.set_tilt(y, if x_tilt == Tilt::Right { Tilt::Left } else { Tilt::Even });
                self.set_tilt(z, if x_tilt == Tilt::Left { Tilt::Right } else { Tilt::Even });
                self.set_tilt(x, Tilt::Even);
                x
            }
            (Side::Right, Side::Left) => {
                let x = step(y, self.left(y));
                let x_tilt = self.tilt(x);
                self.rotate_rl(z, y, x);
                self.set_tilt(y, if x_tilt == Tilt::Left { Tilt::Right } else { Tilt::Even });
                self.set_tilt(z, if x_tilt == Tilt::Right { Tilt::Left } else { Tilt::Even });
                self.set_tilt(x, Tilt::Even);
                x
            }
        }
    }

    /// Zeroizes the detached record at `at` and pushes it onto the
    /// sentinel's free list.
    fn decommission(&mut self, at: u32) {
        let head = self.right(0);
        let node = self.node_mut(at);
        node.payload = MaybeUninit::zeroed();
        node.parent = 0;
        node.left = 0;
        node.tilt = Tilt::Empty;
        // LIFO push: this record's right link leads to the previous head.
        node.right = if head != 0 { off(at, 0) + head } else { 0 };
        self.set_right(0, off(0, at));
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub(crate) fn stats(&self) -> Stats {
        let mut stats = Stats {
            allocated_bytes: self.arena.capacity(),
            used_bytes: self.arena.len(),
            reallocs: self.arena.reallocs(),
            live_nodes: 0,
            free_nodes: 0,
            leaf_nodes: 0,
            min_leaf_depth: 0,
            max_leaf_depth: 0,
        };

        if self.root != 0 {
            self.measure(self.root, 0, &mut stats);
        }

        let mut cur = 0u32;
        let mut link = if self.arena.is_empty() { 0 } else { self.right(0) };
        while link != 0 {
            cur = step(cur, link);
            stats.free_nodes += 1;
            link = self.right(cur);
        }

        stats
    }

    fn measure(&self, at: u32, depth: u32, stats: &mut Stats) {
        stats.live_nodes += 1;
        let l = self.left(at);
        let r = self.right(at);
        if l == 0 && r == 0 {
            if stats.leaf_nodes == 0 {
                stats.min_leaf_depth = depth;
                stats.max_leaf_depth = depth;
            } else {
                stats.min_leaf_depth = stats.min_leaf_depth.min(depth);
                stats.max_leaf_depth = stats.max_leaf_depth.max(depth);
            }
            stats.leaf_nodes += 1;
        }
        if l != 0 {
            self.measure(step(at, l), depth + 1, stats);
        }
        if r != 0 {
            self.measure(step(at, r), depth + 1, stats);
        }
    }

    /// Verifies every structural invariant of the container. Used by the
    /// randomized tests; not part of any hot path.
    pub(crate) fn check_invariants<C: Compare<T>>(&self, cmp: &C) -> Result<(), &'static str> {
        if self.arena.is_empty() {
            return if self.root == 0 && self.len == 0 {
                Ok(())
            } else {
                Err("unallocated arena with root or count set")
            };
        }
        if self.arena.len() % Self::NODE != 0 {
            return Err("arena length is not a whole number of records");
        }

        let sentinel = self.node(0);
        if !sentinel.tilt.is_empty() || sentinel.parent != 0 || sentinel.left != 0 {
            return Err("sentinel head corrupted");
        }

        // 0 = unseen, 1 = live, 2 = free.
        let slots = (self.arena.len() / Self::NODE) as usize;
        let mut mark = vec![0u8; slots];
        mark[0] = 2;

        if self.root != 0 {
            if self.parent(self.root) != 0 {
                return Err("root carries a parent link");
            }
            self.verify_subtree(self.root, &mut mark)?;
        }

        let live = mark.iter().filter(|&&m| m == 1).count();
        if live != self.len as usize {
            return Err("live count disagrees with reachable nodes");
        }

        // Strictly increasing in-order sequence, no duplicates.
        if self.root != 0 {
            let mut at = self.leftmost(self.root);
            let mut prev: Option<&T> = None;
            while at != 0 {
                let value = self.payload(at);
                if let Some(prev) = prev {
                    if !cmp.less(prev, value) {
                        return Err("in-order sequence not strictly increasing");
                    }
                }
                prev = Some(value);
                at = self.inorder_next(at);
            }
        }

        // Free list: zeroized records, chained on `right`, disjoint from
        // the live tree.
        let mut cur = 0u32;
        let mut link = self.right(0);
        while link != 0 {
            let next = cur as i64 + link as i64;
            if next <= 0
                || next as u64 % Self::NODE as u64 != 0
                || next as u64 + Self::NODE as u64 > self.arena.len() as u64
            {
                return Err("free list link out of range");
            }
            cur = next as u32;

            let node = self.node(cur);
            if !node.tilt.is_empty() {
                return Err("free node carries a live tilt");
            }
            if node.parent != 0 || node.left != 0 {
                return Err("free node carries tree links");
            }
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    node.payload.as_ptr() as *const u8,
                    std::mem::size_of::<T>(),
                )
            };
            if bytes.iter().any(|&b| b != 0) {
                return Err("free node payload not zeroized");
            }

            let slot = (cur / Self::NODE) as usize;
            match mark[slot] {
                1 => return Err("record is both live and free"),
                2 => return Err("free list visits a record twice"),
                _ => mark[slot] = 2,
            }
            link = node.right;
        }

        if mark.iter().any(|&m| m == 0) {
            return Err("record is neither live nor free");
        }
        Ok(())
    }

    /// Checks link reciprocity, tilt accuracy, and the height bound below
    /// `at`; returns the subtree height and marks visited records.
    fn verify_subtree(&self, at: u32, mark: &mut Vec<u8>) -> Result<u32, &'static str> {
        if at == 0 || at % Self::NODE != 0 || at + Self::NODE > self.arena.len() {
            return Err("tree link out of range");
        }
        let slot = (at / Self::NODE) as usize;
        if mark[slot] != 0 {
            return Err("record reachable twice from the root");
        }
        mark[slot] = 1;

        let node = self.node(at);
        if node.tilt.is_empty() {
            return Err("decommissioned record reachable from the root");
        }

        let left_height = if node.left != 0 {
            let c = step(at, node.left);
            if self.parent(c) != -node.left {
                return Err("left child parent link not reciprocal");
            }
            self.verify_subtree(c, mark)? + 1
        } else {
            0
        };
        let right_height = if node.right != 0 {
            let c = step(at, node.right);
            if self.parent(c) != -node.right {
                return Err("right child parent link not reciprocal");
            }
            self.verify_subtree(c, mark)? + 1
        } else {
            0
        };

        let balanced = match node.tilt {
            Tilt::Even => left_height == right_height,
            Tilt::Left => left_height == right_height + 1,
            Tilt::Right => right_height == left_height + 1,
            Tilt::Empty => false,
        };
        if !balanced {
            return Err("tilt disagrees with subtree heights");
        }

        Ok(left_height.max(right_height))
    }
}

impl<T: Pod> Clone for AvlTree<T> {
    fn clone(&self) -> Self {
        // Links are relative, so the byte copy is the whole clone.
        Self {
            arena: self.arena.clone(),
            root: self.root,
            len: self.len,
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Natural;

    fn tree_of(values: &[u32]) -> AvlTree<u32> {
        let mut tree = AvlTree::new();
        for &v in values {
            tree.insert(&Natural, v).unwrap();
        }
        tree.check_invariants(&Natural).unwrap();
        tree
    }

    fn inorder(tree: &AvlTree<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        if tree.root() != 0 {
            let mut at = tree.leftmost(tree.root());
            while at != 0 {
                out.push(*tree.payload(at));
                at = tree.inorder_next(at);
            }
        }
        out
    }

    fn free_list_len(tree: &AvlTree<u32>) -> u32 {
        tree.stats().free_nodes
    }

    // ========================================================================
    // Insertion and rotation shapes
    // ========================================================================

    #[test]
    fn single_element_is_a_balanced_root() {
        let tree = tree_of(&[42]);
        let root = tree.root();
        assert_ne!(root, 0);
        assert_eq!(*tree.payload(root), 42);
        assert_eq!(tree.tilt(root), Tilt::Even);
        assert_eq!(tree.parent(root), 0);
        assert_eq!(tree.left(root), 0);
        assert_eq!(tree.right(root), 0);
    }

    #[test]
    fn ll_rotation_lifts_the_middle_key() {
        // Descending insertions lean left until the single right rotation.
        let tree = tree_of(&[3, 2, 1]);
        assert_eq!(inorder(&tree), vec![1, 2, 3]);
        assert_eq!(*tree.payload(tree.root()), 2);
        for v in 1..=3 {
            let at = tree.find(&Natural, &v);
            assert_eq!(tree.tilt(at), Tilt::Even);
        }
    }

    #[test]
    fn rr_rotation_lifts_the_middle_key() {
        let tree = tree_of(&[1, 2, 3]);
        assert_eq!(inorder(&tree), vec![1, 2, 3]);
        assert_eq!(*tree.payload(tree.root()), 2);
    }

    #[test]
    fn lr_rotation_lifts_the_pivot() {
        let tree = tree_of(&[3, 1, 2]);
        assert_eq!(inorder(&tree), vec![1, 2, 3]);
        assert_eq!(*tree.payload(tree.root()), 2);
    }

    #[test]
    fn rl_rotation_lifts_the_pivot() {
        let tree = tree_of(&[1, 3, 2]);
        assert_eq!(inorder(&tree), vec![1, 2, 3]);
        assert_eq!(*tree.payload(tree.root()), 2);
    }

    #[test]
    fn ascending_run_stays_logarithmic() {
        let tree = tree_of(&[1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(inorder(&tree), vec![1, 2, 3, 4, 5, 6, 7]);
        // Seven ascending keys settle into the perfect shape.
        assert_eq!(*tree.payload(tree.root()), 4);
        let stats = tree.stats();
        assert_eq!(stats.live_nodes, 7);
        assert_eq!(stats.leaf_nodes, 4);
        assert_eq!(stats.min_leaf_depth, 2);
        assert_eq!(stats.max_leaf_depth, 2);
    }

    #[test]
    fn duplicate_insert_returns_existing_node() {
        let mut tree = AvlTree::new();
        let (a, first) = tree.insert(&Natural, 42u32).unwrap();
        let (b, second) = tree.insert(&Natural, 42u32).unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(a, b);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn root_offset_tracks_rotations_at_the_root() {
        let mut tree = AvlTree::new();
        for v in 1..=64u32 {
            tree.insert(&Natural, v).unwrap();
            assert_eq!(tree.parent(tree.root()), 0);
        }
        tree.check_invariants(&Natural).unwrap();
    }

    // ========================================================================
    // Erase
    // ========================================================================

    #[test]
    fn erase_leaf_rebalances() {
        let mut tree = tree_of(&[2, 1, 3, 4]);
        let at = tree.find(&Natural, &1);
        assert!(tree.erase_at(at).is_some());
        tree.check_invariants(&Natural).unwrap();
        assert_eq!(inorder(&tree), vec![2, 3, 4]);
    }

    #[test]
    fn erase_node_with_one_child_splices() {
        let mut tree = tree_of(&[2, 1, 3, 4]);
        let at = tree.find(&Natural, &3);
        assert_eq!(tree.erase_at(at), Some(3));
        tree.check_invariants(&Natural).unwrap();
        assert_eq!(inorder(&tree), vec![1, 2, 4]);
    }

    #[test]
    fn erase_node_with_two_children_swaps() {
        let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);
        let at = tree.find(&Natural, &4);
        assert_eq!(tree.erase_at(at), Some(4));
        tree.check_invariants(&Natural).unwrap();
        assert_eq!(inorder(&tree), vec![1, 2, 3, 5, 6, 7]);
        assert_eq!(tree.len(), 6);
    }

    #[test]
    fn erase_root_with_immediate_child_swap() {
        // Three nodes: the root's swap partner is its own child.
        for keys in [[2u32, 1, 3], [2, 3, 1]] {
            let mut tree = tree_of(&keys);
            let at = tree.find(&Natural, &2);
            assert_eq!(tree.erase_at(at), Some(2));
            tree.check_invariants(&Natural).unwrap();
            assert_eq!(inorder(&tree), vec![1, 3]);
        }
    }

    #[test]
    fn erase_last_node_empties_the_tree() {
        let mut tree = tree_of(&[7]);
        let at = tree.find(&Natural, &7);
        assert_eq!(tree.erase_at(at), Some(7));
        assert_eq!(tree.root(), 0);
        assert_eq!(tree.len(), 0);
        tree.check_invariants(&Natural).unwrap();
    }

    #[test]
    fn erase_at_sentinel_or_dead_record_is_a_noop() {
        let mut tree = tree_of(&[1, 2, 3]);
        assert_eq!(tree.erase_at(0), None);

        let at = tree.find(&Natural, &2);
        assert_eq!(tree.erase_at(at), Some(2));
        // Same record again: now decommissioned.
        assert_eq!(tree.erase_at(at), None);
        assert_eq!(tree.len(), 2);
        tree.check_invariants(&Natural).unwrap();
    }

    #[test]
    fn erase_descending_chain_exercises_both_retraces() {
        let mut tree = tree_of(&(1..=100).collect::<Vec<u32>>());
        for v in (1..=100u32).rev() {
            let at = tree.find(&Natural, &v);
            assert_eq!(tree.erase_at(at), Some(v));
            tree.check_invariants(&Natural).unwrap();
        }
        assert_eq!(tree.root(), 0);
        assert_eq!(free_list_len(&tree), 100);
    }

    // ========================================================================
    // Free list
    // ========================================================================

    #[test]
    fn freed_records_are_recycled_lifo() {
        let mut tree = AvlTree::new();
        let (a, _) = tree.insert(&Natural, 10u32).unwrap();
        let (b, _) = tree.insert(&Natural, 20u32).unwrap();
        let (c, _) = tree.insert(&Natural, 30u32).unwrap();

        tree.erase_at(b);
        assert_eq!(free_list_len(&tree), 1);

        // The freshest hole is reused first.
        let (d, inserted) = tree.insert(&Natural, 25u32).unwrap();
        assert!(inserted);
        assert_eq!(d, b);
        assert_eq!(free_list_len(&tree), 0);

        assert_eq!(*tree.payload(a), 10);
        assert_eq!(*tree.payload(c), 30);
        tree.check_invariants(&Natural).unwrap();
    }

    #[test]
    fn free_list_chains_several_records() {
        let mut tree = tree_of(&[1, 2, 3, 4, 5]);
        for v in [2u32, 4, 1] {
            let at = tree.find(&Natural, &v);
            tree.erase_at(at);
        }
        assert_eq!(free_list_len(&tree), 3);
        tree.check_invariants(&Natural).unwrap();

        // Refill reuses all three holes before the arena grows again.
        let used = tree.arena().len();
        for v in [10u32, 11, 12] {
            tree.insert(&Natural, v).unwrap();
        }
        assert_eq!(tree.arena().len(), used);
        assert_eq!(free_list_len(&tree), 0);
        tree.check_invariants(&Natural).unwrap();
    }

    // ========================================================================
    // Growth
    // ========================================================================

    #[test]
    fn growth_during_insert_keeps_the_tree_coherent() {
        let mut tree = AvlTree::new();
        tree.reserve(1).unwrap();
        let reallocs = tree.arena().reallocs();

        for v in 0..256u32 {
            tree.insert(&Natural, v).unwrap();
        }
        assert!(tree.arena().reallocs() > reallocs);
        tree.check_invariants(&Natural).unwrap();
        assert_eq!(inorder(&tree), (0..256).collect::<Vec<u32>>());
    }

    #[test]
    fn reserve_sizes_for_sentinel_plus_elements() {
        let mut tree: AvlTree<u32> = AvlTree::new();
        tree.reserve(100).unwrap();
        assert!(tree.arena().capacity() >= 101 * Node::<u32>::SIZE);

        let reallocs = tree.arena().reallocs();
        for v in 0..100u32 {
            tree.insert(&Natural, v).unwrap();
        }
        assert_eq!(tree.arena().reallocs(), reallocs);
    }

    #[test]
    fn clear_releases_everything() {
        let mut tree = tree_of(&[5, 3, 8, 1]);
        tree.clear();
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.root(), 0);
        assert_eq!(tree.arena().capacity(), 0);
        tree.check_invariants(&Natural).unwrap();

        // Still usable afterwards.
        tree.insert(&Natural, 9u32).unwrap();
        assert_eq!(inorder(&tree), vec![9]);
    }

    // ========================================================================
    // Clone
    // ========================================================================

    #[test]
    fn clone_preserves_structure_and_slots() {
        let mut tree = tree_of(&[8, 3, 11, 1, 5, 9, 14]);
        let at = tree.find(&Natural, &9);
        tree.erase_at(at);

        let copy = tree.clone();
        copy.check_invariants(&Natural).unwrap();
        assert_eq!(inorder(&copy), inorder(&tree));
        assert_eq!(copy.len(), tree.len());
        assert_eq!(copy.root(), tree.root());
        assert_eq!(free_list_len(&copy), free_list_len(&tree));
    }
}
