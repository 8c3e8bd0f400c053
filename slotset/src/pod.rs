//! Marker trait for payloads the container may relocate by raw byte copy.

/// Marker trait for types that can live inside the node arena.
///
/// When the arena grows, every node is moved with a single `memcpy`; no
/// per-element hook runs. Decommissioned nodes are zeroized in place.
/// Payload types must tolerate both.
///
/// # Safety
///
/// Implementor guarantees:
///
/// 1. **No owned resources**: no `Vec`, `String`, `Box`, `File`, locks.
/// 2. **No drop glue**: `std::mem::needs_drop::<Self>()` returns false.
/// 3. **Byte-copyable**: safe to relocate with `memcpy` and to duplicate
///    when the whole container is cloned byte for byte.
///
/// Essentially: the type could be `Copy`. Any `Copy` type already
/// implements this trait through the blanket impl.
///
/// # Example
///
/// ```
/// use slotset::Pod;
///
/// #[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
/// #[repr(C)]
/// struct Point {
///     x: i32,
///     y: i32,
///     z: i32,
/// }
///
/// // SAFETY: three plain integers, no heap, no drop glue.
/// unsafe impl Pod for Point {}
/// ```
pub unsafe trait Pod: Sized {
    #[doc(hidden)]
    const _ASSERT_NO_DROP: () = {
        assert!(
            !std::mem::needs_drop::<Self>(),
            "Pod types must not require drop"
        );
    };
}

// Any Copy type is Pod.
unsafe impl<T: Copy> Pod for T {}
