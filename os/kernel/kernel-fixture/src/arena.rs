//! # Stack Arena
//!
//! Backing storage for the boot stack. The bootloader loads `RSP` with the
//! arena's top; the stack grows down from there.

use core::cell::UnsafeCell;
use kernel_stivale2::StackRegion;

/// A page-aligned, zero-initialized region of `N` bytes.
///
/// The interior mutability keeps the arena in a writable, zero-filled
/// section (`.bss`) even though it is declared as an immutable `static`.
#[repr(C, align(4096))]
pub struct StackArena<const N: usize>(UnsafeCell<[u8; N]>);

// SAFETY: Rust code never accesses the contents; only the processor writes
// to it through RSP after the bootloader hands over control.
unsafe impl<const N: usize> Sync for StackArena<N> {}

impl<const N: usize> StackArena<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self(UnsafeCell::new([0; N]))
    }

    /// Lowest address of the arena.
    #[must_use]
    pub const fn base(&self) -> *const u8 {
        self.0.get().cast_const().cast()
    }

    /// One past the highest address: the initial stack pointer.
    #[must_use]
    pub const fn top(&self) -> *const u8 {
        self.base().wrapping_add(N)
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        N
    }

    /// The arena as plain addresses, for validation.
    #[must_use]
    pub fn region(&self) -> StackRegion {
        StackRegion::new(self.base().expose_provenance() as u64, N as u64)
    }
}

impl<const N: usize> Default for StackArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_is_base_plus_size() {
        let arena = Box::new(StackArena::<8192>::new());
        assert_eq!(arena.top().addr() - arena.base().addr(), 8192);
        assert_eq!(arena.size(), 8192);

        let region = arena.region();
        assert_eq!(region.top(), Some(arena.top().addr() as u64));
    }

    #[test]
    fn base_is_page_aligned() {
        let arena = Box::new(StackArena::<4096>::default());
        assert!(arena.base().addr().is_multiple_of(4096));
    }
}
