//! # stivale2 Header

use crate::tags::TagHeader;
use crate::validate::HeaderError;
use core::mem::{offset_of, size_of};
use core::ptr;

/// Name of the ELF section the bootloader scans for the header.
pub const HEADER_SECTION: &str = ".stivale2hdr";

/// The header a kernel image publishes to the bootloader.
///
/// The bootloader locates it through the [`HEADER_SECTION`] and requires the
/// section to be exactly the size of this structure.
///
/// # Layout
/// ```text
/// 0x00  entry_point  u64   alternative entry point, 0 = ELF entry
/// 0x08  stack        u64   initial stack pointer, 16-byte aligned
/// 0x10  flags        u64   see HeaderFlags
/// 0x18  tags         u64   first header tag, 0 = none
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Stivale2Header {
    entry_point: u64,
    stack: *const u8,
    flags: HeaderFlags,
    tags: *const TagHeader,
}

// SAFETY: The header is built at compile time and never mutated; the pointers
// it carries are only ever read (by the bootloader, or by validation code).
#[allow(unsafe_code)]
unsafe impl Sync for Stivale2Header {}

const _: () = {
    assert!(size_of::<Stivale2Header>() == 32);
    assert!(offset_of!(Stivale2Header, entry_point) == 0x00);
    assert!(offset_of!(Stivale2Header, stack) == 0x08);
    assert!(offset_of!(Stivale2Header, flags) == 0x10);
    assert!(offset_of!(Stivale2Header, tags) == 0x18);
};

impl Stivale2Header {
    /// An empty header: ELF entry point, no stack, no flags, no tags.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entry_point: 0,
            stack: ptr::null(),
            flags: HeaderFlags::new(),
            tags: ptr::null(),
        }
    }

    /// Overrides the ELF entry point. Zero keeps the ELF entry.
    #[must_use]
    pub const fn with_entry_point(mut self, entry_point: u64) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Sets the initial stack pointer (the high end of the stack).
    #[must_use]
    pub const fn with_stack(mut self, stack_top: *const u8) -> Self {
        self.stack = stack_top;
        self
    }

    /// Replaces the requested behaviors.
    #[must_use]
    pub const fn with_flags(mut self, flags: HeaderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the head of the header tag list. A null pointer requests nothing.
    #[must_use]
    pub const fn with_tags(mut self, tags: *const TagHeader) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub const fn entry_point(&self) -> u64 {
        self.entry_point
    }

    #[must_use]
    pub const fn stack(&self) -> *const u8 {
        self.stack
    }

    #[must_use]
    pub const fn flags(&self) -> HeaderFlags {
        self.flags
    }

    #[must_use]
    pub const fn tags(&self) -> *const TagHeader {
        self.tags
    }

    /// The header as the bootloader reads it: plain 64-bit words.
    ///
    /// Exposes the provenance of both pointers so the addresses can be
    /// followed again when walking the contract in place.
    #[must_use]
    pub fn to_raw(&self) -> RawHeader {
        RawHeader {
            entry_point: self.entry_point,
            stack: self.stack.expose_provenance() as u64,
            flags: self.flags,
            tags: self.tags.expose_provenance() as u64,
        }
    }
}

impl Default for Stivale2Header {
    fn default() -> Self {
        Self::new()
    }
}

/// Behaviors requested from the bootloader.
///
/// Layout (LSB→MSB):
/// - bit 0: reserved
/// - bit 1: return pointers in the higher half
/// - bit 2: enforce ELF segment permissions (protected memory ranges)
/// - bit 3: fully virtual kernel mappings
/// - bits 4..63: reserved, must be zero
#[bitfield_struct::bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct HeaderFlags {
    #[bits(1)]
    __: bool,
    #[bits(1)]
    pub higher_half_pointers: bool,
    #[bits(1)]
    pub protected_memory_ranges: bool,
    #[bits(1)]
    pub fully_virtual_mappings: bool,
    #[bits(60)]
    __: u64,
}

impl HeaderFlags {
    /// Bits that carry no defined meaning and must be zero.
    pub const RESERVED_MASK: u64 = !0b1110;

    /// Returns the reserved bits that are set, if any.
    #[must_use]
    pub const fn reserved_bits(self) -> u64 {
        self.into_bits() & Self::RESERVED_MASK
    }
}

/// A header decoded from raw bytes, e.g. the `.stivale2hdr` section of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub entry_point: u64,
    pub stack: u64,
    pub flags: HeaderFlags,
    pub tags: u64,
}

impl RawHeader {
    /// Size of the header on the wire.
    pub const SIZE: usize = size_of::<Stivale2Header>();

    /// Decodes a little-endian header blob.
    ///
    /// # Errors
    /// [`HeaderError::SizeMismatch`] unless `bytes` is exactly [`Self::SIZE`] long;
    /// a section that is smaller or larger than the header is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        let Ok(words) = <&[u8; Self::SIZE]>::try_from(bytes) else {
            return Err(HeaderError::SizeMismatch {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        };

        let word = |index: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&words[index * 8..index * 8 + 8]);
            u64::from_le_bytes(buf)
        };

        Ok(Self {
            entry_point: word(0),
            stack: word(1),
            flags: HeaderFlags::from_bits(word(2)),
            tags: word(3),
        })
    }

    /// Encodes the header as the bootloader expects it in memory.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let words = [
            self.entry_point,
            self.stack,
            self.flags.into_bits(),
            self.tags,
        ];
        for (chunk, word) in out.chunks_exact_mut(8).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}
