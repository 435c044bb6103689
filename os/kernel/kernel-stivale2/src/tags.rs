//! # Tags
//!
//! Header tags flow from the kernel to the bootloader (requests), struct tags
//! flow back (responses). Both share the [`TagHeader`] prefix and are
//! distinguished only by their 64-bit identifier.

use core::mem::{offset_of, size_of};
use core::ptr;

/// Registered tag identifiers.
///
/// Identifiers the bootloader does not recognize are skipped, not rejected.
pub mod ids {
    pub const HEADER_FRAMEBUFFER: u64 = 0x3ecc_1bc4_3d0f_7971;
    pub const HEADER_ANY_VIDEO: u64 = 0xc75c_9fa9_2a44_c4db;
    pub const HEADER_TERMINAL: u64 = 0xa85d_499b_1823_be72;
    pub const HEADER_SMP: u64 = 0x1ab0_1508_5f32_73df;
    pub const HEADER_FIVE_LEVEL_PAGING: u64 = 0x932f_4770_3200_7e8f;
    pub const HEADER_UNMAP_NULL: u64 = 0x9291_9432_b16f_e7e7;
    pub const HEADER_SLIDE_HHDM: u64 = 0xdc29_269c_2af5_3d1d;

    pub const STRUCT_CMDLINE: u64 = 0xe5e7_6a1b_4597_a781;
    pub const STRUCT_MEMMAP: u64 = 0x2187_f79e_8612_de07;
    pub const STRUCT_FRAMEBUFFER: u64 = 0x5064_61d2_9504_08fa;
    pub const STRUCT_RSDP: u64 = 0x9e17_8693_0a37_5e78;
    pub const STRUCT_HHDM: u64 = 0xb0ed_257d_b18c_b58f;
}

/// Common prefix of every tag.
///
/// A null `next` terminates the list.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TagHeader {
    pub identifier: u64,
    pub next: *const TagHeader,
}

// SAFETY: Tags are compile-time constants that are never mutated.
#[allow(unsafe_code)]
unsafe impl Sync for TagHeader {}

impl TagHeader {
    /// Offset of the `next` field; payloads start right after the header.
    pub const NEXT_OFFSET: u64 = offset_of!(Self, next) as u64;
    pub const SIZE: u64 = size_of::<Self>() as u64;

    #[must_use]
    pub const fn new(identifier: u64) -> Self {
        Self {
            identifier,
            next: ptr::null(),
        }
    }
}

/// Requests a linear framebuffer.
///
/// Any geometry field left at zero is chosen by the bootloader.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FramebufferHeaderTag {
    tag: TagHeader,
    framebuffer_width: u16,
    framebuffer_height: u16,
    framebuffer_bpp: u16,
    unused: u16,
}

const _: () = {
    assert!(size_of::<TagHeader>() == 16);
    assert!(offset_of!(TagHeader, next) == 8);
    assert!(size_of::<FramebufferHeaderTag>() == 24);
    assert!(offset_of!(FramebufferHeaderTag, framebuffer_width) == 16);
    assert!(offset_of!(FramebufferHeaderTag, framebuffer_height) == 18);
    assert!(offset_of!(FramebufferHeaderTag, framebuffer_bpp) == 20);
    assert!(size_of::<AnyVideoHeaderTag>() == 24);
};

impl FramebufferHeaderTag {
    /// A request that leaves the entire geometry to the bootloader.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tag: TagHeader::new(ids::HEADER_FRAMEBUFFER),
            framebuffer_width: 0,
            framebuffer_height: 0,
            framebuffer_bpp: 0,
            unused: 0,
        }
    }

    #[must_use]
    pub const fn with_width(mut self, width: u16) -> Self {
        self.framebuffer_width = width;
        self
    }

    #[must_use]
    pub const fn with_height(mut self, height: u16) -> Self {
        self.framebuffer_height = height;
        self
    }

    #[must_use]
    pub const fn with_bpp(mut self, bpp: u16) -> Self {
        self.framebuffer_bpp = bpp;
        self
    }

    /// Links the next tag of the list.
    #[must_use]
    pub const fn with_next(mut self, next: *const TagHeader) -> Self {
        self.tag.next = next;
        self
    }

    #[must_use]
    pub const fn width(&self) -> u16 {
        self.framebuffer_width
    }

    #[must_use]
    pub const fn height(&self) -> u16 {
        self.framebuffer_height
    }

    #[must_use]
    pub const fn bpp(&self) -> u16 {
        self.framebuffer_bpp
    }

    /// The tag as a list node, for [`Stivale2Header::with_tags`](crate::Stivale2Header::with_tags)
    /// or another tag's `with_next`.
    #[must_use]
    pub const fn as_tag(&'static self) -> *const TagHeader {
        ptr::from_ref(self).cast()
    }
}

impl Default for FramebufferHeaderTag {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests any kind of video output, or explicitly none.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AnyVideoHeaderTag {
    tag: TagHeader,
    preference: u64,
}

impl AnyVideoHeaderTag {
    /// `preference` 0 prefers a linear framebuffer, 1 prefers no video.
    #[must_use]
    pub const fn new(preference: u64) -> Self {
        Self {
            tag: TagHeader::new(ids::HEADER_ANY_VIDEO),
            preference,
        }
    }

    #[must_use]
    pub const fn with_next(mut self, next: *const TagHeader) -> Self {
        self.tag.next = next;
        self
    }

    #[must_use]
    pub const fn as_tag(&'static self) -> *const TagHeader {
        ptr::from_ref(self).cast()
    }
}

/// A decoded header tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTag {
    Framebuffer {
        width: u16,
        height: u16,
        bpp: u16,
    },
    AnyVideo {
        preference: u64,
    },
    Terminal {
        flags: u64,
    },
    Smp {
        flags: u64,
    },
    FiveLevelPaging,
    UnmapNull,
    SlideHhdm {
        flags: u64,
        alignment: u64,
    },
    /// A tag this crate does not know; the bootloader ignores it as well.
    Unknown {
        identifier: u64,
    },
}

impl HeaderTag {
    #[must_use]
    pub const fn identifier(&self) -> Option<u64> {
        match self {
            Self::Framebuffer { .. } => Some(ids::HEADER_FRAMEBUFFER),
            Self::AnyVideo { .. } => Some(ids::HEADER_ANY_VIDEO),
            Self::Terminal { .. } => Some(ids::HEADER_TERMINAL),
            Self::Smp { .. } => Some(ids::HEADER_SMP),
            Self::FiveLevelPaging => Some(ids::HEADER_FIVE_LEVEL_PAGING),
            Self::UnmapNull => Some(ids::HEADER_UNMAP_NULL),
            Self::SlideHhdm { .. } => Some(ids::HEADER_SLIDE_HHDM),
            Self::Unknown { .. } => None,
        }
    }
}

/// Framebuffer geometry reported by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramebufferInfo {
    pub address: u64,
    pub width: u16,
    pub height: u16,
    pub pitch: u16,
    pub bpp: u16,
    /// 1 = RGB; other values are reserved by the protocol.
    pub memory_model: u8,
    pub red_mask_size: u8,
    pub red_mask_shift: u8,
    pub green_mask_size: u8,
    pub green_mask_shift: u8,
    pub blue_mask_size: u8,
    pub blue_mask_shift: u8,
}

impl FramebufferInfo {
    /// Byte length of the tag payload following the [`TagHeader`].
    pub const PAYLOAD_SIZE: usize = 24;

    /// Decodes the little-endian payload of a framebuffer struct tag.
    #[must_use]
    pub fn from_payload(p: &[u8; Self::PAYLOAD_SIZE]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes([p[at], p[at + 1]]);
        let mut address = [0u8; 8];
        address.copy_from_slice(&p[0..8]);

        Self {
            address: u64::from_le_bytes(address),
            width: u16_at(8),
            height: u16_at(10),
            pitch: u16_at(12),
            bpp: u16_at(14),
            memory_model: p[16],
            red_mask_size: p[17],
            red_mask_shift: p[18],
            green_mask_size: p[19],
            green_mask_shift: p[20],
            blue_mask_size: p[21],
            blue_mask_shift: p[22],
        }
    }

    /// Whether the bootloader filled in a usable geometry.
    ///
    /// A request with zeroed fields must come back populated.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        self.width != 0 && self.height != 0 && self.bpp != 0
    }
}

/// Formats the geometry as `WIDTHxHEIGHTxBPP`.
impl core::fmt::Display for FramebufferInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.bpp)
    }
}

/// A decoded struct tag (bootloader response).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructTag {
    CommandLine { address: u64 },
    MemoryMap { entries: u64 },
    Framebuffer(FramebufferInfo),
    Rsdp { address: u64 },
    Hhdm { address: u64 },
    Unknown { identifier: u64 },
}
