//! # Tag Chain Traversal

use crate::tags::{FramebufferInfo, HeaderTag, StructTag, TagHeader, ids};
use core::marker::PhantomData;

/// Upper bound on the number of tags a list may contain.
///
/// Reaching it is treated as a malformed (possibly cyclic) list.
pub const MAX_TAG_HOPS: usize = 16;

/// Alignment every tag node must satisfy.
const TAG_ALIGNMENT: u64 = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("tag list exceeds {limit} entries (missing terminator or cycle)")]
    TooManyTags { limit: usize },
    #[error("tag at {addr:#x} is not 8-byte aligned")]
    Misaligned { addr: u64 },
    #[error("tag memory at {addr:#x} is not mapped")]
    Unmapped { addr: u64 },
    #[error("tag address arithmetic overflowed at {addr:#x}")]
    AddressOverflow { addr: u64 },
}

/// Read access to the memory a tag list lives in.
///
/// Implementations translate an address as stored in `next`/`tags` fields
/// into bytes: directly in the kernel, or through section contents when
/// inspecting an image on the host.
pub trait TagMemory {
    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    ///
    /// # Errors
    /// [`TagError::Unmapped`] if any byte of the range is not backed.
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), TagError>;

    /// Reads a little-endian `u64` at `addr`.
    ///
    /// # Errors
    /// See [`TagMemory::read`].
    fn read_u64(&self, addr: u64) -> Result<u64, TagError> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl<M: TagMemory + ?Sized> TagMemory for &M {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), TagError> {
        (**self).read(addr, buf)
    }
}

/// Several disjoint regions; a read must be satisfied by a single one.
impl<M: TagMemory> TagMemory for [M] {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), TagError> {
        self.iter()
            .find_map(|region| region.read(addr, buf).ok())
            .ok_or(TagError::Unmapped { addr })
    }
}

/// A byte slice mapped at a fixed base address.
#[derive(Debug, Clone, Copy)]
pub struct SliceMemory<'a> {
    base: u64,
    bytes: &'a [u8],
}

impl<'a> SliceMemory<'a> {
    #[must_use]
    pub const fn new(base: u64, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }
}

impl TagMemory for SliceMemory<'_> {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), TagError> {
        let unmapped = TagError::Unmapped { addr };
        let offset = addr.checked_sub(self.base).ok_or(unmapped)?;
        let start = usize::try_from(offset).map_err(|_| unmapped)?;
        let end = start.checked_add(buf.len()).ok_or(unmapped)?;
        let src = self.bytes.get(start..end).ok_or(unmapped)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Decoding of one tag kind from its identifier and payload.
pub trait TagDecode: Sized {
    /// Decodes the node at `addr` whose identifier was already read.
    ///
    /// # Errors
    /// Propagates read failures of the payload.
    fn decode<M: TagMemory + ?Sized>(
        memory: &M,
        addr: u64,
        identifier: u64,
    ) -> Result<Self, TagError>;
}

fn payload_addr(addr: u64, offset: u64) -> Result<u64, TagError> {
    addr.checked_add(TagHeader::SIZE + offset)
        .ok_or(TagError::AddressOverflow { addr })
}

fn payload_u64<M: TagMemory + ?Sized>(memory: &M, addr: u64, offset: u64) -> Result<u64, TagError> {
    memory.read_u64(payload_addr(addr, offset)?)
}

impl TagDecode for HeaderTag {
    fn decode<M: TagMemory + ?Sized>(
        memory: &M,
        addr: u64,
        identifier: u64,
    ) -> Result<Self, TagError> {
        Ok(match identifier {
            ids::HEADER_FRAMEBUFFER => {
                let mut geometry = [0u8; 6];
                memory.read(payload_addr(addr, 0)?, &mut geometry)?;
                Self::Framebuffer {
                    width: u16::from_le_bytes([geometry[0], geometry[1]]),
                    height: u16::from_le_bytes([geometry[2], geometry[3]]),
                    bpp: u16::from_le_bytes([geometry[4], geometry[5]]),
                }
            }
            ids::HEADER_ANY_VIDEO => Self::AnyVideo {
                preference: payload_u64(memory, addr, 0)?,
            },
            ids::HEADER_TERMINAL => Self::Terminal {
                flags: payload_u64(memory, addr, 0)?,
            },
            ids::HEADER_SMP => Self::Smp {
                flags: payload_u64(memory, addr, 0)?,
            },
            ids::HEADER_FIVE_LEVEL_PAGING => Self::FiveLevelPaging,
            ids::HEADER_UNMAP_NULL => Self::UnmapNull,
            ids::HEADER_SLIDE_HHDM => Self::SlideHhdm {
                flags: payload_u64(memory, addr, 0)?,
                alignment: payload_u64(memory, addr, 8)?,
            },
            identifier => Self::Unknown { identifier },
        })
    }
}

impl TagDecode for StructTag {
    fn decode<M: TagMemory + ?Sized>(
        memory: &M,
        addr: u64,
        identifier: u64,
    ) -> Result<Self, TagError> {
        Ok(match identifier {
            ids::STRUCT_CMDLINE => Self::CommandLine {
                address: payload_u64(memory, addr, 0)?,
            },
            ids::STRUCT_MEMMAP => Self::MemoryMap {
                entries: payload_u64(memory, addr, 0)?,
            },
            ids::STRUCT_FRAMEBUFFER => {
                let mut payload = [0u8; FramebufferInfo::PAYLOAD_SIZE];
                memory.read(payload_addr(addr, 0)?, &mut payload)?;
                Self::Framebuffer(FramebufferInfo::from_payload(&payload))
            }
            ids::STRUCT_RSDP => Self::Rsdp {
                address: payload_u64(memory, addr, 0)?,
            },
            ids::STRUCT_HHDM => Self::Hhdm {
                address: payload_u64(memory, addr, 0)?,
            },
            identifier => Self::Unknown { identifier },
        })
    }
}

/// Iterator over a tag list, bounded to [`MAX_TAG_HOPS`] nodes.
///
/// Iteration ends after the first error.
pub struct TagChain<'m, M: ?Sized, T> {
    memory: &'m M,
    next: u64,
    hops: usize,
    failed: bool,
    _kind: PhantomData<fn() -> T>,
}

impl<'m, M: TagMemory + ?Sized, T: TagDecode> TagChain<'m, M, T> {
    #[must_use]
    pub const fn new(memory: &'m M, head: u64) -> Self {
        Self {
            memory,
            next: head,
            hops: 0,
            failed: false,
            _kind: PhantomData,
        }
    }

    /// Number of nodes visited so far.
    #[must_use]
    pub const fn hops(&self) -> usize {
        self.hops
    }

    fn read_node(&self, addr: u64) -> Result<(T, u64), TagError> {
        if !addr.is_multiple_of(TAG_ALIGNMENT) {
            return Err(TagError::Misaligned { addr });
        }

        let identifier = self.memory.read_u64(addr)?;
        let next_addr = addr
            .checked_add(TagHeader::NEXT_OFFSET)
            .ok_or(TagError::AddressOverflow { addr })?;
        let next = self.memory.read_u64(next_addr)?;
        let tag = T::decode(self.memory, addr, identifier)?;

        log::trace!("tag {identifier:#x} at {addr:#x} -> next {next:#x}");
        Ok((tag, next))
    }
}

impl<M: TagMemory + ?Sized, T: TagDecode> Iterator for TagChain<'_, M, T> {
    type Item = Result<T, TagError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next == 0 {
            return None;
        }

        if self.hops == MAX_TAG_HOPS {
            self.failed = true;
            return Some(Err(TagError::TooManyTags {
                limit: MAX_TAG_HOPS,
            }));
        }

        self.hops += 1;
        match self.read_node(self.next) {
            Ok((tag, next)) => {
                self.next = next;
                Some(Ok(tag))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Walks the header tag list starting at `head` (0 = empty list).
#[must_use]
pub const fn header_tags<M: TagMemory + ?Sized>(
    memory: &M,
    head: u64,
) -> TagChain<'_, M, HeaderTag> {
    TagChain::new(memory, head)
}

/// Walks the struct tag list of a [`Stivale2Struct`](crate::Stivale2Struct).
#[must_use]
pub const fn struct_tags<M: TagMemory + ?Sized>(
    memory: &M,
    head: u64,
) -> TagChain<'_, M, StructTag> {
    TagChain::new(memory, head)
}

impl<M: TagMemory + ?Sized, T: TagDecode> core::iter::FusedIterator for TagChain<'_, M, T> {}
