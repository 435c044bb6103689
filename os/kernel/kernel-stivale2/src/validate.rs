//! # Contract Validation
//!
//! Checks that a header honors what the bootloader relies on:
//!
//! * the stack pointer is non-null, 16-byte aligned and sits exactly at the
//!   top of the reserved stack arena,
//! * no reserved flag bit is set,
//! * the tag list terminates within [`MAX_TAG_HOPS`] nodes.

use crate::chain::{MAX_TAG_HOPS, TagError, TagMemory, header_tags};
use crate::header::{HeaderFlags, RawHeader};
use crate::tags::HeaderTag;

/// Required alignment of the initial stack pointer.
pub const STACK_ALIGNMENT: u64 = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("header section is {actual} bytes, expected exactly {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("the stack pointer is null")]
    NullStack,
    #[error("the stack pointer {stack:#x} is not 16-byte aligned")]
    MisalignedStack { stack: u64 },
    #[error("the stack pointer {actual:#x} is not the top of the stack arena ({expected:#x})")]
    StackTopMismatch { expected: u64, actual: u64 },
    #[error("the stack arena at {base:#x} with size {size:#x} wraps the address space")]
    StackRegionOverflow { base: u64, size: u64 },
    #[error("reserved flag bits {bits:#x} are set")]
    ReservedFlags { bits: u64 },
    #[error(transparent)]
    Tag(#[from] TagError),
}

/// The statically reserved stack arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StackRegion {
    pub base: u64,
    pub size: u64,
}

impl StackRegion {
    #[must_use]
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// One past the highest byte, or `None` if the region wraps.
    #[must_use]
    pub const fn top(&self) -> Option<u64> {
        self.base.checked_add(self.size)
    }
}

/// Outcome of a successful [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractReport {
    pub flags: HeaderFlags,
    pub stack_top: u64,
    tags: [Option<HeaderTag>; MAX_TAG_HOPS],
    len: usize,
}

impl ContractReport {
    /// The requested tags, in list order.
    pub fn tags(&self) -> impl Iterator<Item = &HeaderTag> {
        self.tags[..self.len].iter().flatten()
    }

    #[must_use]
    pub const fn tag_count(&self) -> usize {
        self.len
    }

    /// The framebuffer request, if any, as `(width, height, bpp)`.
    #[must_use]
    pub fn framebuffer_request(&self) -> Option<(u16, u16, u16)> {
        self.tags().find_map(|tag| match *tag {
            HeaderTag::Framebuffer { width, height, bpp } => Some((width, height, bpp)),
            _ => None,
        })
    }
}

/// Validates a header against its stack arena and walks its tag list.
///
/// # Errors
/// The first violated rule, see [`HeaderError`].
pub fn validate<M: TagMemory + ?Sized>(
    header: &RawHeader,
    stack: StackRegion,
    memory: &M,
) -> Result<ContractReport, HeaderError> {
    if header.stack == 0 {
        return Err(HeaderError::NullStack);
    }

    if !header.stack.is_multiple_of(STACK_ALIGNMENT) {
        return Err(HeaderError::MisalignedStack {
            stack: header.stack,
        });
    }

    let expected = stack.top().ok_or(HeaderError::StackRegionOverflow {
        base: stack.base,
        size: stack.size,
    })?;
    if header.stack != expected {
        return Err(HeaderError::StackTopMismatch {
            expected,
            actual: header.stack,
        });
    }

    let reserved = header.flags.reserved_bits();
    if reserved != 0 {
        return Err(HeaderError::ReservedFlags { bits: reserved });
    }

    let mut tags = [None; MAX_TAG_HOPS];
    let mut len = 0;
    for tag in header_tags(memory, header.tags) {
        tags[len] = Some(tag?);
        len += 1;
    }

    log::debug!(
        "stivale2 header ok: stack top {:#x}, flags {:#x}, {len} tag(s)",
        header.stack,
        header.flags.into_bits()
    );

    Ok(ContractReport {
        flags: header.flags,
        stack_top: header.stack,
        tags,
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SliceMemory;
    use crate::tags::ids;

    const STACK: StackRegion = StackRegion::new(0xffff_ffff_8030_0000, 0x1_0000);
    const TAGS_AT: u64 = 0xffff_ffff_8020_1000;

    fn header(stack: u64, flags: u64, tags: u64) -> RawHeader {
        RawHeader {
            entry_point: 0,
            stack,
            flags: HeaderFlags::from_bits(flags),
            tags,
        }
    }

    fn framebuffer_tag(next: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&ids::HEADER_FRAMEBUFFER.to_le_bytes());
        bytes.extend_from_slice(&next.to_le_bytes());
        bytes.extend_from_slice(&[0; 8]);
        bytes
    }

    #[test]
    fn accepts_well_formed_contract() {
        let bytes = framebuffer_tag(0);
        let memory = SliceMemory::new(TAGS_AT, &bytes);

        let report = validate(&header(STACK.base + STACK.size, 0b110, TAGS_AT), STACK, &memory)
            .unwrap();

        assert_eq!(report.stack_top, 0xffff_ffff_8031_0000);
        assert!(report.flags.higher_half_pointers());
        assert!(report.flags.protected_memory_ranges());
        assert_eq!(report.tag_count(), 1);
        assert_eq!(report.framebuffer_request(), Some((0, 0, 0)));
    }

    #[test]
    fn accepts_empty_tag_list() {
        let memory = SliceMemory::new(0, &[]);
        let report = validate(&header(STACK.base + STACK.size, 0, 0), STACK, &memory).unwrap();
        assert_eq!(report.tag_count(), 0);
        assert_eq!(report.framebuffer_request(), None);
    }

    #[test]
    fn rejects_stack_violations() {
        let memory = SliceMemory::new(0, &[]);

        assert_eq!(
            validate(&header(0, 0, 0), STACK, &memory),
            Err(HeaderError::NullStack)
        );
        assert_eq!(
            validate(&header(STACK.base + 8, 0, 0), STACK, &memory),
            Err(HeaderError::MisalignedStack {
                stack: STACK.base + 8
            })
        );
        assert_eq!(
            validate(&header(STACK.base + 0x1000, 0, 0), STACK, &memory),
            Err(HeaderError::StackTopMismatch {
                expected: STACK.base + STACK.size,
                actual: STACK.base + 0x1000
            })
        );
        assert!(matches!(
            validate(
                &header(0x10, 0, 0),
                StackRegion::new(u64::MAX - 0xf, 0x20),
                &memory
            ),
            Err(HeaderError::StackRegionOverflow { .. })
        ));
    }

    #[test]
    fn rejects_reserved_flags() {
        let memory = SliceMemory::new(0, &[]);
        assert_eq!(
            validate(&header(STACK.base + STACK.size, 0b1_0010, 0), STACK, &memory),
            Err(HeaderError::ReservedFlags { bits: 0b1_0000 })
        );
    }

    #[test]
    fn propagates_tag_errors() {
        let bytes = framebuffer_tag(TAGS_AT);
        let memory = SliceMemory::new(TAGS_AT, &bytes);
        assert_eq!(
            validate(&header(STACK.base + STACK.size, 0, TAGS_AT), STACK, &memory),
            Err(HeaderError::Tag(TagError::TooManyTags {
                limit: MAX_TAG_HOPS
            }))
        );
    }
}
