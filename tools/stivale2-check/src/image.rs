//! # Image Inspection
//!
//! Checks a linked kernel ELF against the stivale2 boot contract without
//! running it: the header section, the stack arena and the tag list are all
//! read from the file, by virtual address, exactly as a loader would see
//! them.

use goblin::elf::Elf;
use goblin::elf::section_header::{SHF_ALLOC, SHT_NOBITS};
use kernel_stivale2::{
    ContractReport, HEADER_SECTION, HeaderError, RawHeader, StackRegion, TagError, TagMemory,
    validate,
};

/// Symbol naming the boot stack arena.
pub const STACK_SYMBOL: &str = "STIVALE2_STACK";

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("not a valid ELF image: {0}")]
    Parse(#[from] goblin::error::Error),
    #[error("the image has no {} section", HEADER_SECTION)]
    MissingHeaderSection,
    #[error("the {} section is {actual} bytes, expected exactly {}", HEADER_SECTION, RawHeader::SIZE)]
    HeaderSizeMismatch { actual: u64 },
    #[error("section {name} lies outside the file")]
    SectionOutOfBounds { name: String },
    #[error("the image has no {} symbol", STACK_SYMBOL)]
    MissingStackSymbol,
    #[error("the stack arena holds a non-zero byte at {addr:#x}")]
    StackNotZeroed { addr: u64 },
    #[error("the stack arena is not part of the loaded image: {0}")]
    StackUnmapped(TagError),
    #[error(transparent)]
    Header(#[from] HeaderError),
}

/// A loaded section: where it lives and what it holds.
#[derive(Debug, Clone, Copy)]
struct Region<'a> {
    addr: u64,
    size: u64,
    /// `None` for `SHT_NOBITS`; those read as zeros.
    data: Option<&'a [u8]>,
}

impl Region<'_> {
    fn contains(&self, addr: u64, len: u64) -> bool {
        let Some(top) = self.addr.checked_add(self.size) else {
            return false;
        };

        addr >= self.addr && addr.checked_add(len).is_some_and(|end| end <= top)
    }
}

/// [`TagMemory`] over the allocated sections of an ELF file.
#[derive(Debug, Clone, Default)]
pub struct ImageMemory<'a> {
    regions: Vec<Region<'a>>,
}

impl<'a> ImageMemory<'a> {
    /// Maps every `SHF_ALLOC` section of `elf` at its link address.
    ///
    /// # Errors
    /// A `PROGBITS` section whose file range exceeds `bytes`.
    pub fn from_elf(elf: &Elf<'_>, bytes: &'a [u8]) -> Result<Self, ImageError> {
        let mut regions = Vec::new();

        for section in &elf.section_headers {
            if section.sh_flags & u64::from(SHF_ALLOC) == 0 || section.sh_size == 0 {
                continue;
            }

            let data = if section.sh_type == SHT_NOBITS {
                None
            } else {
                let name = elf.shdr_strtab.get_at(section.sh_name).unwrap_or("<unnamed>");
                Some(file_slice(bytes, section.sh_offset, section.sh_size, name)?)
            };

            regions.push(Region {
                addr: section.sh_addr,
                size: section.sh_size,
                data,
            });
        }

        Ok(Self { regions })
    }

    /// Whether `addr..addr + len` lies entirely within `NOBITS` sections.
    #[must_use]
    pub fn is_zero_fill(&self, addr: u64, len: u64) -> bool {
        self.regions
            .iter()
            .any(|r| r.data.is_none() && r.contains(addr, len))
    }
}

impl TagMemory for ImageMemory<'_> {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), TagError> {
        let len = buf.len() as u64;
        if addr.checked_add(len).is_none() {
            return Err(TagError::AddressOverflow { addr });
        }

        let region = self
            .regions
            .iter()
            .find(|r| r.contains(addr, len))
            .ok_or(TagError::Unmapped { addr })?;

        match region.data {
            None => buf.fill(0),
            Some(data) => {
                let start = usize::try_from(addr - region.addr)
                    .map_err(|_| TagError::Unmapped { addr })?;
                buf.copy_from_slice(&data[start..start + buf.len()]);
            }
        }

        Ok(())
    }
}

/// Everything learned from a successful inspection.
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub header_addr: u64,
    pub header: RawHeader,
    pub stack: StackRegion,
    /// The arena is backed by `NOBITS` storage rather than file bytes.
    pub stack_zero_fill: bool,
    pub contract: ContractReport,
}

/// Inspects the ELF image in `bytes`.
///
/// # Errors
/// The first contract violation found, see [`ImageError`].
pub fn inspect_image(bytes: &[u8]) -> Result<ImageReport, ImageError> {
    let elf = Elf::parse(bytes)?;

    let section = elf
        .section_headers
        .iter()
        .find(|s| elf.shdr_strtab.get_at(s.sh_name) == Some(HEADER_SECTION))
        .ok_or(ImageError::MissingHeaderSection)?;

    if section.sh_size != RawHeader::SIZE as u64 {
        return Err(ImageError::HeaderSizeMismatch {
            actual: section.sh_size,
        });
    }

    let header_bytes = if section.sh_type == SHT_NOBITS {
        &[0u8; RawHeader::SIZE][..]
    } else {
        file_slice(bytes, section.sh_offset, section.sh_size, HEADER_SECTION)?
    };
    let header = RawHeader::from_bytes(header_bytes)?;
    log::debug!(
        "{HEADER_SECTION} at {:#x}: stack {:#x}, flags {:#x}, tags {:#x}",
        section.sh_addr,
        header.stack,
        header.flags.into_bits(),
        header.tags
    );

    let stack = find_symbol(&elf, STACK_SYMBOL)
        .map(|(value, size)| StackRegion::new(value, size))
        .ok_or(ImageError::MissingStackSymbol)?;
    log::debug!("{STACK_SYMBOL} at {:#x}, {:#x} bytes", stack.base, stack.size);

    let memory = ImageMemory::from_elf(&elf, bytes)?;
    let contract = validate(&header, stack, &memory)?;

    let stack_zero_fill = memory.is_zero_fill(stack.base, stack.size);
    if !stack_zero_fill {
        ensure_zeroed(&memory, stack)?;
    }

    Ok(ImageReport {
        header_addr: section.sh_addr,
        header,
        stack,
        stack_zero_fill,
        contract,
    })
}

fn find_symbol(elf: &Elf<'_>, name: &str) -> Option<(u64, u64)> {
    elf.syms
        .iter()
        .find(|sym| elf.strtab.get_at(sym.st_name) == Some(name))
        .map(|sym| (sym.st_value, sym.st_size))
}

fn ensure_zeroed(memory: &ImageMemory<'_>, stack: StackRegion) -> Result<(), ImageError> {
    let mut chunk = [0u8; 4096];
    let mut addr = stack.base;
    let end = stack.base + stack.size;

    while addr < end {
        let len = usize::try_from((end - addr).min(chunk.len() as u64))
            .map_err(|_| ImageError::StackUnmapped(TagError::Unmapped { addr }))?;
        memory
            .read(addr, &mut chunk[..len])
            .map_err(ImageError::StackUnmapped)?;

        if let Some(at) = chunk[..len].iter().position(|&b| b != 0) {
            return Err(ImageError::StackNotZeroed {
                addr: addr + at as u64,
            });
        }

        addr += len as u64;
    }

    Ok(())
}

fn file_slice<'a>(bytes: &'a [u8], offset: u64, size: u64, name: &str) -> Result<&'a [u8], ImageError> {
    let out_of_bounds = || ImageError::SectionOutOfBounds {
        name: name.to_string(),
    };

    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let len = usize::try_from(size).map_err(|_| out_of_bounds())?;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    bytes.get(start..end).ok_or_else(out_of_bounds)
}
