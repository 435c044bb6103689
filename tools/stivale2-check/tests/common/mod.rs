//! Minimal ELF64 writer for synthetic kernel images.

#![allow(dead_code, clippy::cast_possible_truncation)]

use kernel_stivale2::{HeaderFlags, RawHeader, ids};

pub const BASE: u64 = 0xffff_ffff_8020_0000;
pub const HEADER_AT: u64 = BASE + 0x1000;
pub const TAGS_AT: u64 = BASE + 0x2000;
pub const STACK_AT: u64 = BASE + 0x4000;
pub const STACK_SIZE: u64 = 0x1_0000;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;
const SHF_WRITE: u64 = 0x1;
const SHF_ALLOC: u64 = 0x2;

struct Section {
    name: String,
    kind: u32,
    flags: u64,
    addr: u64,
    data: Vec<u8>,
    size: u64,
    link: u32,
    info: u32,
    entsize: u64,
}

#[derive(Default)]
pub struct ElfBuilder {
    sections: Vec<Section>,
    symbols: Vec<(String, u64, u64)>,
}

impl ElfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progbits(mut self, name: &str, addr: u64, data: Vec<u8>) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            kind: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_WRITE,
            addr,
            size: data.len() as u64,
            data,
            link: 0,
            info: 0,
            entsize: 0,
        });
        self
    }

    pub fn nobits(mut self, name: &str, addr: u64, size: u64) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            kind: SHT_NOBITS,
            flags: SHF_ALLOC | SHF_WRITE,
            addr,
            data: Vec::new(),
            size,
            link: 0,
            info: 0,
            entsize: 0,
        });
        self
    }

    pub fn symbol(mut self, name: &str, value: u64, size: u64) -> Self {
        self.symbols.push((name.to_string(), value, size));
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        let user_sections = self.sections.len();
        let symtab_index = user_sections + 1;
        let strtab_index = symtab_index + 1;
        let shstrtab_index = strtab_index + 1;

        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; 24];
        for (name, value, size) in &self.symbols {
            let st_name = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);

            symtab.extend_from_slice(&st_name.to_le_bytes());
            symtab.push(0x11); // STB_GLOBAL, STT_OBJECT
            symtab.push(0);
            symtab.extend_from_slice(&1u16.to_le_bytes());
            symtab.extend_from_slice(&value.to_le_bytes());
            symtab.extend_from_slice(&size.to_le_bytes());
        }

        self.sections.push(Section {
            name: ".symtab".into(),
            kind: SHT_SYMTAB,
            flags: 0,
            addr: 0,
            size: symtab.len() as u64,
            data: symtab,
            link: strtab_index as u32,
            info: 1,
            entsize: 24,
        });
        self.sections.push(Section {
            name: ".strtab".into(),
            kind: SHT_STRTAB,
            flags: 0,
            addr: 0,
            size: strtab.len() as u64,
            data: strtab,
            link: 0,
            info: 0,
            entsize: 0,
        });

        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for name in self
            .sections
            .iter()
            .map(|s| s.name.as_str())
            .chain([".shstrtab"])
        {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(name.as_bytes());
            shstrtab.push(0);
        }
        self.sections.push(Section {
            name: ".shstrtab".into(),
            kind: SHT_STRTAB,
            flags: 0,
            addr: 0,
            size: shstrtab.len() as u64,
            data: shstrtab,
            link: 0,
            info: 0,
            entsize: 0,
        });

        // Section contents follow the ELF header.
        let mut out = vec![0u8; 64];
        let mut offsets = Vec::new();
        for section in &self.sections {
            align8(&mut out);
            offsets.push(out.len() as u64);
            out.extend_from_slice(&section.data);
        }

        align8(&mut out);
        let shoff = out.len() as u64;
        out.extend_from_slice(&[0u8; 64]); // SHN_UNDEF
        for ((section, offset), name) in self.sections.iter().zip(&offsets).zip(&name_offsets) {
            out.extend_from_slice(&name.to_le_bytes());
            out.extend_from_slice(&section.kind.to_le_bytes());
            out.extend_from_slice(&section.flags.to_le_bytes());
            out.extend_from_slice(&section.addr.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&section.size.to_le_bytes());
            out.extend_from_slice(&section.link.to_le_bytes());
            out.extend_from_slice(&section.info.to_le_bytes());
            out.extend_from_slice(&8u64.to_le_bytes());
            out.extend_from_slice(&section.entsize.to_le_bytes());
        }

        let mut ehdr = Vec::with_capacity(64);
        ehdr.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        ehdr.extend_from_slice(&[0; 8]);
        ehdr.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        ehdr.extend_from_slice(&62u16.to_le_bytes()); // EM_X86_64
        ehdr.extend_from_slice(&1u32.to_le_bytes());
        ehdr.extend_from_slice(&BASE.to_le_bytes()); // e_entry
        ehdr.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
        ehdr.extend_from_slice(&shoff.to_le_bytes());
        ehdr.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        ehdr.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
        ehdr.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
        ehdr.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        ehdr.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
        ehdr.extend_from_slice(&((self.sections.len() + 1) as u16).to_le_bytes());
        ehdr.extend_from_slice(&(shstrtab_index as u16).to_le_bytes());
        out[..64].copy_from_slice(&ehdr);

        out
    }
}

fn align8(out: &mut Vec<u8>) {
    while !out.len().is_multiple_of(8) {
        out.push(0);
    }
}

pub fn header(stack: u64, flags: u64, tags: u64) -> Vec<u8> {
    RawHeader {
        entry_point: 0,
        stack,
        flags: HeaderFlags::from_bits(flags),
        tags,
    }
    .to_bytes()
    .to_vec()
}

/// A framebuffer request for the bootloader's preferred mode.
pub fn framebuffer_tag(next: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&ids::HEADER_FRAMEBUFFER.to_le_bytes());
    bytes.extend_from_slice(&next.to_le_bytes());
    bytes.extend_from_slice(&[0; 8]);
    bytes
}

/// The layout the fixture kernel links to: header, one tag, stack in `.bss`.
pub fn fixture() -> ElfBuilder {
    ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + STACK_SIZE, 0b110, TAGS_AT))
        .progbits(".rodata", TAGS_AT, framebuffer_tag(0))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
}
