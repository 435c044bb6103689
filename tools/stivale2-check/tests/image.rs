mod common;

use common::{
    ElfBuilder, HEADER_AT, STACK_AT, STACK_SIZE, TAGS_AT, fixture, framebuffer_tag, header,
};
use kernel_stivale2::{HeaderError, MAX_TAG_HOPS, TagError};
use stivale2_check::{ImageError, inspect_image};

#[test]
fn accepts_fixture_layout() {
    let report = inspect_image(&fixture().build()).unwrap();

    assert_eq!(report.header_addr, HEADER_AT);
    assert_eq!(report.header.tags, TAGS_AT);
    assert_eq!(report.stack.base, STACK_AT);
    assert_eq!(report.stack.size, STACK_SIZE);
    assert_eq!(report.contract.stack_top, STACK_AT + STACK_SIZE);
    assert!(report.stack_zero_fill);
    assert!(report.contract.flags.higher_half_pointers());
    assert!(report.contract.flags.protected_memory_ranges());
    assert_eq!(report.contract.tag_count(), 1);
    assert_eq!(report.contract.framebuffer_request(), Some((0, 0, 0)));
}

#[test]
fn missing_header_section() {
    let image = ElfBuilder::new()
        .progbits(".rodata", TAGS_AT, framebuffer_tag(0))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::MissingHeaderSection)
    ));
}

#[test]
fn header_section_must_be_exactly_one_header() {
    let mut two_headers = header(STACK_AT + STACK_SIZE, 0b110, 0);
    two_headers.extend(header(STACK_AT + STACK_SIZE, 0b110, 0));

    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, two_headers)
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::HeaderSizeMismatch { actual: 64 })
    ));

    let mut short = header(STACK_AT + STACK_SIZE, 0b110, 0);
    short.truncate(24);
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, short)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::HeaderSizeMismatch { actual: 24 })
    ));
}

#[test]
fn missing_stack_symbol() {
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + STACK_SIZE, 0b110, 0))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::MissingStackSymbol)
    ));
}

#[test]
fn stack_pointer_must_be_arena_top() {
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + 0x1000, 0b110, 0))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::Header(HeaderError::StackTopMismatch {
            expected,
            actual,
        })) if expected == STACK_AT + STACK_SIZE && actual == STACK_AT + 0x1000
    ));
}

#[test]
fn stack_pointer_must_be_aligned() {
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + STACK_SIZE - 8, 0, 0))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE - 8)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::Header(HeaderError::MisalignedStack { .. }))
    ));
}

#[test]
fn stack_in_file_bytes_must_be_zero() {
    let mut stack = vec![0u8; 0x1000];
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + 0x1000, 0, 0))
        .progbits(".data", STACK_AT, stack.clone())
        .symbol("STIVALE2_STACK", STACK_AT, 0x1000)
        .build();

    let report = inspect_image(&image).unwrap();
    assert!(!report.stack_zero_fill);

    stack[0x123] = 0x5a;
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + 0x1000, 0, 0))
        .progbits(".data", STACK_AT, stack)
        .symbol("STIVALE2_STACK", STACK_AT, 0x1000)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::StackNotZeroed { addr }) if addr == STACK_AT + 0x123
    ));
}

#[test]
fn stack_outside_loaded_sections() {
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + STACK_SIZE, 0, 0))
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::StackUnmapped(TagError::Unmapped { .. }))
    ));
}

#[test]
fn cyclic_tag_list_is_rejected() {
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + STACK_SIZE, 0b110, TAGS_AT))
        .progbits(".rodata", TAGS_AT, framebuffer_tag(TAGS_AT))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::Header(HeaderError::Tag(TagError::TooManyTags { limit })))
            if limit == MAX_TAG_HOPS
    ));
}

#[test]
fn dangling_tag_pointer_is_rejected() {
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + STACK_SIZE, 0b110, TAGS_AT))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::Header(HeaderError::Tag(TagError::Unmapped { addr })))
            if addr == TAGS_AT
    ));
}

#[test]
fn reserved_flag_bits_are_rejected() {
    let image = ElfBuilder::new()
        .progbits(".stivale2hdr", HEADER_AT, header(STACK_AT + STACK_SIZE, 0b111, 0))
        .nobits(".bss", STACK_AT, STACK_SIZE)
        .symbol("STIVALE2_STACK", STACK_AT, STACK_SIZE)
        .build();

    assert!(matches!(
        inspect_image(&image),
        Err(ImageError::Header(HeaderError::ReservedFlags { bits: 1 }))
    ));
}
