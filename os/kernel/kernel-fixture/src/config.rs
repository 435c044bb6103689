//! Compile-time configuration of the boot contract.

use kernel_stivale2::HeaderFlags;
use log::LevelFilter;

/// Size of the statically reserved boot stack.
pub const STACK_SIZE: usize = 64 * 1024;

/// Pointers are higher-half; the bootloader maps ELF segments with their
/// declared permissions.
pub const HEADER_FLAGS: HeaderFlags = HeaderFlags::new()
    .with_higher_half_pointers(true)
    .with_protected_memory_ranges(true);

/// Requested framebuffer geometry; zero leaves the choice to the bootloader.
pub const FRAMEBUFFER_WIDTH: u16 = 0;
pub const FRAMEBUFFER_HEIGHT: u16 = 0;
pub const FRAMEBUFFER_BPP: u16 = 0;

pub const LOG_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};

const _: () = {
    assert!(STACK_SIZE.is_multiple_of(4096));
    assert!(STACK_SIZE >= 16 * 1024);
    assert!(HEADER_FLAGS.reserved_bits() == 0);
};
