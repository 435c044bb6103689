//! # Boot Contract
//!
//! The statics the bootloader reads out of the image before handing over
//! control. All three are linked as `#[no_mangle]` symbols so that image
//! inspection can locate them by name.

use crate::arena::StackArena;
use crate::config;
use kernel_stivale2::{FramebufferHeaderTag, Stivale2Header};

/// The boot stack; `RSP` starts at its top.
#[unsafe(no_mangle)]
pub static STIVALE2_STACK: StackArena<{ config::STACK_SIZE }> = StackArena::new();

/// The only header tag: a framebuffer with bootloader-chosen geometry.
#[unsafe(no_mangle)]
pub static FRAMEBUFFER_REQUEST: FramebufferHeaderTag = FramebufferHeaderTag::new()
    .with_width(config::FRAMEBUFFER_WIDTH)
    .with_height(config::FRAMEBUFFER_HEIGHT)
    .with_bpp(config::FRAMEBUFFER_BPP);

/// The stivale2 header. An `entry_point` of zero selects the ELF entry.
///
/// Nothing references this static from code; `#[used]` and the linker
/// script's `KEEP` stop it from being discarded.
#[used]
#[unsafe(no_mangle)]
#[unsafe(link_section = ".stivale2hdr")]
pub static STIVALE2_HEADER: Stivale2Header = Stivale2Header::new()
    .with_stack(STIVALE2_STACK.top())
    .with_flags(config::HEADER_FLAGS)
    .with_tags(FRAMEBUFFER_REQUEST.as_tag());
