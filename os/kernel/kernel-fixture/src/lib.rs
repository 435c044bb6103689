//! # stivale2 Boot Fixture
//!
//! The smallest kernel a stivale2 bootloader will accept: a header in the
//! `.stivale2hdr` section, a statically reserved stack, one framebuffer
//! request, and an entry point that reports what it was handed and parks.
//!
//! ```text
//! ┌──────────── .stivale2hdr ────────────┐
//! │ entry_point = 0 (use ELF entry)      │
//! │ stack ──────────────────────────────────▶ STIVALE2_STACK top (.bss)
//! │ flags = higher-half | PMR            │
//! │ tags  ──────────────────────────────────▶ FRAMEBUFFER_REQUEST (0x0x0) ─▶ null
//! └──────────────────────────────────────┘
//! ```
//!
//! The binary target wires [`enter`] to `_start`; this library keeps
//! everything else host-testable, including the live statics themselves.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod arena;
pub mod config;
pub mod contract;
pub mod live_memory;
pub mod park;

use kernel_qemu::QemuLogger;
use kernel_stivale2::{FramebufferInfo, StructTag, Stivale2Struct, TagMemory, struct_tags, validate};

pub use arena::StackArena;
pub use contract::{FRAMEBUFFER_REQUEST, STIVALE2_HEADER, STIVALE2_STACK};
pub use live_memory::LiveMemory;
pub use park::park;

static LOGGER: QemuLogger = QemuLogger::new(config::LOG_LEVEL);

/// Body of the entry point: report, self-check, park.
///
/// The first observable action is the entry marker, emitted before any
/// other code has had the chance to fault.
pub fn enter(info: &Stivale2Struct) -> ! {
    kernel_qemu::mark_entry();

    // A second install only happens if the entry point is re-entered.
    let _ = LOGGER.init();

    log::info!("booted by {} {}", info.brand(), info.version());

    // SAFETY: the bootloader maps the whole image and every struct tag.
    let memory = unsafe { LiveMemory::new() };

    match validate(&STIVALE2_HEADER.to_raw(), STIVALE2_STACK.region(), &memory) {
        Ok(report) => log::debug!("header self-check passed, {} tag(s)", report.tag_count()),
        Err(e) => log::error!("header self-check failed: {e}"),
    }

    match framebuffer_of(info, &memory) {
        Some(framebuffer) => log::info!("framebuffer: {framebuffer}"),
        None => log::warn!("framebuffer: none"),
    }

    #[cfg(feature = "exit-on-entry")]
    kernel_qemu::exit_qemu(kernel_qemu::QemuExitCode::Success);

    park()
}

/// The framebuffer the bootloader granted, if its struct tag is present.
///
/// A malformed struct tag list is logged and treated as "no framebuffer".
pub fn framebuffer_of<M: TagMemory + ?Sized>(
    info: &Stivale2Struct,
    memory: &M,
) -> Option<FramebufferInfo> {
    for tag in struct_tags(memory, info.tags()) {
        match tag {
            Ok(StructTag::Framebuffer(framebuffer)) => return Some(framebuffer),
            Ok(_) => {}
            Err(e) => {
                log::warn!("struct tag list is malformed: {e}");
                return None;
            }
        }
    }

    None
}
