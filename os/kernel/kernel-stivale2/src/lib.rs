//! # stivale2 Boot Contract
//!
//! Binary layout and traversal of the stivale2 boot protocol as seen from the
//! kernel side: the header a kernel image publishes in its `.stivale2hdr`
//! section, the header tags it uses to request features from the bootloader,
//! and the boot information structure (with its own tag list) the bootloader
//! hands to the kernel entry point.
//!
//! ## Overview
//!
//! The bootloader parses raw memory, not a self-describing format. Every type
//! in this crate therefore mirrors the published protocol byte-for-byte and
//! carries compile-time assertions on its size and field offsets.
//!
//! ```text
//! .stivale2hdr                          .data / .rodata
//! ┌──────────────────────────┐          ┌──────────────────────────┐
//! │ entry_point  (0 = ELF)   │    ┌────►│ identifier               │
//! │ stack        ────────────┼──┐ │     │ next         ────────────┼──► ... ──► 0
//! │ flags                    │  │ │     │ payload                  │
//! │ tags         ────────────┼──┼─┘     └──────────────────────────┘
//! └──────────────────────────┘  │
//!                               │       .bss
//!                               │       ┌──────────────────────────┐
//!                               │       │ reserved stack arena     │
//!                               └──────►└──────────────────────────┘ (top)
//! ```
//!
//! ## Building a Header
//!
//! All builders are `const fn`, so the complete contract is evaluated at
//! compile time and emitted as initialized data:
//!
//! ```rust
//! use kernel_stivale2::{FramebufferHeaderTag, HeaderFlags, Stivale2Header};
//!
//! static FRAMEBUFFER: FramebufferHeaderTag = FramebufferHeaderTag::new();
//!
//! static HEADER: Stivale2Header = Stivale2Header::new()
//!     .with_flags(HeaderFlags::new().with_higher_half_pointers(true))
//!     .with_tags(FRAMEBUFFER.as_tag());
//!
//! assert!(HEADER.flags().higher_half_pointers());
//! ```
//!
//! ## Walking Tag Lists
//!
//! Tag lists are singly linked through raw addresses. Instead of following
//! pointers directly, [`header_tags`] and [`struct_tags`] read nodes through a
//! [`TagMemory`] and yield the typed [`HeaderTag`] / [`StructTag`] variants.
//! Traversal is bounded to [`MAX_TAG_HOPS`] nodes so that cycles surface as
//! [`TagError::TooManyTags`] instead of a hang.
//!
//! ## Validation
//!
//! [`validate`] checks a decoded [`RawHeader`] against the reserved stack
//! arena and walks its tag list, producing a [`ContractReport`]. The same
//! check runs in the kernel against its own statics and on the host against
//! a built image.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod chain;
mod header;
mod info;
mod tags;
mod validate;

pub use chain::{
    MAX_TAG_HOPS, SliceMemory, TagChain, TagDecode, TagError, TagMemory, header_tags, struct_tags,
};
pub use header::{HEADER_SECTION, HeaderFlags, RawHeader, Stivale2Header};
pub use info::Stivale2Struct;
pub use tags::{
    AnyVideoHeaderTag, FramebufferHeaderTag, FramebufferInfo, HeaderTag, StructTag, TagHeader, ids,
};
pub use validate::{ContractReport, HeaderError, STACK_ALIGNMENT, StackRegion, validate};
