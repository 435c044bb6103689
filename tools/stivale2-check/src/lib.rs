//! # stivale2 Contract Checks
//!
//! Host-side verification of a stivale2 kernel, in two stages:
//!
//! * [`image`]: inspect the linked ELF. The header section must hold exactly
//!   one header, its stack pointer must be the top of the zero-filled
//!   `STIVALE2_STACK` arena, and its tag list must terminate.
//! * [`harness`]: boot a bootable image under QEMU and classify the outcome
//!   from the process state and the debug console transcript.

pub mod harness;
pub mod image;
pub mod logger;

pub use harness::{BootConfig, BootRun, HarnessError, Outcome, check_runs, run_boot};
pub use image::{ImageError, ImageMemory, ImageReport, STACK_SYMBOL, inspect_image};
pub use logger::StderrLogger;
