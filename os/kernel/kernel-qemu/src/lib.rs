//! # QEMU Debug Console Support
//!
//! Early-boot output for kernels running under QEMU. Nothing here needs a
//! heap, a stack deeper than a few frames, or any initialized runtime; it
//! only writes bytes to an I/O port.
//!
//! ## Debug Console
//!
//! QEMU's `-debugcon` device captures every byte written to port `0x402`:
//!
//! ```bash
//! qemu-system-x86_64 -cdrom image.iso -debugcon stdio
//! qemu-system-x86_64 -cdrom image.iso -debugcon file:debug.log
//! ```
//!
//! ```text
//! qemu_trace! / QemuLogger
//!     ↓
//! QemuSink (fmt::Write)
//!     ↓
//! dbg_putc() → I/O port 0x402 → host stdio / file
//! ```
//!
//! ## Liveness
//!
//! A host-side harness cannot tell a kernel that never received control from
//! one that received control and parked. [`mark_entry`] writes the
//! [`ENTRY_MARKER`] line as the first observable action of the entry point,
//! which turns that distinction into a substring check on the transcript.
//!
//! ## Features
//!
//! * `enabled` (default): port output is compiled in.
//! * without `enabled`: every operation is a no-op, no port is touched.
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
//!
//! LOGGER.init().expect("logger initialization");
//! info!("entry reached");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

/// Line written by [`mark_entry`]; harnesses search the transcript for it.
pub const ENTRY_MARKER: &str = "stivale2: entry reached";

/// The port number for QEMU's debug console.
pub const QEMU_DEBUG_PORT: u16 = 0x402;

/// The port number of QEMU's `isa-debug-exit` device.
pub const QEMU_EXIT_PORT: u16 = 0xf4;

/// Exit status reported through the `isa-debug-exit` device.
///
/// QEMU exits with `(code << 1) | 1`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

impl QemuExitCode {
    /// The process exit status QEMU reports on the host.
    #[must_use]
    pub const fn host_status(self) -> i32 {
        ((self as i32) << 1) | 1
    }
}

/// Signals on the debug console that the entry point has been reached.
#[inline]
pub fn mark_entry() {
    qemu_trace!("{ENTRY_MARKER}\n");
}

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    /// Write a single character to QEMU's debug port.
    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub fn dbg_putc(c: u8) {
        unsafe { outb(super::QEMU_DEBUG_PORT, c) }
    }

    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub(crate) unsafe fn outb(port: u16, val: u8) {
        unsafe {
            core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nomem, nostack, preserves_flags)
            );
        }
    }

    #[allow(clippy::inline_always)]
    #[inline(always)]
    pub(crate) unsafe fn outl(port: u16, val: u32) {
        unsafe {
            core::arch::asm!(
            "out dx, eax",
            in("dx") port,
            in("eax") val,
            options(nomem, nostack, preserves_flags)
            );
        }
    }

    pub struct QemuSink;

    impl Write for QemuSink {
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                dbg_putc(b);
            }
            Ok(())
        }
    }

    #[doc(hidden)]
    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best effort; there is nobody to report a failure to.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[doc(hidden)]
    #[inline]
    pub fn qemu_write(_: fmt::Arguments) {}
}

/// Requests QEMU to terminate with the given status.
///
/// Requires `-device isa-debug-exit,iobase=0xf4,iosize=0x04`; without the
/// device the write is ignored and this function returns.
#[inline]
pub fn exit_qemu(code: QemuExitCode) {
    #[cfg(feature = "enabled")]
    unsafe {
        qemu_fmt::outl(QEMU_EXIT_PORT, code as u32);
    }

    #[cfg(not(feature = "enabled"))]
    let _ = code;
}

/// Formats directly onto the QEMU debug console without allocating.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
