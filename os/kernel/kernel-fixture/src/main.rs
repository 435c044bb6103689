//! Entry point of the boot fixture image.
//!
//! Build for the bare-metal target:
//!
//! ```bash
//! cargo build -p kernel-fixture --target x86_64-unknown-none
//! ```

#![cfg_attr(target_os = "none", no_std, no_main)]

#[cfg(target_os = "none")]
mod image {
    use kernel_stivale2::Stivale2Struct;

    /// The bootloader jumps here with `RSP` at the top of the boot stack,
    /// a zero return address pushed, and the info struct in `RDI`.
    #[unsafe(no_mangle)]
    pub extern "sysv64" fn _start(info: &'static Stivale2Struct) -> ! {
        kernel_fixture::enter(info)
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        log::error!("kernel panic: {info}");

        #[cfg(feature = "exit-on-entry")]
        kernel_qemu::exit_qemu(kernel_qemu::QemuExitCode::Failed);

        kernel_fixture::park()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("kernel-fixture is a bare-metal image; build it with --target x86_64-unknown-none");
    std::process::exit(1);
}
