use std::{env, path::PathBuf};

/// Link address of the image; the top 2 GiB keep `code-model=kernel` happy.
const KERNEL_BASE: u64 = 0xffff_ffff_8020_0000;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Host builds only produce the stub binary.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    // Point to the linker script
    let manifest_dir =
        PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR is set by cargo"));
    let ld = manifest_dir.join("kernel.ld");

    // Sanity checks (fail fast during build)
    assert_eq!(
        KERNEL_BASE & ((1u64 << 21) - 1),
        0,
        "KERNEL_BASE must be 2 MiB aligned (got {KERNEL_BASE:#x})"
    );
    assert!(
        KERNEL_BASE >= 0xffff_ffff_8000_0000,
        "KERNEL_BASE must lie in the top 2 GiB (got {KERNEL_BASE:#x})"
    );

    // Rebuild when inputs change
    println!("cargo:rerun-if-changed={}", ld.display());

    // Linker script
    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_BASE={KERNEL_BASE:#x}");
}
