//! # Boot Information
//!
//! The structure the bootloader passes to the entry point in `RDI`.

use core::mem::{offset_of, size_of};

/// Length of the brand and version strings, including NUL padding.
const BRAND_LEN: usize = 64;

/// Bootloader response handed to the kernel entry point.
///
/// The kernel does not own this structure; it lives in bootloader-reclaimable
/// memory and describes what the bootloader actually provided.
#[repr(C)]
#[derive(Clone)]
pub struct Stivale2Struct {
    bootloader_brand: [u8; BRAND_LEN],
    bootloader_version: [u8; BRAND_LEN],
    tags: u64,
}

const _: () = {
    assert!(size_of::<Stivale2Struct>() == 136);
    assert!(offset_of!(Stivale2Struct, bootloader_version) == 64);
    assert!(offset_of!(Stivale2Struct, tags) == 128);
};

impl Stivale2Struct {
    /// Builds a response; strings longer than 63 bytes are truncated.
    #[must_use]
    pub fn new(brand: &str, version: &str, tags: u64) -> Self {
        Self {
            bootloader_brand: fixed_str(brand),
            bootloader_version: fixed_str(version),
            tags,
        }
    }

    /// Bootloader name, e.g. `Limine`.
    #[must_use]
    pub fn brand(&self) -> &str {
        trim_nul(&self.bootloader_brand)
    }

    #[must_use]
    pub fn version(&self) -> &str {
        trim_nul(&self.bootloader_version)
    }

    /// Address of the first struct tag, or 0.
    #[must_use]
    pub const fn tags(&self) -> u64 {
        self.tags
    }
}

impl core::fmt::Debug for Stivale2Struct {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stivale2Struct")
            .field("bootloader_brand", &self.brand())
            .field("bootloader_version", &self.version())
            .field("tags", &format_args!("{:#x}", self.tags))
            .finish()
    }
}

fn fixed_str(s: &str) -> [u8; BRAND_LEN] {
    let mut out = [0u8; BRAND_LEN];
    let len = s.len().min(BRAND_LEN - 1);
    out[..len].copy_from_slice(&s.as_bytes()[..len]);
    out
}

fn trim_nul(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    match core::str::from_utf8(&bytes[..end]) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_nul_trimmed() {
        let info = Stivale2Struct::new("Limine", "2.0", 0xffff_8000_0001_0000);
        assert_eq!(info.brand(), "Limine");
        assert_eq!(info.version(), "2.0");
        assert_eq!(info.tags(), 0xffff_8000_0001_0000);
    }

    #[test]
    fn overlong_brand_keeps_terminator() {
        let long = "x".repeat(100);
        let info = Stivale2Struct::new(&long, "", 0);
        assert_eq!(info.brand().len(), 63);
        assert_eq!(info.version(), "");
    }

    #[test]
    fn invalid_utf8_is_cut_at_the_first_bad_byte() {
        let mut brand = [0u8; BRAND_LEN];
        brand[..4].copy_from_slice(&[b'I', b'o', 0xff, b'n']);
        assert_eq!(trim_nul(&brand), "Io");
    }
}
