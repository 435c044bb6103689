use core::ptr;
use kernel_stivale2::{TagError, TagMemory};

/// [`TagMemory`] over the current address space.
///
/// Reads go straight through raw pointers, so tag lists built from the
/// image's own statics (or handed over by the bootloader) can be walked in
/// place with the same code that inspects images offline.
#[derive(Debug, Clone, Copy)]
pub struct LiveMemory(());

impl LiveMemory {
    /// # Safety
    /// Every address reached through this value, including `next` pointers
    /// of any list walked with it, must be mapped and readable, with its
    /// provenance exposed.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self(())
    }
}

impl TagMemory for LiveMemory {
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), TagError> {
        if addr == 0 {
            return Err(TagError::Unmapped { addr });
        }

        let len = buf.len() as u64;
        if addr.checked_add(len).is_none() {
            return Err(TagError::AddressOverflow { addr });
        }

        let Ok(at) = usize::try_from(addr) else {
            return Err(TagError::Unmapped { addr });
        };

        // SAFETY: the constructor's contract makes `addr..addr + len` readable.
        unsafe {
            ptr::copy_nonoverlapping(
                ptr::with_exposed_provenance::<u8>(at),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }

        Ok(())
    }
}
