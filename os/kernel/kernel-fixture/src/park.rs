//! Terminal state of the entry point.

/// Stops making progress without ever returning.
///
/// Interrupts are disabled and the processor halts; an NMI that wakes it
/// goes straight back to sleep. With the `busy-park` feature the processor
/// spins instead, which keeps a vCPU busy but works where `hlt` traps.
pub fn park() -> ! {
    #[cfg(feature = "busy-park")]
    loop {
        core::hint::spin_loop();
    }

    #[cfg(not(feature = "busy-park"))]
    {
        // SAFETY: cli only masks maskable interrupts, which nothing here uses.
        unsafe {
            core::arch::asm!("cli", options(nomem, nostack));
        }

        loop {
            // SAFETY: hlt with interrupts off waits for an NMI or reset.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack, preserves_flags));
            }
        }
    }
}
