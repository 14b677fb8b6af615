//! Interrupt-flag management: the irqsave/irqrestore pattern.

use x86_64::instructions::interrupts;
use x86_64::registers::rflags::{self, RFlags};

/// Save RFLAGS and disable interrupts. Returns the saved flags for a later
/// [`restore_flags`].
#[inline(always)]
pub fn save_flags_cli() -> u64 {
    let flags = rflags::read_raw();
    interrupts::disable();
    flags
}

/// Restore the interrupt flag from a value saved by [`save_flags_cli`].
/// Interrupts are re-enabled only if they were enabled at save time.
#[inline(always)]
pub fn restore_flags(saved: u64) {
    if RFlags::from_bits_truncate(saved).contains(RFlags::INTERRUPT_FLAG) {
        interrupts::enable();
    }
}

/// Returns true if interrupts are currently enabled.
#[inline(always)]
pub fn interrupts_enabled() -> bool {
    rflags::read().contains(RFlags::INTERRUPT_FLAG)
}
