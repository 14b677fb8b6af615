//! Raw port I/O for the early-boot serial console.

use x86_64::instructions::port::Port;

pub const COM1: u16 = 0x3F8;

const LSR_OFFSET: u16 = 5;
const LSR_THR_EMPTY: u8 = 0x20;

/// Write `bytes` to the serial port at `base`, waiting for the transmit
/// holding register between bytes.
///
/// # Safety
///
/// `base` must be the base of a 16550-compatible UART that no driver
/// currently owns. Intended for pre-driver boot output only.
pub unsafe fn serial_write_bytes(base: u16, bytes: &[u8]) {
    let mut thr: Port<u8> = Port::new(base);
    let mut lsr: Port<u8> = Port::new(base + LSR_OFFSET);
    for &byte in bytes {
        while lsr.read() & LSR_THR_EMPTY == 0 {
            core::hint::spin_loop();
        }
        thr.write(byte);
    }
}
