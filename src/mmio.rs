//! Memory-mapped register access
//!
//! Drivers in this crate never touch a fixed physical address. Each driver
//! instance owns a [`Registers`] implementation for its own register window
//! and every register access goes through it, so the same driver runs against
//! real hardware ([`Mmio`]) or a recording fake in host tests.

use core::ptr::{read_volatile, write_volatile};

/// A window of 32-bit registers, addressed by byte offset.
pub trait Registers {
    /// Read the register at byte `offset`.
    fn read(&self, offset: usize) -> u32;

    /// Write `value` to the register at byte `offset`.
    fn write(&self, offset: usize, value: u32);

    /// Read-modify-write the register at byte `offset`, returning the value written.
    ///
    /// This is not atomic. A register shared between execution contexts must
    /// only be modified from inside a critical section.
    fn modify<F>(&self, offset: usize, f: F) -> u32
    where
        F: FnOnce(u32) -> u32,
    {
        let value = f(self.read(offset));
        self.write(offset, value);
        value
    }
}

/// Register window backed by physical memory.
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Wrap the register block mapped at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be the word-aligned address of a mapped register block that
    /// covers every offset the owning driver accesses, and no other driver may
    /// access the same block while the returned value is alive.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Base address of the window.
    pub fn base(&self) -> usize {
        self.base
    }
}

impl Registers for Mmio {
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `Mmio::new` requires the window to be mapped and exclusively owned
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    #[inline]
    fn write(&self, offset: usize, value: u32) {
        // SAFETY: `Mmio::new` requires the window to be mapped and exclusively owned
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}
