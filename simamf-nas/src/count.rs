//! NAS COUNT replay counter
//!
//! A 24-bit value: 16-bit overflow counter in the upper bits and the
//! 8-bit NAS sequence number in the low byte.

use std::fmt;

const COUNT_MASK: u32 = 0x00FF_FFFF;

#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct NasCount(u32);

impl NasCount {
    pub const fn new() -> Self {
        Self(0)
    }

    /// Builds a count from its overflow and sequence number parts.
    pub fn from_parts(overflow: u16, sqn: u8) -> Self {
        let mut count = Self::new();
        count.set(overflow, sqn);
        count
    }

    /// Full 24-bit value, as fed to the NIA/NEA COUNT input.
    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn set(&mut self, overflow: u16, sqn: u8) {
        self.0 = (((overflow as u32) << 8) | sqn as u32) & COUNT_MASK;
    }

    pub fn sqn(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn set_sqn(&mut self, sqn: u8) {
        self.0 = (self.0 & 0x00FF_FF00) | sqn as u32;
    }

    pub fn overflow(&self) -> u16 {
        ((self.0 & 0x00FF_FF00) >> 8) as u16
    }

    pub fn set_overflow(&mut self, overflow: u16) {
        self.0 = ((overflow as u32) << 8 | (self.0 & 0xFF)) & COUNT_MASK;
    }

    /// Increments by one, wrapping at 2^24.
    pub fn add_one(&mut self) {
        self.0 = self.0.wrapping_add(1) & COUNT_MASK;
    }

    /// Adopts a received sequence number.
    ///
    /// A value numerically below the stored one means the sender wrapped,
    /// so the overflow advances first. The count never moves backwards.
    pub fn observe_sqn(&mut self, sqn: u8) {
        if self.sqn() > sqn {
            self.set_overflow(self.overflow().wrapping_add(1));
        }
        self.set_sqn(sqn);
    }

    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

impl fmt::Debug for NasCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NasCount(overflow={}, sqn={})", self.overflow(), self.sqn())
    }
}
