use serde::{Deserialize, Serialize};

use crate::{input::Buttons, mmu::INT_JOYPAD};

/// P1/JOYP register. Button state only changes when the session latches new
/// input, once per frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Joypad {
    /// Select bits 4-5 as last written.
    select: u8,
    /// Currently latched buttons, active high.
    pressed: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            pressed: 0,
        }
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.lines()
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    pub fn buttons(&self) -> Buttons {
        Buttons::from_bits_truncate(self.pressed)
    }

    /// Latch a new button state. Raises the joypad interrupt when a selected
    /// line goes low.
    pub fn latch(&mut self, buttons: Buttons, if_reg: &mut u8) {
        let before = self.lines();
        self.pressed = buttons.bits();
        let after = self.lines();
        if before & !after != 0 {
            *if_reg |= INT_JOYPAD;
        }
    }

    /// Low nibble of P1 (0 = pressed) for the selected groups.
    fn lines(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & 0x10 == 0 {
            // Direction keys live in the high nibble of `Buttons`.
            low &= !(self.pressed >> 4) & 0x0F;
        }
        if self.select & 0x20 == 0 {
            low &= !self.pressed & 0x0F;
        }
        low
    }
}
