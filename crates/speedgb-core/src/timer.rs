use serde::{Deserialize, Serialize};

use crate::mmu::INT_TIMER;

/// Cycles between a TIMA overflow and the TMA reload.
const RELOAD_DELAY: u8 = 4;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timer {
    /// 16-bit system counter, advanced once per CPU clock. DIV is the upper
    /// byte.
    pub div: u16,
    pub tima: u8,
    pub tma: u8,
    pub tac: u8,
    /// Output of the TAC-selected divider bit, ANDed with the enable bit.
    last_signal: bool,
    /// Cycles left until TIMA is reloaded from TMA after an overflow.
    reload_in: Option<u8>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => {
                self.div = 0;
                self.update_signal();
            }
            0xFF05 => {
                // Writing during the delay cancels the pending reload.
                self.tima = val;
                self.reload_in = None;
            }
            0xFF06 => self.tma = val,
            0xFF07 => {
                self.tac = val & 0x07;
                self.update_signal();
            }
            _ => {}
        }
    }

    /// Advance by `cycles` CPU clocks.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        for _ in 0..cycles {
            if let Some(left) = self.reload_in {
                if left <= 1 {
                    self.reload_in = None;
                    self.tima = self.tma;
                    *if_reg |= INT_TIMER;
                } else {
                    self.reload_in = Some(left - 1);
                }
            }
            self.div = self.div.wrapping_add(1);
            self.update_signal();
        }
    }

    fn update_signal(&mut self) {
        let signal = Self::signal_with(self.div, self.tac);
        if self.last_signal && !signal {
            self.increment();
        }
        self.last_signal = signal;
    }

    fn increment(&mut self) {
        let (next, overflow) = self.tima.overflowing_add(1);
        self.tima = next;
        if overflow {
            self.reload_in = Some(RELOAD_DELAY);
        }
    }

    fn signal_with(div: u16, tac: u8) -> bool {
        if tac & 0x04 == 0 {
            return false;
        }
        let bit = match tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        };
        (div >> bit) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn div_counts_every_256_cycles() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        timer.step(256 * 3, &mut if_reg);
        assert_eq!(timer.read(0xFF04), 3);
        timer.write(0xFF04, 0x55);
        assert_eq!(timer.read(0xFF04), 0);
    }

    #[test]
    fn overflow_reloads_after_delay() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        timer.write(0xFF06, 0xAB);
        timer.write(0xFF07, 0x05);
        timer.write(0xFF05, 0xFF);
        timer.step(16, &mut if_reg);
        assert_eq!(timer.tima, 0);
        assert_eq!(if_reg & INT_TIMER, 0);
        timer.step(RELOAD_DELAY as u32, &mut if_reg);
        assert_eq!(timer.tima, 0xAB);
        assert_ne!(if_reg & INT_TIMER, 0);
    }

    #[test]
    fn div_reset_can_clock_tima() {
        let mut timer = Timer::new();
        let mut if_reg = 0;
        timer.write(0xFF07, 0x05);
        timer.step(8, &mut if_reg);
        let before = timer.tima;
        // Bit 3 of the divider is high; clearing DIV produces a falling edge.
        timer.write(0xFF04, 0);
        assert_eq!(timer.tima, before.wrapping_add(1));
    }
}
