use serde::{Deserialize, Serialize};

use crate::mmu::INT_SERIAL;

/// SB/SC registers with nothing plugged into the link port.
///
/// Internally clocked transfers shift in 1s and finish after eight bit
/// periods. Externally clocked transfers never see a clock and stay pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Serial {
    sb: u8,
    sc: u8,
    cgb: bool,
    transfer: Option<Transfer>,
    /// Bytes sent by completed transfers, for test harnesses.
    #[serde(skip)]
    out_buf: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Transfer {
    outgoing: u8,
    bits_left: u8,
    cycles_to_next_bit: u32,
}

impl Serial {
    pub fn new(cgb: bool) -> Self {
        Self {
            sb: 0,
            sc: if cgb { 0x7F } else { 0x7E },
            cgb,
            transfer: None,
            out_buf: Vec::new(),
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 if self.cgb => self.sc | 0x7C,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val;
                self.transfer = (val & 0x81 == 0x81).then(|| Transfer {
                    outgoing: self.sb,
                    bits_left: 8,
                    cycles_to_next_bit: self.bit_period(),
                });
            }
            _ => {}
        }
    }

    fn bit_period(&self) -> u32 {
        // 8192 Hz, or 262144 Hz with the CGB fast clock bit.
        if self.cgb && self.sc & 0x02 != 0 {
            16
        } else {
            512
        }
    }

    /// Advance by `cycles` CPU clocks.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        let period = self.bit_period();
        let Some(transfer) = self.transfer.as_mut() else {
            return;
        };
        let mut cycles = cycles;
        while cycles >= transfer.cycles_to_next_bit {
            cycles -= transfer.cycles_to_next_bit;
            transfer.cycles_to_next_bit = period;
            self.sb = (self.sb << 1) | 1;
            transfer.bits_left -= 1;
            if transfer.bits_left == 0 {
                self.out_buf.push(transfer.outgoing);
                self.transfer = None;
                self.sc &= 0x7F;
                *if_reg |= INT_SERIAL;
                return;
            }
        }
        transfer.cycles_to_next_bit -= cycles;
    }

    pub(crate) fn check(&self, cgb: bool) -> Result<(), &'static str> {
        if self.cgb != cgb {
            return Err("serial model");
        }
        match &self.transfer {
            Some(t) if !(1..=8).contains(&t.bits_left) => Err("serial transfer"),
            _ => Ok(()),
        }
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_transfer_reads_ff_and_interrupts() {
        let mut serial = Serial::new(false);
        let mut if_reg = 0;
        serial.write(0xFF01, 0x42);
        serial.write(0xFF02, 0x81);

        serial.step(512 * 7, &mut if_reg);
        assert_ne!(serial.read(0xFF02) & 0x80, 0);
        assert_eq!(if_reg, 0);

        serial.step(512, &mut if_reg);
        assert_eq!(serial.read(0xFF02) & 0x80, 0);
        assert_eq!(serial.read(0xFF01), 0xFF);
        assert_eq!(if_reg & INT_SERIAL, INT_SERIAL);
        assert_eq!(serial.take_output(), vec![0x42]);
    }

    #[test]
    fn external_clock_never_completes() {
        let mut serial = Serial::new(false);
        let mut if_reg = 0;
        serial.write(0xFF02, 0x80);
        serial.step(100_000, &mut if_reg);
        assert_ne!(serial.read(0xFF02) & 0x80, 0);
        assert_eq!(if_reg, 0);
    }

    #[test]
    fn cgb_fast_clock_is_32_times_faster() {
        let mut serial = Serial::new(true);
        let mut if_reg = 0;
        serial.write(0xFF02, 0x83);
        serial.step(16 * 8, &mut if_reg);
        assert_eq!(if_reg & INT_SERIAL, INT_SERIAL);
    }

    #[test]
    fn check_rejects_finished_transfer_left_pending() {
        let mut serial = Serial::new(false);
        serial.write(0xFF02, 0x81);
        assert_eq!(serial.check(false), Ok(()));
        assert_eq!(serial.check(true), Err("serial model"));
        if let Some(transfer) = serial.transfer.as_mut() {
            transfer.bits_left = 0;
        }
        assert_eq!(serial.check(false), Err("serial transfer"));
    }
}
