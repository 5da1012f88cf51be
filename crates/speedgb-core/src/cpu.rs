use log::warn;
use serde::{Deserialize, Serialize};

use crate::{input::Buttons, mmu::Mmu};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
const FLAG_Z: u8 = 0x80;
const FLAG_N: u8 = 0x40;
const FLAG_H: u8 = 0x20;
const FLAG_C: u8 = 0x10;

const INTERRUPT_VECTOR_BASE: u16 = 0x40;

const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    pub ime: bool,
    /// EI takes effect after the following instruction.
    ei_pending: bool,
    pub halted: bool,
    halt_bug: bool,
    pub stopped: bool,
    /// Set by an illegal opcode; the CPU never fetches again.
    pub locked: bool,
    /// M-cycles executed since power-on.
    pub cycles: u64,
}

impl Cpu {
    /// Register file at power-on, for executing a boot ROM from 0x0000.
    pub fn power_on() -> Self {
        Self::default()
    }

    /// Register file as the boot ROM leaves it.
    pub fn post_boot(cgb: bool, gba: bool) -> Self {
        let mut cpu = Self {
            pc: BOOT_PC,
            sp: BOOT_SP,
            ..Self::default()
        };
        if cgb {
            (cpu.a, cpu.f) = (0x11, 0x80);
            (cpu.b, cpu.c) = (0x00, 0x00);
            (cpu.d, cpu.e) = (0xFF, 0x56);
            (cpu.h, cpu.l) = (0x00, 0x0D);
            if gba {
                // Software detects a GBA through bit 0 of B.
                cpu.b |= 0x01;
            }
        } else {
            (cpu.a, cpu.f) = (0x01, 0xB0);
            (cpu.b, cpu.c) = (0x00, 0x13);
            (cpu.d, cpu.e) = (0x00, 0xD8);
            (cpu.h, cpu.l) = (0x01, 0x4D);
        }
        cpu
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    fn set_hl(&mut self, val: u16) {
        [self.h, self.l] = val.to_be_bytes();
    }

    /// BC, DE, HL, SP.
    fn rp(&self, idx: u8) -> u16 {
        match idx {
            0 => u16::from_be_bytes([self.b, self.c]),
            1 => u16::from_be_bytes([self.d, self.e]),
            2 => self.hl(),
            _ => self.sp,
        }
    }

    fn set_rp(&mut self, idx: u8, val: u16) {
        match idx {
            0 => [self.b, self.c] = val.to_be_bytes(),
            1 => [self.d, self.e] = val.to_be_bytes(),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    /// BC, DE, HL, AF (PUSH/POP encoding).
    fn rp2(&self, idx: u8) -> u16 {
        match idx {
            3 => u16::from_be_bytes([self.a, self.f]),
            _ => self.rp(idx),
        }
    }

    fn set_rp2(&mut self, idx: u8, val: u16) {
        match idx {
            3 => {
                let [a, f] = val.to_be_bytes();
                self.a = a;
                self.f = f & 0xF0;
            }
            _ => self.set_rp(idx, val),
        }
    }

    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    fn condition(&self, cc: u8) -> bool {
        match cc & 0x03 {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            _ => self.flag(FLAG_C),
        }
    }

    #[inline]
    fn tick(&mut self, mmu: &mut Mmu) {
        mmu.tick();
        self.cycles += 1;
    }

    fn read8(&mut self, mmu: &mut Mmu, addr: u16) -> u8 {
        let val = mmu.read(addr);
        self.tick(mmu);
        val
    }

    fn write8(&mut self, mmu: &mut Mmu, addr: u16, val: u8) {
        mmu.write(addr, val);
        self.tick(mmu);
    }

    fn fetch8(&mut self, mmu: &mut Mmu) -> u8 {
        let val = self.read8(mmu, self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = self.fetch8(mmu);
        let hi = self.fetch8(mmu);
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, mmu: &mut Mmu, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        self.sp = self.sp.wrapping_sub(1);
        self.write8(mmu, self.sp, hi);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(mmu, self.sp, lo);
    }

    fn pop(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = self.read8(mmu, self.sp);
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read8(mmu, self.sp);
        self.sp = self.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// B, C, D, E, H, L, (HL), A.
    fn reg(&mut self, mmu: &mut Mmu, idx: u8) -> u8 {
        match idx {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => self.read8(mmu, self.hl()),
            _ => self.a,
        }
    }

    fn set_reg(&mut self, mmu: &mut Mmu, idx: u8, val: u8) {
        match idx {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            6 => self.write8(mmu, self.hl(), val),
            _ => self.a = val,
        }
    }

    /// Dispatch the highest-priority pending interrupt. Returns true if one
    /// was taken.
    fn service_interrupts(&mut self, mmu: &mut Mmu) -> bool {
        let pending = mmu.if_reg & mmu.ie_reg & 0x1F;
        if pending == 0 || !self.ime {
            return false;
        }
        self.ime = false;
        self.halted = false;
        self.tick(mmu);
        self.tick(mmu);
        self.push(mmu, self.pc);
        let bit = pending & pending.wrapping_neg();
        mmu.if_reg &= !bit;
        self.pc = INTERRUPT_VECTOR_BASE + 8 * bit.trailing_zeros() as u16;
        self.tick(mmu);
        true
    }

    /// Execute one instruction, one idle M-cycle while halted or stopped, or
    /// one interrupt dispatch.
    pub fn step(&mut self, mmu: &mut Mmu) {
        if self.locked {
            self.tick(mmu);
            return;
        }
        if self.service_interrupts(mmu) {
            return;
        }
        if self.halted {
            self.tick(mmu);
            if mmu.if_reg & mmu.ie_reg & 0x1F != 0 {
                self.halted = false;
            }
            return;
        }
        if self.stopped {
            self.tick(mmu);
            if mmu.joypad.buttons() != Buttons::empty() {
                self.stopped = false;
            }
            return;
        }

        let enable_ime = std::mem::take(&mut self.ei_pending);
        let opcode = self.read8(mmu, self.pc);
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.pc = self.pc.wrapping_add(1);
        }

        #[cfg(feature = "cpu-trace")]
        log::trace!(
            "PC:{:04X} OP:{opcode:02X} AF:{:02X}{:02X} BC:{:04X} DE:{:04X} HL:{:04X} SP:{:04X}",
            self.pc.wrapping_sub(1),
            self.a,
            self.f,
            self.rp(0),
            self.rp(1),
            self.hl(),
            self.sp
        );

        self.execute(opcode, mmu);

        // DI right after EI cancels the pending enable.
        if enable_ime && opcode != 0xF3 {
            self.ime = true;
        }

        for _ in 0..mmu.take_dma_stall() {
            self.tick(mmu);
        }
    }

    fn execute(&mut self, opcode: u8, mmu: &mut Mmu) {
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = y >> 1;

        match opcode {
            0x00 => {}
            0x08 => {
                let addr = self.fetch16(mmu);
                let [hi, lo] = self.sp.to_be_bytes();
                self.write8(mmu, addr, lo);
                self.write8(mmu, addr.wrapping_add(1), hi);
            }
            0x10 => self.stop(mmu),
            0x18 => self.jr(mmu, true),
            0x20 | 0x28 | 0x30 | 0x38 => {
                let taken = self.condition(y - 4);
                self.jr(mmu, taken);
            }
            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.fetch16(mmu);
                self.set_rp(p, val);
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let hl = self.hl();
                let rhs = self.rp(p);
                let (res, carry) = hl.overflowing_add(rhs);
                self.f = (self.f & FLAG_Z)
                    | if (hl & 0x0FFF) + (rhs & 0x0FFF) > 0x0FFF { FLAG_H } else { 0 }
                    | if carry { FLAG_C } else { 0 };
                self.set_hl(res);
                self.tick(mmu);
            }
            0x02 | 0x12 | 0x22 | 0x32 => {
                let addr = self.indirect_address(p);
                self.write8(mmu, addr, self.a);
            }
            0x0A | 0x1A | 0x2A | 0x3A => {
                let addr = self.indirect_address(p);
                self.a = self.read8(mmu, addr);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                self.set_rp(p, self.rp(p).wrapping_add(1));
                self.tick(mmu);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.set_rp(p, self.rp(p).wrapping_sub(1));
                self.tick(mmu);
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let val = self.reg(mmu, y);
                let res = val.wrapping_add(1);
                self.f = (self.f & FLAG_C)
                    | if res == 0 { FLAG_Z } else { 0 }
                    | if val & 0x0F == 0x0F { FLAG_H } else { 0 };
                self.set_reg(mmu, y, res);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let val = self.reg(mmu, y);
                let res = val.wrapping_sub(1);
                self.f = (self.f & FLAG_C)
                    | FLAG_N
                    | if res == 0 { FLAG_Z } else { 0 }
                    | if val & 0x0F == 0 { FLAG_H } else { 0 };
                self.set_reg(mmu, y, res);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let val = self.fetch8(mmu);
                self.set_reg(mmu, y, val);
            }
            0x07 | 0x0F | 0x17 | 0x1F => {
                // RLCA/RRCA/RLA/RRA always clear Z.
                let res = self.rotate(y, self.a);
                self.a = res;
                self.f &= FLAG_C;
            }
            0x27 => self.daa(),
            0x2F => {
                self.a = !self.a;
                self.f = (self.f & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H;
            }
            0x37 => self.f = (self.f & FLAG_Z) | FLAG_C,
            0x3F => self.f = (self.f & (FLAG_Z | FLAG_C)) ^ FLAG_C,
            0x76 => self.halt(mmu),
            0x40..=0x7F => {
                let val = self.reg(mmu, z);
                self.set_reg(mmu, y, val);
            }
            0x80..=0xBF => {
                let val = self.reg(mmu, z);
                self.alu(y, val);
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                self.tick(mmu);
                if self.condition(y) {
                    self.pc = self.pop(mmu);
                    self.tick(mmu);
                }
            }
            0xC9 | 0xD9 => {
                self.pc = self.pop(mmu);
                self.tick(mmu);
                if opcode == 0xD9 {
                    self.ime = true;
                }
            }
            0xE0 => {
                let addr = 0xFF00 | self.fetch8(mmu) as u16;
                self.write8(mmu, addr, self.a);
            }
            0xF0 => {
                let addr = 0xFF00 | self.fetch8(mmu) as u16;
                self.a = self.read8(mmu, addr);
            }
            0xE2 => self.write8(mmu, 0xFF00 | self.c as u16, self.a),
            0xF2 => self.a = self.read8(mmu, 0xFF00 | self.c as u16),
            0xEA => {
                let addr = self.fetch16(mmu);
                self.write8(mmu, addr, self.a);
            }
            0xFA => {
                let addr = self.fetch16(mmu);
                self.a = self.read8(mmu, addr);
            }
            0xE8 => {
                let sum = self.sp_plus_offset(mmu);
                self.tick(mmu);
                self.tick(mmu);
                self.sp = sum;
            }
            0xF8 => {
                let sum = self.sp_plus_offset(mmu);
                self.tick(mmu);
                self.set_hl(sum);
            }
            0xF9 => {
                self.sp = self.hl();
                self.tick(mmu);
            }
            0xE9 => self.pc = self.hl(),
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let val = self.pop(mmu);
                self.set_rp2(p, val);
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                self.tick(mmu);
                self.push(mmu, self.rp2(p));
            }
            0xC3 => {
                let target = self.fetch16(mmu);
                self.pc = target;
                self.tick(mmu);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let target = self.fetch16(mmu);
                if self.condition(y) {
                    self.pc = target;
                    self.tick(mmu);
                }
            }
            0xCD => self.call(mmu, true),
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let taken = self.condition(y);
                self.call(mmu, taken);
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.tick(mmu);
                self.push(mmu, self.pc);
                self.pc = y as u16 * 8;
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.fetch8(mmu);
                self.alu(y, val);
            }
            0xCB => {
                let cb = self.fetch8(mmu);
                self.execute_cb(cb, mmu);
            }
            0xF3 => {
                self.ime = false;
                self.ei_pending = false;
            }
            0xFB => self.ei_pending = true,
            _ => {
                warn!(
                    "CPU locked up on illegal opcode {opcode:02X} at {:04X}",
                    self.pc.wrapping_sub(1)
                );
                self.locked = true;
            }
        }
    }

    fn indirect_address(&mut self, p: u8) -> u16 {
        match p {
            0 => self.rp(0),
            1 => self.rp(1),
            2 => {
                let hl = self.hl();
                self.set_hl(hl.wrapping_add(1));
                hl
            }
            _ => {
                let hl = self.hl();
                self.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn jr(&mut self, mmu: &mut Mmu, taken: bool) {
        let offset = self.fetch8(mmu) as i8;
        if taken {
            self.pc = self.pc.wrapping_add_signed(offset as i16);
            self.tick(mmu);
        }
    }

    fn call(&mut self, mmu: &mut Mmu, taken: bool) {
        let target = self.fetch16(mmu);
        if taken {
            self.tick(mmu);
            self.push(mmu, self.pc);
            self.pc = target;
        }
    }

    fn sp_plus_offset(&mut self, mmu: &mut Mmu) -> u16 {
        let offset = self.fetch8(mmu);
        let sp = self.sp;
        let low = (sp & 0x00FF) as u8;
        self.f = if (low & 0x0F) + (offset & 0x0F) > 0x0F { FLAG_H } else { 0 }
            | if low.overflowing_add(offset).1 { FLAG_C } else { 0 };
        sp.wrapping_add_signed(offset as i8 as i16)
    }

    fn halt(&mut self, mmu: &mut Mmu) {
        let pending = mmu.if_reg & mmu.ie_reg & 0x1F != 0;
        if !self.ime && pending {
            // HALT bug: the next opcode byte is read twice.
            self.halt_bug = true;
        } else {
            self.halted = true;
        }
    }

    fn stop(&mut self, mmu: &mut Mmu) {
        let _ = self.fetch8(mmu);
        if !mmu.try_speed_switch() {
            self.stopped = true;
        }
    }

    fn alu(&mut self, op: u8, val: u8) {
        let a = self.a;
        let carry_in = self.flag(FLAG_C) as u8;
        match op {
            0 | 1 => {
                let c = if op == 1 { carry_in } else { 0 };
                let res = a as u16 + val as u16 + c as u16;
                self.a = res as u8;
                self.f = if self.a == 0 { FLAG_Z } else { 0 }
                    | if (a & 0x0F) + (val & 0x0F) + c > 0x0F { FLAG_H } else { 0 }
                    | if res > 0xFF { FLAG_C } else { 0 };
            }
            2 | 3 | 7 => {
                let c = if op == 3 { carry_in } else { 0 };
                let res = a as i16 - val as i16 - c as i16;
                self.f = FLAG_N
                    | if res as u8 == 0 { FLAG_Z } else { 0 }
                    | if (a & 0x0F) < (val & 0x0F) + c { FLAG_H } else { 0 }
                    | if res < 0 { FLAG_C } else { 0 };
                if op != 7 {
                    self.a = res as u8;
                }
            }
            4 => {
                self.a &= val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 } | FLAG_H;
            }
            5 => {
                self.a ^= val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
            _ => {
                self.a |= val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
        }
    }

    /// RLC, RRC, RL, RR, SLA, SRA, SWAP, SRL. Sets Z and C; clears N and H.
    fn rotate(&mut self, op: u8, val: u8) -> u8 {
        let carry_in = self.flag(FLAG_C) as u8;
        let (res, carry) = match op {
            0 => (val.rotate_left(1), val & 0x80 != 0),
            1 => (val.rotate_right(1), val & 0x01 != 0),
            2 => ((val << 1) | carry_in, val & 0x80 != 0),
            3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            4 => (val << 1, val & 0x80 != 0),
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            6 => (val.rotate_left(4), false),
            _ => (val >> 1, val & 0x01 != 0),
        };
        self.f = if res == 0 { FLAG_Z } else { 0 } | if carry { FLAG_C } else { 0 };
        res
    }

    fn execute_cb(&mut self, opcode: u8, mmu: &mut Mmu) {
        let bit = (opcode >> 3) & 0x07;
        let r = opcode & 0x07;
        let val = self.reg(mmu, r);
        match opcode >> 6 {
            0 => {
                let res = self.rotate(bit, val);
                self.set_reg(mmu, r, res);
            }
            1 => {
                self.f = (self.f & FLAG_C)
                    | FLAG_H
                    | if val & (1 << bit) == 0 { FLAG_Z } else { 0 };
            }
            2 => self.set_reg(mmu, r, val & !(1 << bit)),
            _ => self.set_reg(mmu, r, val | (1 << bit)),
        }
    }

    fn daa(&mut self) {
        let subtract = self.flag(FLAG_N);
        let mut carry = self.flag(FLAG_C);
        let mut adjust = 0u8;
        if self.flag(FLAG_H) || (!subtract && self.a & 0x0F > 0x09) {
            adjust |= 0x06;
        }
        if carry || (!subtract && self.a > 0x99) {
            adjust |= 0x60;
            carry = true;
        }
        self.a = if subtract {
            self.a.wrapping_sub(adjust)
        } else {
            self.a.wrapping_add(adjust)
        };
        self.f = if self.a == 0 { FLAG_Z } else { 0 }
            | (self.f & FLAG_N)
            | if carry { FLAG_C } else { 0 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cartridge::Cartridge, hardware::LoadFlags};

    fn machine(program: &[u8]) -> (Cpu, Mmu) {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
        let cart = Cartridge::from_bytes(rom, LoadFlags::empty()).unwrap();
        (Cpu::post_boot(false, false), Mmu::new(cart, false))
    }

    #[test]
    fn post_boot_registers() {
        let dmg = Cpu::post_boot(false, true);
        assert_eq!((dmg.a, dmg.f, dmg.b), (0x01, 0xB0, 0x00), "GBA flag ignored on DMG");
        let cgb = Cpu::post_boot(true, false);
        assert_eq!((cgb.a, cgb.b), (0x11, 0x00));
        let gba = Cpu::post_boot(true, true);
        assert_eq!(gba.b, 0x01);
        assert_eq!((gba.pc, gba.sp), (0x0100, 0xFFFE));
    }

    #[test]
    fn add_sets_half_carry_and_carry() {
        // LD A,0x8F; ADD A,0x81
        let (mut cpu, mut mmu) = machine(&[0x3E, 0x8F, 0xC6, 0x81]);
        cpu.step(&mut mmu);
        cpu.step(&mut mmu);
        assert_eq!(cpu.a, 0x10);
        assert_eq!(cpu.f, FLAG_H | FLAG_C);
    }

    #[test]
    fn daa_after_bcd_addition() {
        // LD A,0x19; ADD A,0x28; DAA
        let (mut cpu, mut mmu) = machine(&[0x3E, 0x19, 0xC6, 0x28, 0x27]);
        for _ in 0..3 {
            cpu.step(&mut mmu);
        }
        assert_eq!(cpu.a, 0x47);
    }

    #[test]
    fn call_and_ret_take_documented_cycles() {
        // CALL 0x0110 ... at 0x0110: RET
        let mut program = vec![0xCD, 0x10, 0x01];
        program.resize(0x10, 0x00);
        program.push(0xC9);
        let (mut cpu, mut mmu) = machine(&program);
        cpu.step(&mut mmu);
        assert_eq!(cpu.pc, 0x0110);
        assert_eq!(cpu.cycles, 6);
        cpu.step(&mut mmu);
        assert_eq!(cpu.pc, 0x0103);
        assert_eq!(cpu.cycles, 10);
        assert_eq!(cpu.sp, 0xFFFE);
    }

    #[test]
    fn push_pop_af_masks_low_flags() {
        // LD BC,0x12FF; PUSH BC; POP AF
        let (mut cpu, mut mmu) = machine(&[0x01, 0xFF, 0x12, 0xC5, 0xF1]);
        for _ in 0..3 {
            cpu.step(&mut mmu);
        }
        assert_eq!(cpu.a, 0x12);
        assert_eq!(cpu.f, 0xF0);
    }

    #[test]
    fn cb_bit_and_swap() {
        // LD B,0xF0; SWAP B; BIT 7,B
        let (mut cpu, mut mmu) = machine(&[0x06, 0xF0, 0xCB, 0x30, 0xCB, 0x78]);
        for _ in 0..3 {
            cpu.step(&mut mmu);
        }
        assert_eq!(cpu.b, 0x0F);
        assert_eq!(cpu.f & FLAG_Z, FLAG_Z);
        assert_eq!(cpu.f & FLAG_H, FLAG_H);
    }

    #[test]
    fn ei_delays_by_one_instruction() {
        // EI; NOP
        let (mut cpu, mut mmu) = machine(&[0xFB, 0x00, 0x00]);
        mmu.ie_reg = 0x04;
        mmu.if_reg = 0x04;
        cpu.step(&mut mmu);
        assert!(!cpu.ime);
        cpu.step(&mut mmu);
        assert!(cpu.ime);
        assert_eq!(cpu.pc, 0x0102);
        cpu.step(&mut mmu);
        assert_eq!(cpu.pc, 0x0050, "timer vector");
        assert_eq!(mmu.if_reg & 0x04, 0);
    }

    #[test]
    fn halt_wakes_without_ime() {
        // HALT; INC A
        let (mut cpu, mut mmu) = machine(&[0x76, 0x3C]);
        cpu.step(&mut mmu);
        assert!(cpu.halted);
        mmu.ie_reg = 0x01;
        mmu.if_reg = 0x01;
        cpu.step(&mut mmu);
        assert!(!cpu.halted);
        cpu.step(&mut mmu);
        assert_eq!(cpu.a, 0x02);
    }

    #[test]
    fn halt_bug_repeats_next_byte() {
        // HALT with IME off and an interrupt already pending; INC A runs twice.
        let (mut cpu, mut mmu) = machine(&[0x76, 0x3C, 0x00]);
        mmu.ie_reg = 0x01;
        mmu.if_reg = 0x01;
        for _ in 0..3 {
            cpu.step(&mut mmu);
        }
        assert_eq!(cpu.a, 0x03);
        assert_eq!(cpu.pc, 0x0102);
    }

    #[test]
    fn illegal_opcode_locks_cpu() {
        let (mut cpu, mut mmu) = machine(&[0xD3, 0x3C]);
        cpu.step(&mut mmu);
        assert!(cpu.locked);
        cpu.step(&mut mmu);
        assert_eq!(cpu.pc, 0x0101);
        assert_eq!(cpu.a, 0x01);
    }
}
