use log::debug;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{
    apu::Apu,
    cartridge::Cartridge,
    input::Buttons,
    joypad::Joypad,
    ppu::{Mode, Ppu},
    serial::Serial,
    timer::Timer,
};

pub const INT_VBLANK: u8 = 0x01;
pub const INT_STAT: u8 = 0x02;
pub const INT_TIMER: u8 = 0x04;
pub const INT_SERIAL: u8 = 0x08;
pub const INT_JOYPAD: u8 = 0x10;

const WRAM_BANK_SIZE: usize = 0x1000;
const HRAM_SIZE: usize = 0x7F;
const OAM_DMA_LEN: u16 = 0xA0;
const HDMA_BLOCK: u16 = 0x10;
/// M-cycles the CPU is held per 16-byte VRAM DMA block at normal speed.
const HDMA_BLOCK_MCYCLES: u32 = 8;

/// Divider bit whose falling edge clocks the APU frame sequencer.
const SEQUENCER_DIV_BIT: u16 = 1 << 12;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct VramDma {
    src: u16,
    dst: u16,
    /// Blocks still to copy in HBlank mode.
    blocks_left: u8,
    hblank_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Mmu {
    pub cart: Cartridge,
    #[serde(skip)]
    pub boot_rom: Option<Vec<u8>>,
    pub boot_mapped: bool,
    pub wram: Vec<u8>,
    pub(crate) wram_bank: usize,
    #[serde(with = "BigArray")]
    pub hram: [u8; HRAM_SIZE],
    pub if_reg: u8,
    pub ie_reg: u8,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub serial: Serial,
    pub joypad: Joypad,
    cgb: bool,
    key1: u8,
    oam_dma_reg: u8,
    vram_dma: VramDma,
    /// M-cycles the CPU must idle for VRAM DMA that already happened.
    dma_stall: u32,
    /// Base-clock dots emulated since power-on.
    dots: u64,
}

impl Mmu {
    pub fn new(cart: Cartridge, cgb: bool) -> Self {
        Self {
            cart,
            boot_rom: None,
            boot_mapped: false,
            wram: vec![0; WRAM_BANK_SIZE * if cgb { 8 } else { 2 }],
            wram_bank: 1,
            hram: [0; HRAM_SIZE],
            if_reg: 0,
            ie_reg: 0,
            ppu: Ppu::new(cgb),
            apu: Apu::new(),
            timer: Timer::new(),
            serial: Serial::new(cgb),
            joypad: Joypad::new(),
            cgb,
            key1: 0,
            oam_dma_reg: 0xFF,
            vram_dma: VramDma::default(),
            dma_stall: 0,
            dots: 0,
        }
    }

    /// Map a boot ROM over the cartridge until FF50 is written.
    pub fn map_boot_rom(&mut self, data: Vec<u8>) {
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    /// I/O state left behind by the boot ROM, for starting without one.
    pub fn apply_boot_state(&mut self) {
        self.boot_mapped = false;
        self.if_reg = INT_VBLANK;
        self.timer.div = if self.cgb { 0x1EA0 } else { 0xABCC };
        self.ppu.set_cgb_features(self.cart.cgb);
        self.ppu.apply_boot_state();
        self.apu.apply_boot_state();
    }

    /// Reject restored state with banks, DMA progress or component fields
    /// that the running machine could never reach.
    pub(crate) fn check(&self, cgb: bool) -> Result<(), &'static str> {
        if self.cgb != cgb {
            return Err("model");
        }
        let wram_banks = if cgb { 8 } else { 2 };
        if self.wram.len() != WRAM_BANK_SIZE * wram_banks {
            return Err("WRAM size");
        }
        if !(1..wram_banks).contains(&self.wram_bank) {
            return Err("WRAM bank");
        }
        let dma = &self.vram_dma;
        if dma.blocks_left > 0x80 || (dma.hblank_active && dma.blocks_left == 0) {
            return Err("VRAM DMA length");
        }
        if self.dma_stall > 0x80 * 2 * HDMA_BLOCK_MCYCLES {
            return Err("DMA stall");
        }
        self.cart.check()?;
        self.ppu.check(cgb)?;
        self.apu.check()?;
        self.serial.check(cgb)
    }

    /// Give back the cartridge and boot ROM for a power cycle.
    pub fn into_media(self) -> (Cartridge, Option<Vec<u8>>) {
        (self.cart, self.boot_rom)
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn double_speed(&self) -> bool {
        self.key1 & 0x80 != 0
    }

    pub fn dots(&self) -> u64 {
        self.dots
    }

    /// Toggle CGB double speed if it was armed through KEY1. Returns true if
    /// the speed changed.
    pub fn try_speed_switch(&mut self) -> bool {
        if !self.cgb || self.key1 & 0x01 == 0 {
            return false;
        }
        self.key1 = (self.key1 ^ 0x80) & 0x80;
        self.timer.write(0xFF04, 0);
        debug!("Speed switch: double speed {}", self.double_speed());
        true
    }

    pub fn latch_input(&mut self, buttons: Buttons) {
        self.joypad.latch(buttons, &mut self.if_reg);
    }

    pub fn take_dma_stall(&mut self) -> u32 {
        std::mem::take(&mut self.dma_stall)
    }

    fn boot_byte(&self, addr: u16) -> Option<u8> {
        if !self.boot_mapped {
            return None;
        }
        let boot = self.boot_rom.as_ref()?;
        match addr {
            0x0000..=0x00FF => boot.get(addr as usize).copied(),
            // CGB boot ROMs leave the cartridge header at 0x100-0x1FF visible.
            0x0200..=0x08FF if boot.len() > 0x100 => boot.get(addr as usize).copied(),
            _ => None,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.boot_byte(addr).unwrap_or_else(|| self.cart.read(addr)),
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xA000..=0xBFFF => self.cart.read(addr),
            0xC000..=0xCFFF | 0xE000..=0xEFFF => self.wram[(addr & 0x0FFF) as usize],
            0xD000..=0xDFFF | 0xF000..=0xFDFF => {
                self.wram[self.wram_bank * WRAM_BANK_SIZE + (addr & 0x0FFF) as usize]
            }
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF46 => self.oam_dma_reg,
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6C => self.ppu.read_reg(addr),
            0xFF4D if self.cgb => self.key1 | 0x7E,
            0xFF55 if self.cgb => {
                if self.vram_dma.hblank_active {
                    self.vram_dma.blocks_left.wrapping_sub(1) & 0x7F
                } else {
                    0xFF
                }
            }
            0xFF70 if self.cgb => 0xF8 | self.wram_bank as u8,
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.write(addr, val),
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xC000..=0xCFFF | 0xE000..=0xEFFF => self.wram[(addr & 0x0FFF) as usize] = val,
            0xD000..=0xDFFF | 0xF000..=0xFDFF => {
                self.wram[self.wram_bank * WRAM_BANK_SIZE + (addr & 0x0FFF) as usize] = val
            }
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize] = val,
            0xFF00 => self.joypad.write(val),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04 => {
                let old_div = self.timer.div;
                self.timer.write(addr, val);
                if old_div & self.sequencer_bit() != 0 {
                    self.apu.clock_sequencer();
                }
            }
            0xFF05..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.if_reg = val & 0x1F,
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => self.oam_dma(val),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6C => {
                self.ppu.write_reg(addr, val, &mut self.if_reg)
            }
            0xFF4C if self.cgb && self.boot_mapped => {
                // KEY0: the CGB boot ROM drops to DMG compatibility here.
                self.ppu.set_cgb_features(val & 0x04 == 0);
            }
            0xFF4D if self.cgb => self.key1 = (self.key1 & 0x80) | (val & 0x01),
            0xFF50 => {
                if self.boot_mapped && val & 0x01 != 0 {
                    debug!("Boot ROM unmapped at dot {}", self.dots);
                    self.boot_mapped = false;
                }
            }
            0xFF51 if self.cgb => self.vram_dma.src = (self.vram_dma.src & 0x00F0) | ((val as u16) << 8),
            0xFF52 if self.cgb => self.vram_dma.src = (self.vram_dma.src & 0xFF00) | (val & 0xF0) as u16,
            0xFF53 if self.cgb => {
                self.vram_dma.dst = (self.vram_dma.dst & 0x00F0) | (((val & 0x1F) as u16) << 8)
            }
            0xFF54 if self.cgb => self.vram_dma.dst = (self.vram_dma.dst & 0x1F00) | (val & 0xF0) as u16,
            0xFF55 if self.cgb => self.start_vram_dma(val),
            0xFF70 if self.cgb => self.wram_bank = ((val & 0x07) as usize).max(1),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => {}
        }
    }

    fn oam_dma(&mut self, val: u8) {
        self.oam_dma_reg = val;
        // Sources above 0xDFFF read from the echo of work RAM.
        let base = if val >= 0xE0 {
            ((val as u16) << 8) - 0x2000
        } else {
            (val as u16) << 8
        };
        for i in 0..OAM_DMA_LEN {
            self.ppu.oam[i as usize] = self.read(base + i);
        }
    }

    fn start_vram_dma(&mut self, val: u8) {
        let blocks = (val & 0x7F) + 1;
        if self.vram_dma.hblank_active && val & 0x80 == 0 {
            self.vram_dma.hblank_active = false;
            return;
        }
        if val & 0x80 == 0 {
            for _ in 0..blocks {
                self.copy_vram_dma_block();
            }
            return;
        }
        self.vram_dma.blocks_left = blocks;
        self.vram_dma.hblank_active = true;
        if self.ppu.mode() == Mode::HBlank {
            self.hblank_dma_step();
        }
    }

    fn copy_vram_dma_block(&mut self) {
        for _ in 0..HDMA_BLOCK {
            let byte = self.read(self.vram_dma.src);
            self.ppu.write_vram(0x8000 | (self.vram_dma.dst & 0x1FFF), byte);
            self.vram_dma.src = self.vram_dma.src.wrapping_add(1);
            self.vram_dma.dst = self.vram_dma.dst.wrapping_add(1) & 0x1FFF;
        }
        self.dma_stall += if self.double_speed() {
            HDMA_BLOCK_MCYCLES * 2
        } else {
            HDMA_BLOCK_MCYCLES
        };
    }

    fn hblank_dma_step(&mut self) {
        if !self.vram_dma.hblank_active {
            return;
        }
        self.copy_vram_dma_block();
        self.vram_dma.blocks_left -= 1;
        if self.vram_dma.blocks_left == 0 {
            self.vram_dma.hblank_active = false;
        }
    }

    fn sequencer_bit(&self) -> u16 {
        if self.double_speed() {
            SEQUENCER_DIV_BIT << 1
        } else {
            SEQUENCER_DIV_BIT
        }
    }

    /// Advance every peripheral by one CPU M-cycle.
    pub fn tick(&mut self) {
        let dots = if self.double_speed() { 2 } else { 4 };

        let old_div = self.timer.div;
        self.timer.step(4, &mut self.if_reg);
        let bit = self.sequencer_bit();
        if old_div & bit != 0 && self.timer.div & bit == 0 {
            self.apu.clock_sequencer();
        }

        self.serial.step(4, &mut self.if_reg);
        if self.ppu.step(dots, &mut self.if_reg) {
            self.hblank_dma_step();
        }
        self.apu.step(dots);
        self.cart.step_rtc(dots);
        self.dots += dots as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::LoadFlags;

    fn mmu(cgb: bool) -> Mmu {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0100] = 0xAA;
        let cart = Cartridge::from_bytes(rom, LoadFlags::empty()).unwrap();
        Mmu::new(cart, cgb)
    }

    #[test]
    fn echo_ram_mirrors_work_ram() {
        let mut mmu = mmu(false);
        mmu.write(0xC123, 0x42);
        assert_eq!(mmu.read(0xE123), 0x42);
        mmu.write(0xFDFF, 0x24);
        assert_eq!(mmu.read(0xDDFF), 0x24);
    }

    #[test]
    fn svbk_switches_upper_work_ram() {
        let mut mmu = mmu(true);
        mmu.write(0xFF70, 2);
        mmu.write(0xD000, 0x22);
        mmu.write(0xFF70, 0);
        assert_eq!(mmu.read(0xFF70) & 0x07, 1, "bank 0 selects bank 1");
        assert_eq!(mmu.read(0xD000), 0);
        mmu.write(0xFF70, 2);
        assert_eq!(mmu.read(0xD000), 0x22);
    }

    #[test]
    fn boot_rom_overlay_until_ff50() {
        let mut mmu = mmu(true);
        let mut boot = vec![0x11u8; 0x900];
        boot[0x0100] = 0x99;
        mmu.map_boot_rom(boot);
        assert_eq!(mmu.read(0x0000), 0x11);
        assert_eq!(mmu.read(0x0100), 0xAA, "header stays visible");
        assert_eq!(mmu.read(0x0200), 0x11);
        mmu.write(0xFF50, 0x01);
        assert_eq!(mmu.read(0x0000), 0x00);
    }

    #[test]
    fn oam_dma_copies_160_bytes() {
        let mut mmu = mmu(false);
        for i in 0..0xA0u16 {
            mmu.write(0xC000 + i, i as u8);
        }
        mmu.write(0xFF46, 0xC0);
        assert_eq!(mmu.ppu.oam[0x00], 0x00);
        assert_eq!(mmu.ppu.oam[0x9F], 0x9F);
    }

    #[test]
    fn general_vram_dma_copies_and_stalls() {
        let mut mmu = mmu(true);
        for i in 0..0x20u16 {
            mmu.write(0xC000 + i, 0x80 | i as u8);
        }
        mmu.write(0xFF51, 0xC0);
        mmu.write(0xFF52, 0x00);
        mmu.write(0xFF53, 0x01);
        mmu.write(0xFF54, 0x00);
        mmu.write(0xFF55, 0x01);
        assert_eq!(mmu.ppu.vram[0x0100], 0x80);
        assert_eq!(mmu.ppu.vram[0x011F], 0x9F);
        assert_eq!(mmu.take_dma_stall(), 2 * HDMA_BLOCK_MCYCLES);
        assert_eq!(mmu.read(0xFF55), 0xFF);
    }

    #[test]
    fn sequencer_runs_at_512_hz() {
        let mut mmu = mmu(false);
        mmu.write(0xFF26, 0x80);
        mmu.write(0xFF21, 0xF0);
        mmu.write(0xFF20, 0x3E); // two length ticks
        mmu.write(0xFF23, 0xC0);
        assert_eq!(mmu.read(0xFF26) & 0x08, 0x08);
        // Length is clocked on sequencer steps 0 and 2; the third falling
        // edge of bit 12 arrives after 24576 cycles.
        for _ in 0..(24576 / 4) {
            mmu.tick();
        }
        assert_eq!(mmu.read(0xFF26) & 0x08, 0x00);
    }

    #[test]
    fn check_bounds_wram_bank_per_model() {
        let mut dmg = mmu(false);
        assert_eq!(dmg.check(false), Ok(()));
        assert_eq!(dmg.check(true), Err("model"));
        dmg.wram_bank = 2;
        assert_eq!(dmg.check(false), Err("WRAM bank"));

        let mut cgb = mmu(true);
        cgb.write(0xFF70, 0x07);
        assert_eq!(cgb.check(true), Ok(()));
        cgb.wram_bank = 0;
        assert_eq!(cgb.check(true), Err("WRAM bank"));
        cgb.wram_bank = 9;
        assert_eq!(cgb.check(true), Err("WRAM bank"));
    }
}
