use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::{
    hardware::{DOTS_PER_FRAME, SCREEN_HEIGHT, SCREEN_WIDTH},
    mmu::{INT_STAT, INT_VBLANK},
};

// Mode lengths in dots. Mode 3 is fixed; sprite and scroll penalties are
// folded into HBlank.
const OAM_SCAN_DOTS: u32 = 80;
const TRANSFER_DOTS: u32 = 172;
const LINE_DOTS: u32 = 456;
const LINES_PER_FRAME: u8 = 154;
const VBLANK_LINE: u8 = SCREEN_HEIGHT as u8;

pub const VRAM_BANK_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;
const PAL_RAM_SIZE: usize = 0x40;

const MAX_SPRITES_PER_LINE: usize = 10;
const WINDOW_X_MAX: u8 = 166;

const BG_MAP_LOW: usize = 0x1800;
const BG_MAP_HIGH: usize = 0x1C00;

/// DMG shades as 0x00RRGGBB, lightest first.
const DMG_SHADES: [u32; 4] = [0x00FF_FFFF, 0x00AA_AAAA, 0x0055_5555, 0x0000_0000];
/// Colour shown while the LCD is disabled.
pub const BLANK_PIXEL: u32 = DMG_SHADES[0];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

impl Mode {
    /// Dot within the line at which this mode gives way to the next.
    fn end_dot(self) -> u32 {
        match self {
            Mode::OamScan => OAM_SCAN_DOTS,
            Mode::Transfer => OAM_SCAN_DOTS + TRANSFER_DOTS,
            Mode::HBlank | Mode::VBlank => LINE_DOTS,
        }
    }
}

#[derive(Clone, Copy, Default)]
struct BgPixel {
    color_id: u8,
    palette: u8,
    priority: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ppu {
    /// Both VRAM banks back to back; bank 1 only exists on CGB hardware.
    pub vram: Vec<u8>,
    vram_bank: usize,
    #[serde(with = "BigArray")]
    pub oam: [u8; OAM_SIZE],

    /// Running on CGB hardware.
    cgb: bool,
    /// CGB features enabled (false for DMG carts in compatibility mode).
    cgb_features: bool,

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,
    window_line: u8,

    bgpi: u8,
    #[serde(with = "BigArray")]
    bgpd: [u8; PAL_RAM_SIZE],
    obpi: u8,
    #[serde(with = "BigArray")]
    obpd: [u8; PAL_RAM_SIZE],
    opri: u8,

    mode: Mode,
    line_dots: u32,
    /// Dots elapsed since the last blank frame while the LCD is off.
    off_dots: u32,
    stat_line: bool,

    framebuffer: Vec<u32>,
    frame_ready: bool,
    frames: u64,
}

impl Ppu {
    pub fn new(cgb: bool) -> Self {
        Self {
            vram: vec![0; VRAM_BANK_SIZE * if cgb { 2 } else { 1 }],
            vram_bank: 0,
            oam: [0; OAM_SIZE],
            cgb,
            cgb_features: cgb,
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            window_line: 0,
            bgpi: 0,
            bgpd: [0; PAL_RAM_SIZE],
            obpi: 0,
            obpd: [0; PAL_RAM_SIZE],
            opri: 0,
            mode: Mode::HBlank,
            line_dots: 0,
            off_dots: 0,
            stat_line: false,
            framebuffer: vec![BLANK_PIXEL; SCREEN_WIDTH * SCREEN_HEIGHT],
            frame_ready: false,
            frames: 0,
        }
    }

    /// Register values left behind by the boot ROM, for starting without one.
    /// The LCD is on and at the top of a fresh frame.
    pub fn apply_boot_state(&mut self) {
        self.lcdc = 0x91;
        self.stat = 0x80;
        self.bgp = 0xFC;
        self.ly = 0;
        self.line_dots = 0;
        self.window_line = 0;
        self.mode = Mode::OamScan;
        self.stat_line = false;
        if self.cgb_features {
            self.bgpd = [0xFF; PAL_RAM_SIZE];
        } else if self.cgb {
            self.apply_compatibility_palettes();
        }
    }

    /// Grey palettes for DMG software on CGB hardware, matching the DMG
    /// shades.
    pub fn apply_compatibility_palettes(&mut self) {
        const GREYS: [u16; 4] = [0x7FFF, 0x56B5, 0x294A, 0x0000];
        for (i, c) in GREYS.iter().enumerate() {
            let [lo, hi] = c.to_le_bytes();
            self.bgpd[i * 2] = lo;
            self.bgpd[i * 2 + 1] = hi;
            for palette in 0..2 {
                self.obpd[palette * 8 + i * 2] = lo;
                self.obpd[palette * 8 + i * 2 + 1] = hi;
            }
        }
        self.bgp = 0xFC;
        self.obp0 = 0xFF;
        self.obp1 = 0xFF;
    }

    /// Switch CGB hardware between colour and DMG compatibility rendering.
    pub fn set_cgb_features(&mut self, enabled: bool) {
        self.cgb_features = self.cgb && enabled;
    }

    pub fn cgb_features(&self) -> bool {
        self.cgb_features
    }

    /// Reject restored state whose banks or counters are out of range.
    pub(crate) fn check(&self, cgb: bool) -> Result<(), &'static str> {
        let banks = if cgb { 2 } else { 1 };
        if self.cgb != cgb || (self.cgb_features && !cgb) {
            return Err("PPU model");
        }
        if self.vram.len() != VRAM_BANK_SIZE * banks {
            return Err("VRAM size");
        }
        if self.vram_bank >= banks {
            return Err("VRAM bank");
        }
        if self.framebuffer.len() != SCREEN_WIDTH * SCREEN_HEIGHT {
            return Err("framebuffer size");
        }
        if self.ly >= LINES_PER_FRAME || self.line_dots >= self.mode.end_dot() {
            return Err("PPU line position");
        }
        if self.off_dots >= DOTS_PER_FRAME {
            return Err("PPU off-frame counter");
        }
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        if self.lcd_on() { self.mode } else { Mode::HBlank }
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    /// Returns true once per completed frame.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    fn lcd_on(&self) -> bool {
        self.lcdc & 0x80 != 0
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        let idx = self.vram_bank * VRAM_BANK_SIZE + (addr as usize & 0x1FFF);
        self.vram.get(idx).copied().unwrap_or(0xFF)
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        let idx = self.vram_bank * VRAM_BANK_SIZE + (addr as usize & 0x1FFF);
        if let Some(slot) = self.vram.get_mut(idx) {
            *slot = val;
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let coincidence = if self.ly == self.lyc { 0x04 } else { 0 };
                0x80 | (self.stat & 0x78) | coincidence | self.mode() as u8
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            0xFF4F if self.cgb => 0xFE | self.vram_bank as u8,
            0xFF68 if self.cgb => self.bgpi | 0x40,
            0xFF69 if self.cgb => self.bgpd[(self.bgpi & 0x3F) as usize],
            0xFF6A if self.cgb => self.obpi | 0x40,
            0xFF6B if self.cgb => self.obpd[(self.obpi & 0x3F) as usize],
            0xFF6C if self.cgb => 0xFE | self.opri,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8, if_reg: &mut u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcd_on();
                self.lcdc = val;
                if was_on && !self.lcd_on() {
                    self.ly = 0;
                    self.line_dots = 0;
                    self.off_dots = 0;
                    self.window_line = 0;
                    self.mode = Mode::HBlank;
                    self.framebuffer.fill(BLANK_PIXEL);
                } else if !was_on && self.lcd_on() {
                    self.ly = 0;
                    self.line_dots = 0;
                    self.mode = Mode::OamScan;
                    self.update_stat_line(if_reg);
                }
            }
            0xFF41 => {
                self.stat = val & 0x78;
                self.update_stat_line(if_reg);
            }
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF45 => {
                self.lyc = val;
                self.update_stat_line(if_reg);
            }
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            0xFF4F if self.cgb => self.vram_bank = (val & 0x01) as usize,
            0xFF68 if self.cgb => self.bgpi = val & 0xBF,
            0xFF69 if self.cgb => Self::write_palette_data(&mut self.bgpi, &mut self.bgpd, val),
            0xFF6A if self.cgb => self.obpi = val & 0xBF,
            0xFF6B if self.cgb => Self::write_palette_data(&mut self.obpi, &mut self.obpd, val),
            0xFF6C if self.cgb => self.opri = val & 0x01,
            _ => {}
        }
    }

    fn write_palette_data(index: &mut u8, ram: &mut [u8; PAL_RAM_SIZE], val: u8) {
        ram[(*index & 0x3F) as usize] = val;
        if *index & 0x80 != 0 {
            *index = 0x80 | (index.wrapping_add(1) & 0x3F);
        }
    }

    /// Advance by `dots` base-clock ticks. Returns true when HBlank was
    /// entered on a visible line, which clocks HDMA.
    pub fn step(&mut self, dots: u32, if_reg: &mut u8) -> bool {
        if !self.lcd_on() {
            self.off_dots += dots;
            if self.off_dots >= DOTS_PER_FRAME {
                self.off_dots -= DOTS_PER_FRAME;
                self.frame_ready = true;
                self.frames += 1;
            }
            return false;
        }

        let mut entered_hblank = false;
        let mut left = dots;
        while left > 0 {
            let boundary = self.mode.end_dot();
            let advance = left.min(boundary - self.line_dots);
            self.line_dots += advance;
            left -= advance;
            if self.line_dots == boundary {
                entered_hblank |= self.next_mode(if_reg);
            }
        }
        entered_hblank
    }

    fn next_mode(&mut self, if_reg: &mut u8) -> bool {
        let mut entered_hblank = false;
        match self.mode {
            Mode::OamScan => self.mode = Mode::Transfer,
            Mode::Transfer => {
                self.render_scanline();
                self.mode = Mode::HBlank;
                entered_hblank = true;
            }
            Mode::HBlank | Mode::VBlank => {
                self.line_dots = 0;
                self.ly += 1;
                if self.ly == LINES_PER_FRAME {
                    self.ly = 0;
                    self.window_line = 0;
                }
                if self.ly == VBLANK_LINE {
                    self.mode = Mode::VBlank;
                    *if_reg |= INT_VBLANK;
                    self.frame_ready = true;
                    self.frames += 1;
                } else if self.ly < VBLANK_LINE {
                    self.mode = Mode::OamScan;
                }
            }
        }
        self.update_stat_line(if_reg);
        entered_hblank
    }

    /// STAT interrupts fire on the rising edge of the OR of all enabled
    /// sources.
    fn update_stat_line(&mut self, if_reg: &mut u8) {
        if !self.lcd_on() {
            self.stat_line = false;
            return;
        }
        let coincidence = self.ly == self.lyc && self.stat & 0x40 != 0;
        let mode_source = match self.mode {
            Mode::HBlank => self.stat & 0x08 != 0,
            Mode::VBlank => self.stat & 0x10 != 0,
            Mode::OamScan => self.stat & 0x20 != 0,
            Mode::Transfer => false,
        };
        let line = coincidence || mode_source;
        if line && !self.stat_line {
            *if_reg |= INT_STAT;
        }
        self.stat_line = line;
    }

    fn bg_pixel(&self, map_base: usize, x: u8, y: u8) -> BgPixel {
        let map_idx = map_base + (y as usize / 8) * 32 + x as usize / 8;
        let tile = self.vram[map_idx];
        let attr = if self.cgb_features {
            self.vram[VRAM_BANK_SIZE + map_idx]
        } else {
            0
        };

        let fine_y = (if attr & 0x40 != 0 { 7 - y % 8 } else { y % 8 }) as usize;
        let bit = if attr & 0x20 != 0 { x % 8 } else { 7 - x % 8 };
        let bank = if attr & 0x08 != 0 { VRAM_BANK_SIZE } else { 0 };
        let tile_addr = if self.lcdc & 0x10 != 0 {
            tile as usize * 16
        } else {
            (0x1000 + (tile as i8 as isize) * 16) as usize
        };
        let lo = self.vram[bank + tile_addr + fine_y * 2];
        let hi = self.vram[bank + tile_addr + fine_y * 2 + 1];

        BgPixel {
            color_id: ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1),
            palette: attr & 0x07,
            priority: attr & 0x80 != 0,
        }
    }

    fn render_scanline(&mut self) {
        let ly = self.ly as usize;
        if ly >= SCREEN_HEIGHT {
            return;
        }

        let mut line = [BgPixel::default(); SCREEN_WIDTH];
        // LCDC bit 0 blanks the background on DMG; on CGB it only drops
        // background priority.
        let bg_visible = self.cgb_features || self.lcdc & 0x01 != 0;

        if bg_visible {
            let map = if self.lcdc & 0x08 != 0 { BG_MAP_HIGH } else { BG_MAP_LOW };
            let y = self.ly.wrapping_add(self.scy);
            for (x, px) in line.iter_mut().enumerate() {
                *px = self.bg_pixel(map, (x as u8).wrapping_add(self.scx), y);
            }

            if self.lcdc & 0x20 != 0 && self.ly >= self.wy && self.wx <= WINDOW_X_MAX {
                let map = if self.lcdc & 0x40 != 0 { BG_MAP_HIGH } else { BG_MAP_LOW };
                let origin = self.wx as isize - 7;
                let wy = self.window_line;
                for x in origin.max(0) as usize..SCREEN_WIDTH {
                    line[x] = self.bg_pixel(map, (x as isize - origin) as u8, wy);
                }
                self.window_line = self.window_line.wrapping_add(1);
            }
        }

        for (x, px) in line.iter().enumerate() {
            let color = if bg_visible {
                self.bg_color(*px)
            } else {
                self.bg_color(BgPixel::default())
            };
            self.framebuffer[ly * SCREEN_WIDTH + x] = color;
        }

        if self.lcdc & 0x02 != 0 {
            self.render_sprites(&line, bg_visible);
        }
    }

    fn render_sprites(&mut self, bg: &[BgPixel; SCREEN_WIDTH], bg_visible: bool) {
        let height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        let ly = self.ly as i16;

        let mut visible: Vec<usize> = (0..40)
            .filter(|&i| {
                let y = self.oam[i * 4] as i16 - 16;
                (y..y + height).contains(&ly)
            })
            .take(MAX_SPRITES_PER_LINE)
            .collect();
        if !self.cgb_features || self.opri & 0x01 != 0 {
            // Lower X wins, ties go to the earlier OAM entry.
            visible.sort_by_key(|&i| (self.oam[i * 4 + 1], i));
        }

        let mut claimed = [false; SCREEN_WIDTH];
        let row = self.ly as usize * SCREEN_WIDTH;
        for i in visible {
            let y = self.oam[i * 4] as i16 - 16;
            let sx = self.oam[i * 4 + 1] as i16 - 8;
            let flags = self.oam[i * 4 + 3];
            let tile = if height == 16 {
                self.oam[i * 4 + 2] & 0xFE
            } else {
                self.oam[i * 4 + 2]
            };

            let mut tile_line = ly - y;
            if flags & 0x40 != 0 {
                tile_line = height - 1 - tile_line;
            }
            let bank = if self.cgb_features && flags & 0x08 != 0 {
                VRAM_BANK_SIZE
            } else {
                0
            };
            let addr = bank + tile as usize * 16 + tile_line as usize * 2;
            let lo = self.vram[addr];
            let hi = self.vram[addr + 1];

            for px in 0..8i16 {
                let x = sx + px;
                if !(0..SCREEN_WIDTH as i16).contains(&x) || claimed[x as usize] {
                    continue;
                }
                let bit = if flags & 0x20 != 0 { px } else { 7 - px };
                let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                if color_id == 0 {
                    continue;
                }
                let x = x as usize;
                claimed[x] = true;

                let under = bg[x];
                let bg_opaque = bg_visible && under.color_id != 0;
                let hidden = if self.cgb_features {
                    self.lcdc & 0x01 != 0 && bg_opaque && (under.priority || flags & 0x80 != 0)
                } else {
                    bg_opaque && flags & 0x80 != 0
                };
                if !hidden {
                    self.framebuffer[row + x] = self.obj_color(flags, color_id);
                }
            }
        }
    }

    fn bg_color(&self, px: BgPixel) -> u32 {
        if self.cgb_features {
            decode_cgb_color(&self.bgpd, px.palette, px.color_id)
        } else if self.cgb {
            decode_cgb_color(&self.bgpd, 0, dmg_shade(self.bgp, px.color_id))
        } else {
            DMG_SHADES[dmg_shade(self.bgp, px.color_id) as usize]
        }
    }

    fn obj_color(&self, flags: u8, color_id: u8) -> u32 {
        let dmg_palette = if flags & 0x10 != 0 { self.obp1 } else { self.obp0 };
        if self.cgb_features {
            decode_cgb_color(&self.obpd, flags & 0x07, color_id)
        } else if self.cgb {
            decode_cgb_color(&self.obpd, (flags >> 4) & 1, dmg_shade(dmg_palette, color_id))
        } else {
            DMG_SHADES[dmg_shade(dmg_palette, color_id) as usize]
        }
    }
}

#[inline]
fn dmg_shade(palette: u8, color_id: u8) -> u8 {
    (palette >> (color_id * 2)) & 0x03
}

/// Expand a little-endian BGR555 palette entry to 0x00RRGGBB.
fn decode_cgb_color(ram: &[u8; PAL_RAM_SIZE], palette: u8, color_id: u8) -> u32 {
    let off = palette as usize * 8 + color_id as usize * 2;
    let raw = u16::from_le_bytes([ram[off], ram[off + 1]]);
    let expand = |c: u16| {
        let c = (c & 0x1F) as u32;
        (c << 3) | (c >> 2)
    };
    (expand(raw) << 16) | (expand(raw >> 5) << 8) | expand(raw >> 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered_on(cgb: bool) -> Ppu {
        let mut ppu = Ppu::new(cgb);
        ppu.apply_boot_state();
        ppu
    }

    #[test]
    fn vblank_starts_after_144_lines() {
        let mut ppu = powered_on(false);
        let mut if_reg = 0;
        ppu.step(LINE_DOTS * 144 - 1, &mut if_reg);
        assert!(!ppu.take_frame_ready());
        ppu.step(1, &mut if_reg);
        assert!(ppu.take_frame_ready());
        assert_eq!(ppu.ly(), 144);
        assert_eq!(if_reg & INT_VBLANK, INT_VBLANK);
        assert!(!ppu.take_frame_ready(), "the event is consumed");
    }

    #[test]
    fn frame_period_is_constant() {
        let mut ppu = powered_on(false);
        let mut if_reg = 0;
        ppu.step(DOTS_PER_FRAME * 3, &mut if_reg);
        assert_eq!(ppu.frames(), 3);
        assert_eq!(ppu.ly(), 0);
    }

    #[test]
    fn lcd_off_completes_blank_frames() {
        let mut ppu = powered_on(false);
        let mut if_reg = 0;
        ppu.write_reg(0xFF40, 0x11, &mut if_reg);
        assert_eq!(ppu.ly(), 0);
        ppu.step(DOTS_PER_FRAME - 2, &mut if_reg);
        assert!(!ppu.take_frame_ready());
        ppu.step(2, &mut if_reg);
        assert!(ppu.take_frame_ready());
        assert!(ppu.framebuffer().iter().all(|&p| p == BLANK_PIXEL));
        assert_eq!(if_reg & INT_VBLANK, 0);
    }

    #[test]
    fn lyc_match_raises_stat_once() {
        let mut ppu = powered_on(false);
        let mut if_reg = 0;
        ppu.write_reg(0xFF45, 2, &mut if_reg);
        ppu.write_reg(0xFF41, 0x40, &mut if_reg);
        ppu.step(LINE_DOTS * 2, &mut if_reg);
        assert_eq!(if_reg & INT_STAT, INT_STAT);
        assert_ne!(ppu.read_reg(0xFF41) & 0x04, 0);
        if_reg = 0;
        ppu.step(LINE_DOTS / 2, &mut if_reg);
        assert_eq!(if_reg & INT_STAT, 0);
    }

    #[test]
    fn background_uses_dmg_palette() {
        let mut ppu = powered_on(false);
        let mut if_reg = 0;
        // Tile 0, row 0: colour 3 on every pixel.
        ppu.vram[0] = 0xFF;
        ppu.vram[1] = 0xFF;
        ppu.write_reg(0xFF47, 0xE4, &mut if_reg);
        ppu.step(LINE_DOTS, &mut if_reg);
        assert_eq!(ppu.framebuffer()[0], DMG_SHADES[3]);
        assert_eq!(ppu.framebuffer()[SCREEN_WIDTH], BLANK_PIXEL, "line 1 not rendered yet");
    }

    #[test]
    fn cgb_palette_autoincrement() {
        let mut ppu = powered_on(true);
        let mut if_reg = 0;
        ppu.write_reg(0xFF68, 0x80, &mut if_reg);
        ppu.write_reg(0xFF69, 0x1F, &mut if_reg);
        ppu.write_reg(0xFF69, 0x00, &mut if_reg);
        assert_eq!(ppu.read_reg(0xFF68), 0xC2);
        assert_eq!(decode_cgb_color(&ppu.bgpd, 0, 0), 0x00FF_0000);
    }

    #[test]
    fn compatibility_palettes_match_dmg_shades() {
        let mut ppu = powered_on(true);
        ppu.set_cgb_features(false);
        ppu.apply_compatibility_palettes();
        assert_eq!(ppu.bg_color(BgPixel::default()), 0x00FF_FFFF);
        let darkest = BgPixel {
            color_id: 3,
            ..BgPixel::default()
        };
        assert_eq!(ppu.bg_color(darkest), 0);
    }

    #[test]
    fn check_rejects_out_of_range_state() {
        let mut ppu = powered_on(false);
        assert_eq!(ppu.check(false), Ok(()));
        assert_eq!(ppu.check(true), Err("PPU model"));

        ppu.vram_bank = 1;
        assert_eq!(ppu.check(false), Err("VRAM bank"));
        ppu.vram_bank = 0;

        ppu.ly = LINES_PER_FRAME;
        assert_eq!(ppu.check(false), Err("PPU line position"));
        ppu.ly = 10;
        ppu.line_dots = OAM_SCAN_DOTS;
        assert_eq!(ppu.check(false), Err("PPU line position"));

        let mut cgb = powered_on(true);
        cgb.vram_bank = 1;
        assert_eq!(cgb.check(true), Ok(()));
    }
}
