use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::LoadError,
    hardware::{DOTS_PER_SECOND, LoadFlags},
};

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const HEADER_END: usize = 0x0150;
const MIN_ROM_SIZE: usize = 2 * ROM_BANK_SIZE;
const MAX_ROM_SIZE: usize = 8 * 1024 * 1024;

const RTC_FILE_MAGIC: &[u8; 4] = b"RTC2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Identity of the loaded cartridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomInfo {
    pub title: String,
    /// CRC32 of the ROM file as loaded from disk.
    pub crc32: u32,
    pub mbc: MbcType,
    pub cgb: bool,
    pub battery: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Cartridge {
    #[serde(skip)]
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub cgb: bool,
    #[serde(skip)]
    pub title: String,
    #[serde(skip)]
    crc32: u32,
    cart_type: u8,
    #[serde(skip)]
    save_path: Option<PathBuf>,
    #[serde(skip)]
    read_only: bool,
    mbc_state: MbcState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
        multicart: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Rtc>,
        latch_pending: bool,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
        rumble: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

/// MBC3 real-time clock. It counts emulated time only, so replays and save
/// states stay deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    subsecond_dots: u32,
}

impl Rtc {
    fn latch(&mut self) {
        self.latched = self.regs;
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => (self.latched.days & 0x00FF) as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => {
                self.regs.seconds = value & 0x3F;
                self.subsecond_dots = 0;
            }
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.regs.halt = value & 0x40 != 0;
                self.regs.carry = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn step(&mut self, dots: u32) {
        if self.regs.halt {
            return;
        }
        self.subsecond_dots += dots;
        while self.subsecond_dots >= DOTS_PER_SECOND {
            self.subsecond_dots -= DOTS_PER_SECOND;
            self.second_tick();
        }
    }

    fn second_tick(&mut self) {
        // Out-of-range values keep counting up to the 6-bit limit before
        // wrapping, without carrying into the next unit.
        if self.regs.seconds == 59 {
            self.regs.seconds = 0;
            self.minute_tick();
        } else {
            self.regs.seconds = (self.regs.seconds + 1) & 0x3F;
        }
    }

    fn minute_tick(&mut self) {
        if self.regs.minutes == 59 {
            self.regs.minutes = 0;
            self.hour_tick();
        } else {
            self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        }
    }

    fn hour_tick(&mut self) {
        if self.regs.hours == 23 {
            self.regs.hours = 0;
            self.day_tick();
        } else {
            self.regs.hours = (self.regs.hours + 1) & 0x1F;
        }
    }

    fn day_tick(&mut self) {
        if self.regs.days >= 0x01FF {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }

    fn to_file_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(RTC_FILE_MAGIC);
        data.extend_from_slice(&self.subsecond_dots.to_le_bytes());
        data.push(self.regs.seconds);
        data.push(self.regs.minutes);
        data.push(self.regs.hours);
        data.extend_from_slice(&self.regs.days.to_le_bytes());
        data.push(self.regs.halt as u8 | (self.regs.carry as u8) << 1);
        data
    }

    fn check(&self) -> Result<(), &'static str> {
        let in_range = |r: &RtcRegisters| {
            r.seconds <= 0x3F && r.minutes <= 0x3F && r.hours <= 0x1F && r.days <= 0x01FF
        };
        if !in_range(&self.regs)
            || !in_range(&self.latched)
            || self.subsecond_dots >= DOTS_PER_SECOND
        {
            return Err("RTC registers");
        }
        Ok(())
    }

    fn load_from_bytes(&mut self, data: &[u8]) -> bool {
        if data.len() < 14 || &data[..4] != RTC_FILE_MAGIC {
            return false;
        }
        let sub = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        self.subsecond_dots = sub.min(DOTS_PER_SECOND - 1);
        self.regs.seconds = data[8] & 0x3F;
        self.regs.minutes = data[9] & 0x3F;
        self.regs.hours = data[10] & 0x1F;
        self.regs.days = u16::from_le_bytes([data[11], data[12]]) & 0x01FF;
        self.regs.halt = data[13] & 0x01 != 0;
        self.regs.carry = data[13] & 0x02 != 0;
        self.latch();
        true
    }
}

impl Cartridge {
    /// Parse a ROM image and set up its mapper. The image is padded to a
    /// whole number of 16 KiB banks.
    pub fn from_bytes(mut data: Vec<u8>, flags: LoadFlags) -> Result<Self, LoadError> {
        if data.len() < HEADER_END {
            return Err(LoadError::Malformed("image is smaller than the cartridge header"));
        }
        if data.len() > MAX_ROM_SIZE {
            return Err(LoadError::Malformed("image is larger than 8 MiB"));
        }

        let crc32 = crc32fast::hash(&data);
        let header = Header::parse(&data);
        let cart_type = header.cart_type();
        let mbc = header.mbc_type()?;
        let ram_size = header.ram_size(mbc);
        let title = header.title();
        let cgb = header.cgb_supported();

        let padded = data.len().div_ceil(ROM_BANK_SIZE).max(2) * ROM_BANK_SIZE;
        data.resize(padded.max(MIN_ROM_SIZE), 0xFF);

        let mbc_state = Self::initial_state(mbc, cart_type, &data, flags);

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            cgb,
            title,
            crc32,
            cart_type,
            save_path: None,
            read_only: flags.contains(LoadFlags::READ_ONLY_SAV),
            mbc_state,
        })
    }

    /// Read a ROM from disk and pick up its battery files (`.sav`, `.rtc`)
    /// when the cartridge type has a battery.
    pub fn from_file<P: AsRef<Path>>(path: P, flags: LoadFlags) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cart = Self::from_bytes(data, flags)?;

        if cart.has_battery() {
            cart.attach_battery(path.with_extension("sav"));
        }

        info!(
            "Loaded ROM: {} (MBC: {:?}, CGB: {}, CRC32: {:08X})",
            cart.title,
            cart.mbc,
            if cart.cgb { "yes" } else { "no" },
            cart.crc32
        );
        Ok(cart)
    }

    fn initial_state(mbc: MbcType, cart_type: u8, data: &[u8], flags: LoadFlags) -> MbcState {
        match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
                multicart: flags.contains(LoadFlags::MULTICART_COMPAT)
                    && detect_mbc1_multicart(data),
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: matches!(cart_type, 0x0F | 0x10).then(Rtc::default),
                latch_pending: false,
            },
            MbcType::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rumble: matches!(cart_type, 0x1C..=0x1E),
            },
        }
    }

    /// Point battery persistence at `save_path` and load any existing data.
    pub fn attach_battery(&mut self, save_path: PathBuf) {
        if let Ok(bytes) = fs::read(&save_path) {
            for (d, s) in self.ram.iter_mut().zip(bytes.iter()) {
                *d = *s;
            }
        }

        let rtc_path = save_path.with_extension("rtc");
        if let Some(rtc) = self.rtc_mut()
            && let Ok(bytes) = fs::read(&rtc_path)
            && !rtc.load_from_bytes(&bytes)
        {
            warn!("Failed to parse RTC data from {}", rtc_path.display());
        }

        self.save_path = Some(save_path);
    }

    pub fn info(&self) -> RomInfo {
        RomInfo {
            title: self.title.clone(),
            crc32: self.crc32,
            mbc: self.mbc,
            cgb: self.cgb,
            battery: self.has_battery(),
        }
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Return the mapper registers to their power-on values. RAM contents
    /// and the RTC survive, as they would across a power cycle.
    pub fn reset_registers(&mut self) {
        let rtc = match &self.mbc_state {
            MbcState::Mbc3 { rtc, .. } => rtc.clone(),
            _ => None,
        };
        let flags = if matches!(self.mbc_state, MbcState::Mbc1 { multicart: true, .. }) {
            LoadFlags::MULTICART_COMPAT
        } else {
            LoadFlags::empty()
        };
        self.mbc_state = Self::initial_state(self.mbc, self.cart_type, &self.rom, flags);
        if let MbcState::Mbc3 { rtc: slot, .. } = &mut self.mbc_state {
            *slot = rtc;
        }
    }

    /// Whether a deserialized cartridge state can stand in for `live`.
    pub(crate) fn is_compatible_with(&self, live: &Cartridge) -> bool {
        self.mbc == live.mbc
            && self.cart_type == live.cart_type
            && self.ram.len() == live.ram.len()
    }

    /// Reject restored mapper state that does not fit this cartridge.
    pub(crate) fn check(&self) -> Result<(), &'static str> {
        let matches_mbc = matches!(
            (self.mbc, &self.mbc_state),
            (MbcType::NoMbc, MbcState::NoMbc)
                | (MbcType::Mbc1, MbcState::Mbc1 { .. })
                | (MbcType::Mbc2, MbcState::Mbc2 { .. })
                | (MbcType::Mbc3, MbcState::Mbc3 { .. })
                | (MbcType::Mbc5, MbcState::Mbc5 { .. })
        );
        if !matches_mbc {
            return Err("mapper state");
        }
        if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &self.mbc_state {
            rtc.check()?;
        }
        Ok(())
    }

    /// Move the ROM image and host-side bookkeeping from `live` into this
    /// (freshly deserialized) cartridge.
    pub(crate) fn adopt_media(&mut self, live: &mut Cartridge) {
        self.rom = std::mem::take(&mut live.rom);
        self.title = std::mem::take(&mut live.title);
        self.crc32 = live.crc32;
        self.save_path = live.save_path.take();
        self.read_only = live.read_only;
    }

    pub fn step_rtc(&mut self, dots: u32) {
        if let Some(rtc) = self.rtc_mut() {
            rtc.step(dots);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom_byte(self.low_bank(), addr as usize),
            0x4000..=0x7FFF => self.rom_byte(self.high_bank(), addr as usize - 0x4000),
            0xA000..=0xBFFF => self.read_ram(addr as usize - 0xA000),
            _ => 0xFF,
        }
    }

    fn rom_byte(&self, bank: usize, offset: usize) -> u8 {
        let banks = (self.rom.len() / ROM_BANK_SIZE).max(1);
        let idx = (bank % banks) * ROM_BANK_SIZE + offset;
        self.rom.get(idx).copied().unwrap_or(0xFF)
    }

    fn low_bank(&self) -> usize {
        match &self.mbc_state {
            MbcState::Mbc1 {
                ram_bank,
                mode: 1,
                multicart,
                ..
            } => {
                let shift = if *multicart { 4 } else { 5 };
                ((*ram_bank as usize) & 0x03) << shift
            }
            _ => 0,
        }
    }

    fn high_bank(&self) -> usize {
        match &self.mbc_state {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 {
                rom_bank,
                ram_bank,
                multicart,
                ..
            } => {
                let high = (*ram_bank as usize) & 0x03;
                if *multicart {
                    (high << 4) | (*rom_bank as usize & 0x0F)
                } else {
                    (high << 5) | (*rom_bank as usize & 0x1F)
                }
            }
            MbcState::Mbc2 { rom_bank, .. } => (*rom_bank as usize & 0x0F).max(1),
            MbcState::Mbc3 { rom_bank, .. } => (*rom_bank as usize).max(1),
            MbcState::Mbc5 { rom_bank, .. } => *rom_bank as usize,
        }
    }

    fn ram_at(&self, idx: usize) -> u8 {
        if self.ram.is_empty() {
            0xFF
        } else {
            self.ram[idx % self.ram.len()]
        }
    }

    fn write_ram_at(&mut self, idx: usize, val: u8) {
        if !self.ram.is_empty() {
            let len = self.ram.len();
            self.ram[idx % len] = val;
        }
    }

    fn read_ram(&self, offset: usize) -> u8 {
        match &self.mbc_state {
            MbcState::NoMbc => self.ram_at(offset),
            MbcState::Mbc1 {
                ram_enable,
                ram_bank,
                mode,
                ..
            } => {
                if !*ram_enable {
                    return 0xFF;
                }
                let bank = if *mode == 1 { *ram_bank as usize } else { 0 };
                self.ram_at(bank * RAM_BANK_SIZE + offset)
            }
            MbcState::Mbc2 { ram_enable, .. } => {
                if !*ram_enable {
                    return 0xFF;
                }
                // 512 half-bytes, mirrored across the whole window.
                0xF0 | (self.ram_at(offset & 0x01FF) & 0x0F)
            }
            MbcState::Mbc3 {
                ram_enable,
                ram_bank,
                rtc,
                ..
            } => {
                if !*ram_enable {
                    return 0xFF;
                }
                match *ram_bank {
                    0x00..=0x03 => self.ram_at(*ram_bank as usize * RAM_BANK_SIZE + offset),
                    0x08..=0x0C => rtc.as_ref().map_or(0xFF, |r| r.read_latched(*ram_bank)),
                    _ => 0xFF,
                }
            }
            MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            } => {
                if !*ram_enable {
                    return 0xFF;
                }
                self.ram_at(*ram_bank as usize * RAM_BANK_SIZE + offset)
            }
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if (0xA000..=0xBFFF).contains(&addr) {
            self.write_ram(addr as usize - 0xA000, val);
            return;
        }

        match (&mut self.mbc_state, addr) {
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = (val & 0x1F).max(1);
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // Address bit 8 selects between RAM enable and ROM bank.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = (val & 0x0F).max(1);
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = (val & 0x7F).max(1);
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            (
                MbcState::Mbc3 {
                    latch_pending, rtc, ..
                },
                0x6000..=0x7FFF,
            ) => {
                if val == 1
                    && *latch_pending
                    && let Some(rtc) = rtc
                {
                    rtc.latch();
                }
                *latch_pending = val == 0;
            }
            (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0xFF) | (((val & 0x01) as u16) << 8);
            }
            (MbcState::Mbc5 { ram_bank, rumble, .. }, 0x4000..=0x5FFF) => {
                // Bit 3 drives the rumble motor on rumble carts.
                *ram_bank = if *rumble { val & 0x07 } else { val & 0x0F };
            }
            _ => {}
        }
    }

    fn write_ram(&mut self, offset: usize, val: u8) {
        let target = match &mut self.mbc_state {
            MbcState::NoMbc => Some(offset),
            MbcState::Mbc1 {
                ram_enable,
                ram_bank,
                mode,
                ..
            } => ram_enable.then(|| {
                let bank = if *mode == 1 { *ram_bank as usize } else { 0 };
                bank * RAM_BANK_SIZE + offset
            }),
            MbcState::Mbc2 { ram_enable, .. } => {
                if *ram_enable {
                    self.write_ram_at(offset & 0x01FF, val & 0x0F);
                }
                None
            }
            MbcState::Mbc3 {
                ram_enable,
                ram_bank,
                rtc,
                ..
            } => {
                if !*ram_enable {
                    None
                } else {
                    match *ram_bank {
                        0x00..=0x03 => Some(*ram_bank as usize * RAM_BANK_SIZE + offset),
                        0x08..=0x0C => {
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write_register(*ram_bank, val);
                            }
                            None
                        }
                        _ => None,
                    }
                }
            }
            MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            } => ram_enable.then(|| *ram_bank as usize * RAM_BANK_SIZE + offset),
        };
        if let Some(idx) = target {
            self.write_ram_at(idx, val);
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.mbc_state, MbcState::Mbc3 { rtc: Some(_), .. })
    }

    fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.mbc_state {
            MbcState::Mbc3 { rtc: Some(rtc), .. } => Some(rtc),
            _ => None,
        }
    }

    /// Write battery RAM (and RTC registers) next to the ROM. A no-op for
    /// carts without a battery, carts not loaded from disk, and read-only
    /// sessions.
    pub fn save_ram(&mut self) -> io::Result<()> {
        if self.read_only || !self.has_battery() {
            return Ok(());
        }
        let Some(path) = self.save_path.clone() else {
            return Ok(());
        };

        if !self.ram.is_empty() {
            fs::write(&path, &self.ram)?;
        }
        if let Some(rtc) = self.rtc_mut() {
            fs::write(path.with_extension("rtc"), rtc.to_file_bytes())?;
        }
        Ok(())
    }
}

fn detect_mbc1_multicart(rom: &[u8]) -> bool {
    // Multicarts wired for 8 Mbit carry a copy of the boot logo at the start
    // of every 16-bank game; the header alone cannot tell them apart.
    let bank_count = rom.len() / ROM_BANK_SIZE;
    if bank_count != 64 {
        return false;
    }

    let logo0 = match rom.get(0x0104..0x0134) {
        Some(s) if !s.iter().all(|&b| b == 0) => s,
        _ => return false,
    };

    (1..4).all(|game| {
        let start = game * 16 * ROM_BANK_SIZE + 0x0104;
        rom.get(start..start + 0x30) == Some(logo0)
    })
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0144];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn cgb_supported(&self) -> bool {
        self.data[0x0143] & 0x80 != 0
    }

    fn cart_type(&self) -> u8 {
        self.data[0x0147]
    }

    fn mbc_type(&self) -> Result<MbcType, LoadError> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x05 | 0x06 => Ok(MbcType::Mbc2),
            0x0F..=0x13 => Ok(MbcType::Mbc3),
            0x19..=0x1E => Ok(MbcType::Mbc5),
            other => Err(LoadError::UnsupportedMapper(other)),
        }
    }

    fn ram_size(&self, mbc: MbcType) -> usize {
        if mbc == MbcType::Mbc2 {
            return 0x200;
        }
        match self.data[0x0149] {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0x2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_type(cart_type: u8, ram_code: u8, banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[0x0147] = cart_type;
        rom[0x0149] = ram_code;
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        rom
    }

    #[test]
    fn rtc_advances_with_emulated_time() {
        let mut rtc = Rtc::default();
        rtc.step(DOTS_PER_SECOND * 61);
        assert_eq!(rtc.regs.seconds, 1);
        assert_eq!(rtc.regs.minutes, 1);
    }

    #[test]
    fn rtc_halt_stops_counting() {
        let mut rtc = Rtc::default();
        rtc.write_register(0x0C, 0x40);
        rtc.step(DOTS_PER_SECOND * 5);
        assert_eq!(rtc.regs.seconds, 0);
    }

    #[test]
    fn rtc_day_overflow_sets_carry() {
        let mut rtc = Rtc::default();
        rtc.regs.days = 0x01FF;
        rtc.regs.hours = 23;
        rtc.regs.minutes = 59;
        rtc.regs.seconds = 59;
        rtc.step(DOTS_PER_SECOND);
        assert_eq!(rtc.regs.days, 0);
        assert!(rtc.regs.carry);
    }

    #[test]
    fn check_rejects_foreign_mapper_state() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x10, 0x03, 8), LoadFlags::empty()).unwrap();
        assert_eq!(cart.check(), Ok(()));

        if let Some(rtc) = cart.rtc_mut() {
            rtc.regs.seconds = 0x40;
        }
        assert_eq!(cart.check(), Err("RTC registers"));

        cart.mbc_state = MbcState::NoMbc;
        assert_eq!(cart.check(), Err("mapper state"));
    }

    #[test]
    fn rtc_file_roundtrip() {
        let mut rtc = Rtc::default();
        rtc.write_register(0x08, 12);
        rtc.write_register(0x09, 34);
        rtc.write_register(0x0C, 0xC1);
        let mut restored = Rtc::default();
        assert!(restored.load_from_bytes(&rtc.to_file_bytes()));
        assert_eq!(restored.regs, rtc.regs);
        assert_eq!(restored.latched, rtc.regs);
    }

    #[test]
    fn mbc1_bank_zero_maps_to_one() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x01, 0, 8), LoadFlags::empty()).unwrap();
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 1);
        cart.write(0x2000, 0x05);
        assert_eq!(cart.read(0x4000), 5);
    }

    #[test]
    fn mbc5_selects_high_banks() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x19, 0, 32), LoadFlags::empty()).unwrap();
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 0, "MBC5 allows bank 0 in the switchable window");
        cart.write(0x2000, 0x1F);
        assert_eq!(cart.read(0x4000), 0x1F);
    }

    #[test]
    fn mbc2_ram_is_four_bits_wide() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x06, 0, 4), LoadFlags::empty()).unwrap();
        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0xAB);
        assert_eq!(cart.read(0xA000), 0xFB);
        assert_eq!(cart.read(0xA200), 0xFB, "RAM mirrors every 512 bytes");
    }

    #[test]
    fn short_images_are_padded_to_two_banks() {
        let cart = Cartridge::from_bytes(vec![0u8; 0x200], LoadFlags::empty()).unwrap();
        assert_eq!(cart.rom.len(), 0x8000);
        assert_eq!(cart.read(0x7FFF), 0xFF);
    }

    #[test]
    fn reset_keeps_ram_and_clears_banking() {
        let mut cart = Cartridge::from_bytes(rom_with_type(0x03, 0x03, 8), LoadFlags::empty()).unwrap();
        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0x42);
        cart.write(0x2000, 0x03);
        cart.reset_registers();
        assert_eq!(cart.read(0x4000), 1);
        assert_eq!(cart.read(0xA000), 0xFF, "RAM is disabled again after reset");
        assert_eq!(cart.ram[0], 0x42);
    }
}
