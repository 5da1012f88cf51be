use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    cartridge::Cartridge,
    cpu::Cpu,
    hardware::{LoadFlags, Model},
    mmu::Mmu,
};

/// Boot ROM size each model executes.
pub const fn boot_rom_size(model: Model) -> usize {
    match model {
        Model::Dmg => 0x100,
        Model::Cgb => 0x900,
    }
}

/// One complete machine: CPU plus the bus and everything hanging off it.
#[derive(Debug, Serialize, Deserialize)]
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    model: Model,
    flags: LoadFlags,
}

impl GameBoy {
    /// Power on with `cart` inserted. A boot ROM of the right size for the
    /// model runs from 0x0000; otherwise the machine starts in the state the
    /// boot ROM would have left.
    pub fn new(cart: Cartridge, flags: LoadFlags, boot_rom: Option<Vec<u8>>) -> Self {
        let model = flags.model();
        let mut mmu = Mmu::new(cart, model.is_cgb());

        let boot_rom = boot_rom.filter(|rom| {
            let fits = rom.len() == boot_rom_size(model);
            if !fits {
                debug!("Boot ROM of {} bytes does not fit {model:?}, skipping", rom.len());
            }
            fits
        });

        let cpu = match boot_rom {
            Some(rom) if !flags.contains(LoadFlags::NO_BIOS) => {
                mmu.map_boot_rom(rom);
                Cpu::power_on()
            }
            other => {
                // Keep the image around so a later reset without NO_BIOS can
                // still find it.
                mmu.boot_rom = other;
                mmu.apply_boot_state();
                Cpu::post_boot(model.is_cgb(), flags.contains(LoadFlags::GBA_FLAG))
            }
        };

        Self {
            cpu,
            mmu,
            model,
            flags,
        }
    }

    /// Power-cycle the machine, keeping the cartridge (and its battery RAM
    /// and clock) and the boot ROM.
    pub fn reset(self) -> Self {
        let flags = self.flags;
        let (mut cart, boot_rom) = self.mmu.into_media();
        cart.reset_registers();
        Self::new(cart, flags, boot_rom)
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn flags(&self) -> LoadFlags {
        self.flags
    }

    /// Execute one instruction (or one idle/interrupt step).
    #[inline]
    pub fn step(&mut self) {
        self.cpu.step(&mut self.mmu);
    }
}
