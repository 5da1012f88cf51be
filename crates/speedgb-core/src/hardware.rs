use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Visible screen width in pixels.
pub const SCREEN_WIDTH: usize = 160;
/// Visible screen height in pixels.
pub const SCREEN_HEIGHT: usize = 144;

/// Base clock rate. One "dot" is one tick of this clock regardless of the
/// CGB double-speed setting.
pub const DOTS_PER_SECOND: u32 = 4_194_304;
/// Dots in one full LCD frame (154 lines of 456 dots).
pub const DOTS_PER_FRAME: u32 = 70_224;

/// Dots per produced stereo audio sample.
pub const DOTS_PER_SAMPLE: u32 = 2;
/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = DOTS_PER_SECOND / DOTS_PER_SAMPLE;
/// Samples produced while the machine emulates one LCD frame.
pub const SAMPLES_PER_FRAME: u32 = DOTS_PER_FRAME / DOTS_PER_SAMPLE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
/// Emulated console model.
pub enum Model {
    #[default]
    Dmg,
    Cgb,
}

impl Model {
    #[inline]
    pub const fn is_cgb(self) -> bool {
        matches!(self, Model::Cgb)
    }

    pub(crate) const fn to_byte(self) -> u8 {
        match self {
            Model::Dmg => 0,
            Model::Cgb => 1,
        }
    }

    pub(crate) const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Model::Dmg),
            1 => Some(Model::Cgb),
            _ => None,
        }
    }
}

bitflags! {
    /// Flags accepted by [`Session::load_rom`](crate::Session::load_rom).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct LoadFlags: u32 {
        /// Run on Game Boy Color hardware. DMG-only cartridges then run in
        /// the CGB's compatibility mode.
        const CGB_MODE = 1;
        /// Report a Game Boy Advance to CGB software (B=1 after boot).
        const GBA_FLAG = 2;
        /// Detect MBC1 multicart wiring from the ROM contents.
        const MULTICART_COMPAT = 4;
        /// Super Game Boy mode. Accepted for compatibility; SGB hardware is
        /// not emulated.
        const SGB_MODE = 8;
        /// Never write battery RAM back to disk.
        const READ_ONLY_SAV = 16;
        /// Skip the boot ROM even when one has been loaded.
        const NO_BIOS = 32;
    }
}

impl LoadFlags {
    pub fn model(self) -> Model {
        if self.contains(LoadFlags::CGB_MODE) {
            Model::Cgb
        } else {
            Model::Dmg
        }
    }
}
