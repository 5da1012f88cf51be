use std::{fs, io, path::Path};

use log::{info, warn};

use crate::{
    cartridge::{Cartridge, RomInfo},
    error::{LoadError, PreconditionError, Result, StateError},
    gameboy::GameBoy,
    hardware::{LoadFlags, SAMPLES_PER_FRAME, SCREEN_WIDTH},
    input::{Buttons, InputGetter},
    ppu::BLANK_PIXEL,
    state,
    video::{FrameBuffer, FrameBufferMut},
};

pub use crate::apu::Sample;

const REVISION: u32 = 1;

/// Revision of the emulation core, as shown by hosts.
pub const fn revision() -> u32 {
    REVISION
}

/// What one [`Session::run_for`] call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOutcome {
    /// Stereo samples written to the front of the audio buffer. Never more
    /// than the buffer holds.
    pub samples: usize,
    /// Set when a video frame was completed: the number of samples that had
    /// been written at that moment. The call returns right after.
    pub frame: Option<usize>,
}

/// One emulated Game Boy.
///
/// A session starts empty. Load a ROM, then call [`run_for`](Self::run_for)
/// repeatedly; each call runs until a frame is completed or the audio buffer
/// is full. Battery RAM is written back when the ROM is replaced or unloaded,
/// when the session is dropped, and on [`flush_save`](Self::flush_save).
pub struct Session {
    gb: Option<GameBoy>,
    bios: Option<Vec<u8>>,
    input: Option<Box<dyn InputGetter + Send>>,
    /// Silent samples still owed by the last reset.
    stall: u64,
    /// Position of the stall inside its current blank frame.
    stall_phase: u32,
    /// Samples handed out since the session was created.
    clock: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            gb: None,
            bios: None,
            input: None,
            stall: 0,
            stall_phase: 0,
            clock: 0,
        }
    }

    /// Load a ROM image from disk, replacing whatever ran before. Battery RAM
    /// is read from the `.sav` file next to the ROM.
    pub fn load_rom<P: AsRef<Path>>(&mut self, path: P, flags: LoadFlags) -> Result<()> {
        let cart = Cartridge::from_file(path, flags)?;
        self.insert(cart, flags);
        Ok(())
    }

    /// Load a ROM image from memory. No battery file is attached.
    pub fn load_rom_bytes(&mut self, data: Vec<u8>, flags: LoadFlags) -> Result<()> {
        let cart = Cartridge::from_bytes(data, flags)?;
        self.insert(cart, flags);
        Ok(())
    }

    fn insert(&mut self, cart: Cartridge, flags: LoadFlags) {
        if let Err(e) = self.flush_save() {
            warn!("Failed to write battery RAM: {e}");
        }
        if flags.contains(LoadFlags::SGB_MODE) {
            warn!("Super Game Boy mode is not emulated; running as {:?}", flags.model());
        }
        info!("Powering on {:?} with \"{}\"", flags.model(), cart.title);
        self.gb = Some(GameBoy::new(cart, flags, self.bios.clone()));
        self.stall = 0;
        self.stall_phase = 0;
    }

    /// Load a boot ROM, checking it against the expected size and CRC32. It
    /// takes effect on the next [`load_rom`](Self::load_rom) or
    /// [`reset`](Self::reset).
    pub fn load_bios<P: AsRef<Path>>(&mut self, path: P, size: usize, crc32: u32) -> Result<()> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_bios_bytes(data, size, crc32)?;
        info!("Loaded boot ROM {}", path.display());
        Ok(())
    }

    pub fn load_bios_bytes(&mut self, data: Vec<u8>, size: usize, crc32: u32) -> Result<()> {
        if data.len() != size {
            return Err(LoadError::BiosSize {
                expected: size,
                actual: data.len(),
            }
            .into());
        }
        let actual = crc32fast::hash(&data);
        if actual != crc32 {
            return Err(LoadError::BiosChecksum {
                expected: crc32,
                actual,
            }
            .into());
        }
        self.bios = Some(data);
        Ok(())
    }

    pub fn has_bios(&self) -> bool {
        self.bios.is_some()
    }

    /// Emulate until a video frame completes or `audio` is full.
    ///
    /// The completed frame is written to `video` when one is given. Samples
    /// the last instruction produced beyond `audio.len()` are returned by the
    /// next call.
    pub fn run_for(
        &mut self,
        mut video: Option<FrameBufferMut<'_>>,
        audio: &mut [Sample],
    ) -> Result<RunOutcome> {
        let gb = self.gb.as_mut().ok_or(PreconditionError::NoRomLoaded)?;
        let mut produced = 0;
        let mut frame = None;

        while self.stall > 0 && produced < audio.len() {
            let chunk = (audio.len() - produced)
                .min(usize::try_from(self.stall).unwrap_or(usize::MAX))
                .min((SAMPLES_PER_FRAME - self.stall_phase) as usize);
            audio[produced..produced + chunk].fill([0, 0]);
            produced += chunk;
            self.stall -= chunk as u64;
            self.stall_phase += chunk as u32;
            if self.stall_phase == SAMPLES_PER_FRAME {
                self.stall_phase = 0;
                if let Some(video) = video.as_mut() {
                    video.fill(BLANK_PIXEL);
                }
                frame = Some(produced);
                break;
            }
        }
        if self.stall == 0 {
            self.stall_phase = 0;
        }

        if frame.is_none() && self.stall == 0 {
            produced += gb.mmu.apu.take_samples(&mut audio[produced..]);
            while produced < audio.len() {
                gb.step();
                produced += gb.mmu.apu.take_samples(&mut audio[produced..]);
                if gb.mmu.ppu.take_frame_ready() {
                    let buttons = self
                        .input
                        .as_mut()
                        .map_or(Buttons::empty(), |input| input.buttons());
                    gb.mmu.latch_input(buttons);
                    if let Some(video) = video.as_mut() {
                        video.blit(gb.mmu.ppu.framebuffer());
                    }
                    frame = Some(produced);
                    break;
                }
            }
        }

        self.clock += produced as u64;
        Ok(RunOutcome {
            samples: produced,
            frame,
        })
    }

    /// Power-cycle the machine, keeping the ROM, battery RAM and boot ROM.
    /// The next `stall_samples` samples are silence.
    pub fn reset(&mut self, stall_samples: u64) -> Result<()> {
        let gb = self.gb.take().ok_or(PreconditionError::NoRomLoaded)?;
        self.gb = Some(gb.reset());
        self.stall = stall_samples;
        self.stall_phase = 0;
        Ok(())
    }

    /// Register the input source polled at every input latch point.
    pub fn set_input_getter<G>(&mut self, getter: G)
    where
        G: InputGetter + Send + 'static,
    {
        self.input = Some(Box::new(getter));
    }

    /// Remove the input source; the machine then sees no buttons pressed.
    pub fn clear_input_getter(&mut self) {
        self.input = None;
    }

    /// Capture the whole machine. `video` is the frame the host is showing
    /// and becomes the state's thumbnail; without one the last emulated frame
    /// is used.
    pub fn save_state(&self, video: Option<FrameBuffer<'_>>) -> Result<Vec<u8>> {
        let gb = self.gb.as_ref().ok_or(PreconditionError::NoRomLoaded)?;
        let thumbnail = match video {
            Some(video) => video.thumbnail(),
            None => FrameBuffer::new(gb.mmu.ppu.framebuffer(), SCREEN_WIDTH)?.thumbnail(),
        };
        let blob = state::encode(gb, &thumbnail, gb.mmu.cart.crc32())?;
        info!("Saved state ({} bytes)", blob.len());
        Ok(blob)
    }

    /// Restore a blob from [`save_state`](Self::save_state). On error the
    /// session is left exactly as it was. A pending reset stall is dropped.
    pub fn load_state(&mut self, blob: &[u8]) -> Result<()> {
        let gb = self.gb.as_mut().ok_or(PreconditionError::NoRomLoaded)?;
        let mut loaded = state::decode(blob, gb.model(), gb.mmu.cart.crc32())?;
        if !loaded.mmu.cart.is_compatible_with(&gb.mmu.cart) {
            return Err(StateError::Incompatible("cartridge").into());
        }
        loaded.mmu.cart.adopt_media(&mut gb.mmu.cart);
        loaded.mmu.boot_rom = gb.mmu.boot_rom.take();
        *gb = loaded;
        self.stall = 0;
        self.stall_phase = 0;
        info!("Restored state ({} bytes)", blob.len());
        Ok(())
    }

    /// Samples of machine time (including stall) since the session was
    /// created. Never decreases.
    pub fn time_now(&self) -> u64 {
        self.clock
    }

    pub fn rom_info(&self) -> Option<RomInfo> {
        self.gb.as_ref().map(|gb| gb.mmu.cart.info())
    }

    pub fn is_rom_loaded(&self) -> bool {
        self.gb.is_some()
    }

    /// Write battery RAM back and drop the machine.
    pub fn unload_rom(&mut self) -> io::Result<()> {
        let result = self.flush_save();
        self.gb = None;
        self.stall = 0;
        self.stall_phase = 0;
        result
    }

    /// Write battery RAM (and the RTC) to disk now.
    pub fn flush_save(&mut self) -> io::Result<()> {
        match self.gb.as_mut() {
            Some(gb) => gb.mmu.cart.save_ram(),
            None => Ok(()),
        }
    }

    /// Bytes the game sent over the serial port since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.gb
            .as_mut()
            .map(|gb| gb.mmu.serial.take_output())
            .unwrap_or_default()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.flush_save() {
            warn!("Failed to write battery RAM: {e}");
        }
    }
}
