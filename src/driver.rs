use std::{
    error::Error,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, info};
use rand::Rng;
use speedgb_core::{
    Buttons, FrameBuffer, FrameBufferMut, LoadFlags, Result, RomInfo, RunOutcome, SAMPLES_PER_FRAME,
    SCREEN_HEIGHT, SCREEN_WIDTH, Sample, Session, revision,
};

use crate::{
    audio::AudioSink,
    config::{BIOS_CRC32, BIOS_SIZE},
};

/// Extra room past one frame of samples in the audio buffer.
pub const AUDIO_BUFFER_OVERHEAD: usize = 2064;
/// Minimum length of the fade that precedes a reset.
pub const SAMPLES_TO_FADE_FOR: u64 = 1_234_567;
/// Silence the core emits after a reset, matching real power-off time.
pub const SAMPLES_TO_STALL_FOR: u64 = 101 * (2 << 14);

const FRAME_SAMPLES: usize = SAMPLES_PER_FRAME as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetStage {
    NotResetting,
    FadeToBlack,
    Stalling,
    ResetDone,
}

/// Paces a [`Session`] one video frame at a time and runs the timed reset
/// sequence.
pub struct Driver {
    session: Session,
    flags: LoadFlags,
    buffer: Duration,
    input: Arc<AtomicU8>,
    video: Vec<u32>,
    audio: Vec<Sample>,
    produced: usize,
    frame_overflow: usize,
    stage: ResetStage,
    fade_total: u64,
    fade_left: u64,
    stall_left: u64,
    banner: Option<String>,
}

impl Driver {
    pub fn new(flags: LoadFlags, buffer: Duration) -> Self {
        let input = Arc::new(AtomicU8::new(0));
        let mut session = Session::new();
        let held = Arc::clone(&input);
        session.set_input_getter(move || Buttons::from_bits_truncate(held.load(Ordering::Relaxed)));

        Self {
            session,
            flags,
            buffer,
            input,
            video: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            audio: vec![[0, 0]; FRAME_SAMPLES + AUDIO_BUFFER_OVERHEAD],
            produced: 0,
            frame_overflow: 0,
            stage: ResetStage::NotResetting,
            fade_total: 0,
            fade_left: 0,
            stall_left: 0,
            banner: None,
        }
    }

    pub fn load_bios(&mut self, path: &Path) -> Result<()> {
        self.session.load_bios(path, BIOS_SIZE, BIOS_CRC32)
    }

    pub fn load_rom(&mut self, path: &Path) -> Result<()> {
        self.session.load_rom(path, self.flags)?;
        self.frame_overflow = 0;
        self.stage = ResetStage::NotResetting;
        Ok(())
    }

    /// Load from memory, mostly for tests and tools.
    pub fn load_rom_bytes(&mut self, data: Vec<u8>) -> Result<()> {
        self.session.load_rom_bytes(data, self.flags)?;
        self.frame_overflow = 0;
        self.stage = ResetStage::NotResetting;
        Ok(())
    }

    /// A ROM is loaded and there is a boot ROM unless it is being skipped.
    pub fn is_ready(&self) -> bool {
        self.session.is_rom_loaded()
            && (self.session.has_bios() || self.flags.contains(LoadFlags::NO_BIOS))
    }

    pub fn set_buttons(&self, buttons: Buttons) {
        self.input.store(buttons.bits(), Ordering::Relaxed);
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn rom_info(&self) -> Option<RomInfo> {
        self.session.rom_info()
    }

    pub fn stage(&self) -> ResetStage {
        self.stage
    }

    /// Samples owed to the current video frame from earlier calls.
    pub fn frame_overflow(&self) -> usize {
        self.frame_overflow
    }

    /// Run until the next video frame or one frame's worth of samples.
    pub fn advance_frame(&mut self) -> Result<RunOutcome> {
        let request = FRAME_SAMPLES - self.frame_overflow;
        let video = FrameBufferMut::new(&mut self.video, SCREEN_WIDTH)?;
        let outcome = self
            .session
            .run_for(Some(video), &mut self.audio[..request])?;

        self.produced = outcome.samples;
        self.frame_overflow += outcome.samples;
        if outcome.frame.is_some() || self.frame_overflow >= FRAME_SAMPLES {
            self.frame_overflow = 0;
        }

        self.handle_reset(outcome.samples as u64)?;
        Ok(outcome)
    }

    /// Advance one frame if the sink is running low, otherwise wait a bit.
    pub fn update(
        &mut self,
        sink: &mut dyn AudioSink,
    ) -> std::result::Result<Option<RunOutcome>, Box<dyn Error>> {
        if sink.queued() >= self.buffer {
            thread::sleep(self.buffer / 4);
            return Ok(None);
        }
        let outcome = self.advance_frame()?;
        sink.queue(self.samples())?;

        let serial = self.session.take_serial_output();
        if !serial.is_empty() {
            debug!("Serial: {}", String::from_utf8_lossy(&serial));
        }
        Ok(Some(outcome))
    }

    /// Audio produced by the last [`advance_frame`](Self::advance_frame).
    pub fn samples(&self) -> &[Sample] {
        &self.audio[..self.produced]
    }

    /// The most recent frame, without the fade applied.
    pub fn frame(&self) -> &[u32] {
        &self.video
    }

    /// The frame as it should be shown: darkened while a reset is fading.
    pub fn display_frame(&self) -> Vec<u32> {
        match self.fade_alpha() {
            Some(alpha) => self
                .video
                .iter()
                .map(|&pixel| darken(pixel, alpha))
                .collect(),
            None => self.video.clone(),
        }
    }

    /// Opacity of the black overlay, 0..=255, while a reset is under way.
    pub fn fade_alpha(&self) -> Option<u8> {
        match self.stage {
            ResetStage::FadeToBlack if self.fade_total > 0 => {
                let done = self.fade_total - self.fade_left;
                Some((255 * done / self.fade_total) as u8)
            }
            ResetStage::FadeToBlack | ResetStage::Stalling => Some(255),
            _ => None,
        }
    }

    /// Begin the fade-out that ends in a hard reset. Returns false when a
    /// reset is already running or nothing is loaded.
    pub fn start_reset(&mut self) -> bool {
        let jitter = rand::thread_rng().gen_range(0..SAMPLES_PER_FRAME as u64);
        self.start_reset_with(jitter)
    }

    /// [`start_reset`](Self::start_reset) with a fixed extra fade length.
    pub fn start_reset_with(&mut self, jitter: u64) -> bool {
        if self.stage != ResetStage::NotResetting || !self.session.is_rom_loaded() {
            return false;
        }
        self.fade_total = SAMPLES_TO_FADE_FOR + jitter;
        self.fade_left = self.fade_total;
        self.stage = ResetStage::FadeToBlack;
        info!("Reset requested, fading for {} samples", self.fade_total);
        true
    }

    fn handle_reset(&mut self, samples: u64) -> Result<()> {
        match self.stage {
            ResetStage::NotResetting => {}
            ResetStage::FadeToBlack => {
                self.fade_left = self.fade_left.saturating_sub(samples);
                if self.fade_left == 0 {
                    self.session.reset(SAMPLES_TO_STALL_FOR)?;
                    self.stall_left = SAMPLES_TO_STALL_FOR;
                    self.stage = ResetStage::Stalling;
                }
            }
            ResetStage::Stalling => {
                self.stall_left = self.stall_left.saturating_sub(samples);
                if self.stall_left == 0 {
                    let crc = self.rom_info().map_or(0, |info| info.crc32);
                    let banner = format!("Reset r{} {crc:08X}", revision());
                    info!("{banner}");
                    self.banner = Some(banner);
                    self.stage = ResetStage::ResetDone;
                }
            }
            ResetStage::ResetDone => self.stage = ResetStage::NotResetting,
        }
        Ok(())
    }

    /// The post-reset message, once.
    pub fn take_banner(&mut self) -> Option<String> {
        self.banner.take()
    }

    /// Snapshot the machine, with the displayed frame as its thumbnail.
    /// `None` while a reset is in progress.
    pub fn save_state(&self) -> Result<Option<Vec<u8>>> {
        if self.stage != ResetStage::NotResetting {
            return Ok(None);
        }
        let video = FrameBuffer::new(&self.video, SCREEN_WIDTH)?;
        self.session.save_state(Some(video)).map(Some)
    }

    /// Restore a snapshot. Returns false, without touching the session,
    /// while a reset is in progress.
    pub fn load_state(&mut self, blob: &[u8]) -> Result<bool> {
        if self.stage != ResetStage::NotResetting {
            return Ok(false);
        }
        self.session.load_state(blob)?;
        self.frame_overflow = 0;
        Ok(true)
    }
}

fn darken(pixel: u32, alpha: u8) -> u32 {
    let keep = 255 - u32::from(alpha);
    let scale = |shift: u32| (((pixel >> shift) & 0xFF) * keep / 255) << shift;
    scale(16) | scale(8) | scale(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn darken_scales_each_channel() {
        assert_eq!(darken(0x00FF_8040, 0), 0x00FF_8040);
        assert_eq!(darken(0x00FF_8040, 255), 0);
        assert_eq!(darken(0x00FF_FFFF, 51), 0x00CC_CCCC);
    }

    #[test]
    fn idle_driver_is_not_ready() {
        let mut driver = Driver::new(LoadFlags::empty(), Duration::from_millis(68));
        assert!(!driver.is_ready());
        assert!(!driver.start_reset());
        assert!(driver.advance_frame().is_err());
        assert_eq!(driver.fade_alpha(), None);
    }
}
