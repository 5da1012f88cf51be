use std::{io, time::Duration};

use speedgb::{
    audio::{AudioSink, NullSink},
    driver::{Driver, ResetStage, SAMPLES_TO_FADE_FOR, SAMPLES_TO_STALL_FOR},
    slots::StateSlots,
};
use speedgb_core::{Buttons, LoadFlags, SAMPLES_PER_FRAME, Sample};

const FRAME: usize = SAMPLES_PER_FRAME as usize;

fn rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
    rom[0x0134..0x0138].copy_from_slice(b"HOST");
    // JR -2
    rom[0x0150..0x0152].copy_from_slice(&[0x18, 0xFE]);
    rom
}

fn driver() -> Driver {
    let mut driver = Driver::new(LoadFlags::NO_BIOS, Duration::from_millis(68));
    driver.load_rom_bytes(rom()).unwrap();
    driver
}

struct FullSink;

impl AudioSink for FullSink {
    fn queue(&mut self, _samples: &[Sample]) -> io::Result<()> {
        panic!("a full sink should not be fed");
    }

    fn queued(&self) -> Duration {
        Duration::from_secs(1)
    }
}

#[test]
fn skipping_the_boot_rom_makes_the_driver_ready() {
    let mut driver = Driver::new(LoadFlags::empty(), Duration::from_millis(68));
    driver.load_rom_bytes(rom()).unwrap();
    assert!(!driver.is_ready(), "a boot ROM is required");
    assert!(self::driver().is_ready());
}

#[test]
fn frames_never_exceed_one_frame_of_audio() {
    let mut driver = driver();
    let mut frames = 0;
    for _ in 0..20 {
        let outcome = driver.advance_frame().unwrap();
        assert!(outcome.samples <= FRAME);
        assert_eq!(driver.samples().len(), outcome.samples);
        assert!(driver.frame_overflow() < FRAME);
        if outcome.frame.is_some() {
            frames += 1;
            assert_eq!(driver.frame_overflow(), 0);
        }
    }
    assert!(frames >= 10, "only {frames} frames in 20 calls");
}

#[test]
fn full_sink_pauses_emulation() {
    let mut driver = Driver::new(LoadFlags::NO_BIOS, Duration::from_millis(4));
    driver.load_rom_bytes(rom()).unwrap();
    let before = driver.session().time_now();
    assert!(driver.update(&mut FullSink).unwrap().is_none());
    assert_eq!(driver.session().time_now(), before);

    let mut sink = NullSink::default();
    let outcome = driver.update(&mut sink).unwrap().unwrap();
    assert_eq!(sink.samples, outcome.samples as u64);
}

#[test]
fn reset_sequence_fades_stalls_and_reports() {
    let mut driver = driver();
    driver.advance_frame().unwrap();
    assert!(driver.start_reset_with(0));
    assert!(!driver.start_reset_with(0), "already resetting");
    assert_eq!(driver.stage(), ResetStage::FadeToBlack);

    let mut faded = 0u64;
    let mut last_alpha = 0;
    while driver.stage() == ResetStage::FadeToBlack {
        let alpha = driver.fade_alpha().unwrap();
        assert!(alpha >= last_alpha);
        last_alpha = alpha;
        assert!(driver.save_state().unwrap().is_none());
        faded += driver.advance_frame().unwrap().samples as u64;
    }
    assert!(faded >= SAMPLES_TO_FADE_FOR);
    assert!(faded < SAMPLES_TO_FADE_FOR + FRAME as u64);

    assert_eq!(driver.stage(), ResetStage::Stalling);
    assert_eq!(driver.fade_alpha(), Some(255));
    let mut stalled = 0u64;
    while driver.stage() == ResetStage::Stalling {
        assert!(driver.display_frame().iter().all(|&p| p == 0));
        let outcome = driver.advance_frame().unwrap();
        if driver.stage() == ResetStage::Stalling {
            assert!(driver.samples().iter().all(|&s| s == [0, 0]));
        }
        stalled += outcome.samples as u64;
    }
    assert!(stalled >= SAMPLES_TO_STALL_FOR);
    assert!(stalled < SAMPLES_TO_STALL_FOR + FRAME as u64);

    assert_eq!(driver.stage(), ResetStage::ResetDone);
    let crc = driver.rom_info().unwrap().crc32;
    assert_eq!(driver.take_banner(), Some(format!("Reset r1 {crc:08X}")));
    assert_eq!(driver.take_banner(), None);

    driver.advance_frame().unwrap();
    assert_eq!(driver.stage(), ResetStage::NotResetting);
    assert_eq!(driver.fade_alpha(), None);
    assert!(driver.save_state().unwrap().is_some());
}

#[test]
fn states_are_refused_mid_reset() {
    let mut driver = driver();
    driver.advance_frame().unwrap();
    let blob = driver.save_state().unwrap().unwrap();

    driver.start_reset_with(0);
    driver.advance_frame().unwrap();
    let clock = driver.session().time_now();
    assert!(!driver.load_state(&blob).unwrap());
    assert_eq!(driver.stage(), ResetStage::FadeToBlack);
    assert_eq!(driver.session().time_now(), clock);
}

#[test]
fn slots_store_loadable_states_with_previews() {
    let dir = tempfile::tempdir().unwrap();
    let rom_path = dir.path().join("host.test.gb");
    std::fs::write(&rom_path, rom()).unwrap();

    let mut driver = Driver::new(LoadFlags::NO_BIOS, Duration::from_millis(68));
    driver.load_rom(&rom_path).unwrap();
    driver.set_buttons(Buttons::START);
    for _ in 0..3 {
        driver.advance_frame().unwrap();
    }

    let mut slots = StateSlots::for_rom(&rom_path, None);
    slots.select(7);
    slots.write(&driver.save_state().unwrap().unwrap()).unwrap();
    assert!(dir.path().join("host_7.gqs").exists());
    assert_eq!(slots.thumbnail().map(|t| t.len()), Some(40 * 36));

    driver.advance_frame().unwrap();
    let first: Vec<Sample> = driver.samples().to_vec();
    assert!(driver.load_state(&slots.read().unwrap()).unwrap());
    driver.advance_frame().unwrap();
    let n = first.len().min(driver.samples().len());
    assert!(n > 0);
    assert_eq!(&driver.samples()[..n], &first[..n]);
}
