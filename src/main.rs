use std::{error::Error, path::PathBuf, time::Duration};

use clap::Parser;
use log::{info, warn};
use speedgb::{
    audio::{AudioSink, NullSink, WavSink},
    config,
    driver::Driver,
    screenshot,
    script::InputScript,
    slots::StateSlots,
};
use speedgb_core::LoadFlags;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// CGB boot ROM image (overrides the settings file)
    #[arg(long, conflicts_with = "no_bios")]
    bios: Option<PathBuf>,

    /// Start from the post-boot state without running a boot ROM
    #[arg(long)]
    no_bios: bool,

    /// Run as a DMG even when the cartridge supports CGB
    #[arg(long)]
    dmg: bool,

    /// Number of video frames to run
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Scripted input, e.g. "start@60..62 a+right@100..200"
    #[arg(long)]
    hold: Option<String>,

    /// Start the timed reset sequence at this frame
    #[arg(long)]
    reset_at: Option<u64>,

    /// Write the last frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Record audio to this WAV file
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Load this state slot before running
    #[arg(long)]
    load_slot: Option<u32>,

    /// Save into this state slot after running
    #[arg(long)]
    save_slot: Option<u32>,

    /// Settings file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_settings_path);
    let mut settings = config::load_from_file(&settings_path);
    if !settings_path.exists() {
        if let Err(e) = config::save_to_file(&settings_path, &settings) {
            warn!("Could not write {}: {e}", settings_path.display());
        }
    }
    if let Some(bios) = &args.bios {
        settings.bios_path = Some(bios.clone());
    }

    let mut flags = settings.load_flags;
    if args.dmg {
        flags.remove(LoadFlags::CGB_MODE | LoadFlags::GBA_FLAG);
    }
    if args.no_bios {
        flags.insert(LoadFlags::NO_BIOS);
    }

    let script = args.hold.as_deref().map(InputScript::parse).transpose()?;

    let mut driver = Driver::new(flags, Duration::from_millis(settings.buffer_ms));
    if !flags.contains(LoadFlags::NO_BIOS) {
        let Some(bios) = &settings.bios_path else {
            return Err("no boot ROM configured; pass --bios or --no-bios".into());
        };
        driver.load_bios(bios)?;
    }
    driver.load_rom(&args.rom)?;
    if !driver.is_ready() {
        return Err("emulator is not ready to run".into());
    }
    if let Some(info) = driver.rom_info() {
        info!("{} ({:?}, CRC32 {:08X})", info.title, info.mbc, info.crc32);
    }

    let mut slots = StateSlots::for_rom(&args.rom, settings.state_dir.as_deref());
    if let Some(slot) = args.load_slot {
        slots.select(slot);
        let blob = slots.read()?;
        driver.load_state(&blob)?;
        info!("Loaded state slot {}", slots.slot());
    }

    let mut sink: Box<dyn AudioSink> = match &args.wav {
        Some(path) => Box::new(WavSink::create(path, settings.volume_scale())?),
        None => Box::new(NullSink::default()),
    };

    let mut frames = 0;
    while frames < args.frames {
        if let Some(script) = &script {
            driver.set_buttons(script.buttons_at(frames));
        }
        if args.reset_at == Some(frames) {
            driver.start_reset();
        }
        if let Some(outcome) = driver.update(sink.as_mut())? {
            if outcome.frame.is_some() {
                frames += 1;
            }
        }
        if let Some(banner) = driver.take_banner() {
            println!("{banner}");
        }
    }
    sink.finish()?;

    if let Some(path) = &args.screenshot {
        screenshot::write_png(path, &driver.display_frame())?;
        info!("Wrote {}", path.display());
    }

    if let Some(slot) = args.save_slot {
        slots.select(slot);
        match driver.save_state()? {
            Some(blob) => {
                slots.write(&blob)?;
                info!("Saved state slot {} to {}", slots.slot(), slots.path().display());
            }
            None => warn!("Reset in progress; state not saved"),
        }
    }

    driver.session_mut().flush_save()?;
    info!("Ran {frames} frames, {} samples", driver.session().time_now());
    Ok(())
}
