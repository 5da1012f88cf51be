//! Game Boy / Game Boy Color emulation core.
//!
//! The crate is organised like a small machine: the CPU, memory bus and the
//! peripherals it clocks (PPU, APU, timer, serial, joypad, cartridge) are
//! wired together by the [`gameboy`] facade. Hosts normally only touch the
//! [`session`] module, which wraps one machine behind a synchronous,
//! pull-based API: load a ROM, call [`Session::run_for`] with a video and
//! an audio buffer, feed input through an [`InputGetter`], and move state in
//! and out as opaque blobs.

/// Audio Processing Unit (APU) emulation.
pub mod apu;

/// Cartridge header parsing, mappers (MBC) and battery RAM.
pub mod cartridge;

/// SM83 CPU core.
pub mod cpu;

/// Error types reported by the session API.
pub mod error;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Hardware models, load flags and timing constants.
pub mod hardware;

/// Button masks and the pull-based input source.
pub mod input;

/// Joypad register and the per-frame input latch.
pub mod joypad;

/// Memory map and hardware plumbing.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// Serial port without a link partner.
pub mod serial;

/// Emulation session: the public embedding API.
pub mod session;

/// Save-state blob encoding.
pub mod state;

/// Divider/timer unit.
pub mod timer;

/// Caller-owned frame buffers.
pub mod video;

pub use cartridge::{MbcType, RomInfo};
pub use error::{Error, LoadError, PreconditionError, Result, StateError};
pub use hardware::{LoadFlags, Model, SAMPLE_RATE, SAMPLES_PER_FRAME, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use input::{Buttons, InputGetter};
pub use session::{RunOutcome, Sample, Session, revision};
pub use video::{FrameBuffer, FrameBufferMut};
