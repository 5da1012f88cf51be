#![allow(dead_code)]

use speedgb_core::{FrameBufferMut, SAMPLES_PER_FRAME, Sample, Session};

/// Where [`RomBuilder::program`] places code; 0x0100 jumps here.
pub const CODE_START: usize = 0x0150;

/// Assembles a minimal cartridge image around a hand-written program.
pub struct RomBuilder {
    rom: Vec<u8>,
}

impl RomBuilder {
    pub fn new() -> Self {
        let mut rom = vec![0u8; 0x8000];
        // JP 0x0150
        rom[0x0100..0x0104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
        let mut builder = Self { rom };
        builder = builder.title("TEST");
        // Park the CPU if no program is given.
        builder.rom[CODE_START..CODE_START + 2].copy_from_slice(&[0x18, 0xFE]);
        builder
    }

    pub fn title(mut self, title: &str) -> Self {
        let field = &mut self.rom[0x0134..0x0143];
        field.fill(0);
        for (dst, src) in field.iter_mut().zip(title.bytes()) {
            *dst = src;
        }
        self
    }

    pub fn cart_type(mut self, cart_type: u8, ram_code: u8) -> Self {
        self.rom[0x0147] = cart_type;
        self.rom[0x0149] = ram_code;
        self
    }

    pub fn cgb(mut self) -> Self {
        self.rom[0x0143] = 0x80;
        self
    }

    pub fn program(mut self, code: &[u8]) -> Self {
        self.rom[CODE_START..CODE_START + code.len()].copy_from_slice(code);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.rom
    }
}

/// Start a 50% duty tone on channel 2, then spin.
pub const TONE: &[u8] = &[
    0x3E, 0xF0, 0xE0, 0x17, // NR22 = F0
    0x3E, 0x80, 0xE0, 0x16, // NR21 = 80
    0x3E, 0x00, 0xE0, 0x18, // NR23 = 00
    0x3E, 0x87, 0xE0, 0x19, // NR24 = 87 (trigger)
    0x18, 0xFE, // JR -2
];

/// Striped tile 0, a tone, then a loop that bumps a counter into SCX and
/// the tone frequency. Every frame looks and sounds different.
pub const SCROLLER: &[u8] = &[
    0x21, 0x00, 0x80, // LD HL,0x8000
    0x06, 0x10, // LD B,16
    0x3E, 0x3C, // LD A,0x3C
    0x22, // LD (HL+),A
    0x05, // DEC B
    0x20, 0xFA, // JR NZ,-6
    0x3E, 0xF0, 0xE0, 0x17, //
    0x3E, 0x80, 0xE0, 0x16, //
    0x3E, 0x00, 0xE0, 0x18, //
    0x3E, 0x87, 0xE0, 0x19, //
    0x21, 0x00, 0xC0, // LD HL,0xC000
    0x34, // INC (HL)
    0x7E, // LD A,(HL)
    0xE0, 0x43, // LDH (SCX),A
    0xE0, 0x18, // LDH (NR23),A
    0x18, 0xF8, // JR -8
];

/// Send register B over the serial port, then spin.
pub const SEND_B: &[u8] = &[
    0x78, // LD A,B
    0xE0, 0x01, // LDH (SB),A
    0x3E, 0x81, // LD A,0x81
    0xE0, 0x02, // LDH (SC),A
    0x18, 0xFE,
];

/// Send 0x55 over the serial port, then spin.
pub const SEND_55: &[u8] = &[0x3E, 0x55, 0xE0, 0x01, 0x3E, 0x81, 0xE0, 0x02, 0x18, 0xFE];

pub fn rom_with(program: &[u8]) -> Vec<u8> {
    RomBuilder::new().program(program).build()
}

/// Output of a run of `run_for` calls, concatenated.
#[derive(Debug, Default, PartialEq)]
pub struct Capture {
    pub audio: Vec<Sample>,
    pub frames: Vec<Vec<u32>>,
}

/// Call `run_for` with `budget`-sample buffers until `total` samples came out.
pub fn capture(session: &mut Session, budget: usize, total: usize) -> Capture {
    let mut out = Capture::default();
    let mut audio = vec![[0i16; 2]; budget];
    let mut video = vec![0u32; 160 * 144];
    while out.audio.len() < total {
        let want = budget.min(total - out.audio.len());
        let fb = FrameBufferMut::new(&mut video, 160).unwrap();
        let outcome = session.run_for(Some(fb), &mut audio[..want]).unwrap();
        assert!(outcome.samples <= want);
        out.audio.extend_from_slice(&audio[..outcome.samples]);
        if outcome.frame.is_some() {
            out.frames.push(video.clone());
        }
    }
    out
}

/// Run until `n` frames were completed.
pub fn run_frames(session: &mut Session, n: usize) {
    let mut audio = vec![[0i16; 2]; SAMPLES_PER_FRAME as usize + 2064];
    let mut done = 0;
    while done < n {
        if session.run_for(None, &mut audio).unwrap().frame.is_some() {
            done += 1;
        }
    }
}
