use serde::{Deserialize, Serialize};

use crate::hardware::DOTS_PER_SAMPLE;

/// One interleaved stereo frame, left then right.
pub type Sample = [i16; 2];

// Four channels at +/-15 times the 1..=8 master volume must fit in i16.
const VOLUME_FACTOR: i16 = 64;

// Bits that read back as 1 for FF10..FF2F.
const READ_MASK: [u8; 0x20] = [
    0x80, 0x3F, 0x00, 0xFF, 0xBF, // NR10-NR14
    0xFF, 0x3F, 0x00, 0xFF, 0xBF, // unused, NR21-NR24
    0x7F, 0xFF, 0x9F, 0xFF, 0xBF, // NR30-NR34
    0xFF, 0xFF, 0x00, 0x00, 0xBF, // unused, NR41-NR44
    0x00, 0x00, 0x70, // NR50-NR52
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 0],
];

const NOISE_DIVISORS: [u32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Envelope {
    initial: u8,
    add: bool,
    period: u8,
    volume: u8,
    timer: u8,
}

impl Envelope {
    fn check(&self) -> Result<(), &'static str> {
        if self.initial > 15 || self.volume > 15 || self.period > 7 {
            return Err("envelope");
        }
        Ok(())
    }

    fn load(&mut self, nrx2: u8) {
        self.initial = nrx2 >> 4;
        self.add = nrx2 & 0x08 != 0;
        self.period = nrx2 & 0x07;
    }

    fn trigger(&mut self) {
        self.volume = self.initial;
        self.timer = self.period;
    }

    fn clock(&mut self) {
        if self.period == 0 {
            return;
        }
        if self.timer > 1 {
            self.timer -= 1;
            return;
        }
        self.timer = self.period;
        if self.add && self.volume < 15 {
            self.volume += 1;
        } else if !self.add && self.volume > 0 {
            self.volume -= 1;
        }
    }
}

/// Length counter shared by all four channels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Length {
    counter: u16,
    enabled: bool,
}

impl Length {
    /// Returns true when the counter expires and the channel must stop.
    fn clock(&mut self) -> bool {
        if self.enabled && self.counter > 0 {
            self.counter -= 1;
            return self.counter == 0;
        }
        false
    }

    fn trigger(&mut self, max: u16) {
        if self.counter == 0 {
            self.counter = max;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
}

impl Sweep {
    fn next_frequency(&self) -> u16 {
        let delta = self.shadow >> self.shift;
        if self.negate {
            self.shadow.wrapping_sub(delta)
        } else {
            self.shadow + delta
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Square {
    enabled: bool,
    dac: bool,
    duty: u8,
    duty_pos: u8,
    frequency: u16,
    timer: u32,
    length: Length,
    envelope: Envelope,
    sweep: Option<Sweep>,
}

impl Square {
    fn check(&self) -> Result<(), &'static str> {
        if self.duty > 3 || self.duty_pos > 7 || self.frequency > 2047 {
            return Err("square channel");
        }
        if let Some(sweep) = &self.sweep {
            if sweep.period > 7 || sweep.shift > 7 || sweep.shadow > 2047 {
                return Err("sweep");
            }
        }
        self.envelope.check()
    }

    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 4
    }

    fn advance(&mut self, dots: u32) {
        let mut dots = dots;
        while dots >= self.timer {
            dots -= self.timer;
            self.timer = self.period();
            self.duty_pos = (self.duty_pos + 1) & 7;
        }
        self.timer -= dots;
    }

    fn output(&self) -> i16 {
        if !self.enabled {
            return 0;
        }
        let volume = self.envelope.volume as i16;
        if DUTY_TABLE[self.duty as usize][self.duty_pos as usize] != 0 {
            volume
        } else {
            -volume
        }
    }

    fn trigger(&mut self) {
        self.enabled = self.dac;
        self.length.trigger(64);
        self.timer = self.period();
        self.envelope.trigger();
        let frequency = self.frequency;
        if let Some(sweep) = self.sweep.as_mut() {
            sweep.shadow = frequency;
            sweep.timer = if sweep.period == 0 { 8 } else { sweep.period };
            sweep.enabled = sweep.period != 0 || sweep.shift != 0;
            if sweep.shift != 0 && sweep.next_frequency() > 2047 {
                self.enabled = false;
            }
        }
    }

    fn clock_sweep(&mut self) {
        let Some(sweep) = self.sweep.as_mut() else {
            return;
        };
        if sweep.timer > 1 {
            sweep.timer -= 1;
            return;
        }
        sweep.timer = if sweep.period == 0 { 8 } else { sweep.period };
        if !sweep.enabled || sweep.period == 0 {
            return;
        }
        let next = sweep.next_frequency();
        if next > 2047 {
            self.enabled = false;
        } else if sweep.shift != 0 {
            sweep.shadow = next;
            self.frequency = next;
            if sweep.next_frequency() > 2047 {
                self.enabled = false;
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Wave {
    enabled: bool,
    dac: bool,
    frequency: u16,
    timer: u32,
    position: u8,
    level: u8,
    sample: u8,
    length: Length,
}

impl Wave {
    fn check(&self) -> Result<(), &'static str> {
        if self.frequency > 2047 || self.position > 31 || self.level > 3 || self.sample > 15 {
            return Err("wave channel");
        }
        Ok(())
    }

    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 2
    }

    fn advance(&mut self, dots: u32, ram: &[u8; 16]) {
        let mut dots = dots;
        while dots >= self.timer {
            dots -= self.timer;
            self.timer = self.period();
            self.position = (self.position + 1) & 31;
            let byte = ram[self.position as usize / 2];
            self.sample = if self.position & 1 == 0 { byte >> 4 } else { byte & 0x0F };
        }
        self.timer -= dots;
    }

    fn output(&self) -> i16 {
        if !self.enabled || self.level == 0 {
            return 0;
        }
        (self.sample as i16 * 2 - 15) >> (self.level - 1)
    }

    fn trigger(&mut self) {
        self.enabled = self.dac;
        self.length.trigger(256);
        // The first sample is read one period after the trigger.
        self.timer = self.period() + 6;
        self.position = 0;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Noise {
    enabled: bool,
    dac: bool,
    lfsr: u16,
    narrow: bool,
    divisor: u8,
    shift: u8,
    timer: u32,
    length: Length,
    envelope: Envelope,
}

impl Noise {
    fn check(&self) -> Result<(), &'static str> {
        if self.divisor > 7 || self.shift > 15 {
            return Err("noise channel");
        }
        self.envelope.check()
    }

    fn period(&self) -> u32 {
        NOISE_DIVISORS[self.divisor as usize] << self.shift
    }

    fn advance(&mut self, dots: u32) {
        let mut dots = dots;
        while dots >= self.timer {
            dots -= self.timer;
            self.timer = self.period();
            let bit = (self.lfsr ^ (self.lfsr >> 1)) & 1;
            self.lfsr = (self.lfsr >> 1) | (bit << 14);
            if self.narrow {
                self.lfsr = (self.lfsr & !0x40) | (bit << 6);
            }
        }
        self.timer -= dots;
    }

    fn output(&self) -> i16 {
        if !self.enabled {
            return 0;
        }
        let volume = self.envelope.volume as i16;
        if self.lfsr & 1 == 0 { volume } else { -volume }
    }

    fn trigger(&mut self) {
        self.enabled = self.dac;
        self.length.trigger(64);
        self.timer = self.period();
        self.lfsr = 0x7FFF;
        self.envelope.trigger();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Apu {
    ch1: Square,
    ch2: Square,
    ch3: Wave,
    ch4: Noise,
    regs: [u8; 0x20],
    wave_ram: [u8; 16],
    nr50: u8,
    nr51: u8,
    powered: bool,
    sequencer_step: u8,
    /// Dots left over from the last call that did not fill a sample.
    sample_phase: u32,
    samples: Vec<Sample>,
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu {
    pub fn new() -> Self {
        Self {
            ch1: Square {
                sweep: Some(Sweep::default()),
                ..Square::default()
            },
            ch2: Square::default(),
            ch3: Wave::default(),
            ch4: Noise::default(),
            regs: [0; 0x20],
            wave_ram: [0; 16],
            nr50: 0,
            nr51: 0,
            powered: false,
            sequencer_step: 0,
            sample_phase: 0,
            samples: Vec::new(),
        }
    }

    /// Register values after the boot ROM. The startup chime has already
    /// faded out, so every channel is silent.
    pub fn apply_boot_state(&mut self) {
        self.write_reg(0xFF26, 0x80);
        self.write_reg(0xFF24, 0x77);
        self.write_reg(0xFF25, 0xF3);
        self.write_reg(0xFF11, 0x80);
        self.write_reg(0xFF12, 0xF3);
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF26 => {
                let mut val = 0x70;
                if self.powered {
                    val |= 0x80;
                }
                if self.ch1.enabled {
                    val |= 0x01;
                }
                if self.ch2.enabled {
                    val |= 0x02;
                }
                if self.ch3.enabled {
                    val |= 0x04;
                }
                if self.ch4.enabled {
                    val |= 0x08;
                }
                val
            }
            0xFF10..=0xFF2F => {
                let idx = (addr - 0xFF10) as usize;
                self.regs[idx] | READ_MASK[idx]
            }
            0xFF30..=0xFF3F => self.wave_ram[(addr - 0xFF30) as usize],
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        if let 0xFF30..=0xFF3F = addr {
            self.wave_ram[(addr - 0xFF30) as usize] = val;
            return;
        }
        if addr == 0xFF26 {
            let power = val & 0x80 != 0;
            if self.powered && !power {
                self.power_off();
            } else if !self.powered && power {
                self.sequencer_step = 0;
            }
            self.powered = power;
            return;
        }
        if !self.powered || !(0xFF10..=0xFF25).contains(&addr) {
            return;
        }
        self.regs[(addr - 0xFF10) as usize] = val;

        match addr {
            0xFF10 => {
                if let Some(sweep) = self.ch1.sweep.as_mut() {
                    sweep.period = (val >> 4) & 0x07;
                    sweep.negate = val & 0x08 != 0;
                    sweep.shift = val & 0x07;
                }
            }
            0xFF11 => {
                self.ch1.duty = val >> 6;
                self.ch1.length.counter = 64 - (val & 0x3F) as u16;
            }
            0xFF12 => Self::write_envelope(&mut self.ch1.envelope, &mut self.ch1.dac, &mut self.ch1.enabled, val),
            0xFF13 => self.ch1.frequency = (self.ch1.frequency & 0x700) | val as u16,
            0xFF14 => {
                self.ch1.frequency = (self.ch1.frequency & 0xFF) | (((val & 0x07) as u16) << 8);
                self.ch1.length.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch1.trigger();
                }
            }
            0xFF16 => {
                self.ch2.duty = val >> 6;
                self.ch2.length.counter = 64 - (val & 0x3F) as u16;
            }
            0xFF17 => Self::write_envelope(&mut self.ch2.envelope, &mut self.ch2.dac, &mut self.ch2.enabled, val),
            0xFF18 => self.ch2.frequency = (self.ch2.frequency & 0x700) | val as u16,
            0xFF19 => {
                self.ch2.frequency = (self.ch2.frequency & 0xFF) | (((val & 0x07) as u16) << 8);
                self.ch2.length.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch2.trigger();
                }
            }
            0xFF1A => {
                self.ch3.dac = val & 0x80 != 0;
                if !self.ch3.dac {
                    self.ch3.enabled = false;
                }
            }
            0xFF1B => self.ch3.length.counter = 256 - val as u16,
            0xFF1C => self.ch3.level = (val >> 5) & 0x03,
            0xFF1D => self.ch3.frequency = (self.ch3.frequency & 0x700) | val as u16,
            0xFF1E => {
                self.ch3.frequency = (self.ch3.frequency & 0xFF) | (((val & 0x07) as u16) << 8);
                self.ch3.length.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch3.trigger();
                }
            }
            0xFF20 => self.ch4.length.counter = 64 - (val & 0x3F) as u16,
            0xFF21 => Self::write_envelope(&mut self.ch4.envelope, &mut self.ch4.dac, &mut self.ch4.enabled, val),
            0xFF22 => {
                self.ch4.shift = val >> 4;
                self.ch4.narrow = val & 0x08 != 0;
                self.ch4.divisor = val & 0x07;
            }
            0xFF23 => {
                self.ch4.length.enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch4.trigger();
                }
            }
            0xFF24 => self.nr50 = val,
            0xFF25 => self.nr51 = val,
            _ => {}
        }
    }

    fn write_envelope(envelope: &mut Envelope, dac: &mut bool, enabled: &mut bool, val: u8) {
        envelope.load(val);
        // The DAC is powered while the upper five bits are not all zero.
        *dac = val & 0xF8 != 0;
        if !*dac {
            *enabled = false;
        }
    }

    fn power_off(&mut self) {
        let wave_ram = self.wave_ram;
        let samples = std::mem::take(&mut self.samples);
        let sample_phase = self.sample_phase;
        *self = Self::new();
        self.wave_ram = wave_ram;
        self.samples = samples;
        self.sample_phase = sample_phase;
    }

    /// Frame sequencer tick, driven by the divider (512 Hz).
    pub fn clock_sequencer(&mut self) {
        if !self.powered {
            return;
        }
        let step = self.sequencer_step;
        self.sequencer_step = (step + 1) & 7;

        if step % 2 == 0 {
            if self.ch1.length.clock() {
                self.ch1.enabled = false;
            }
            if self.ch2.length.clock() {
                self.ch2.enabled = false;
            }
            if self.ch3.length.clock() {
                self.ch3.enabled = false;
            }
            if self.ch4.length.clock() {
                self.ch4.enabled = false;
            }
        }
        if step == 2 || step == 6 {
            self.ch1.clock_sweep();
        }
        if step == 7 {
            self.ch1.envelope.clock();
            self.ch2.envelope.clock();
            self.ch4.envelope.clock();
        }
    }

    /// Advance by `dots` base-clock ticks, producing one sample per
    /// [`DOTS_PER_SAMPLE`] dots.
    pub fn step(&mut self, dots: u32) {
        let mut dots = dots;
        while dots > 0 {
            let chunk = dots.min(DOTS_PER_SAMPLE - self.sample_phase);
            if self.powered {
                self.ch1.advance(chunk);
                self.ch2.advance(chunk);
                self.ch3.advance(chunk, &self.wave_ram);
                self.ch4.advance(chunk);
            }
            self.sample_phase += chunk;
            dots -= chunk;
            if self.sample_phase == DOTS_PER_SAMPLE {
                self.sample_phase = 0;
                let sample = self.mix();
                self.samples.push(sample);
            }
        }
    }

    fn mix(&self) -> Sample {
        if !self.powered {
            return [0, 0];
        }
        let outputs = [
            self.ch1.output(),
            self.ch2.output(),
            self.ch3.output(),
            self.ch4.output(),
        ];
        let mut left = 0i16;
        let mut right = 0i16;
        for (i, out) in outputs.iter().enumerate() {
            if self.nr51 & (0x10 << i) != 0 {
                left += out;
            }
            if self.nr51 & (0x01 << i) != 0 {
                right += out;
            }
        }
        let left_vol = ((self.nr50 >> 4) & 0x07) as i16 + 1;
        let right_vol = (self.nr50 & 0x07) as i16 + 1;
        [
            left * left_vol * VOLUME_FACTOR,
            right * right_vol * VOLUME_FACTOR,
        ]
    }

    /// Reject restored state whose channel fields are out of range.
    pub(crate) fn check(&self) -> Result<(), &'static str> {
        if self.ch1.sweep.is_none() || self.ch2.sweep.is_some() {
            return Err("sweep unit");
        }
        self.ch1.check()?;
        self.ch2.check()?;
        self.ch3.check()?;
        self.ch4.check()?;
        if self.sequencer_step > 7 || self.sample_phase >= DOTS_PER_SAMPLE {
            return Err("APU timing");
        }
        Ok(())
    }

    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    /// Move the oldest produced samples into `out`, as many as fit. Returns
    /// how many were written; the rest stay queued for the next call.
    pub fn take_samples(&mut self, out: &mut [Sample]) -> usize {
        let n = out.len().min(self.samples.len());
        for (dst, src) in out.iter_mut().zip(self.samples.drain(..n)) {
            *dst = src;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered() -> Apu {
        let mut apu = Apu::new();
        apu.write_reg(0xFF26, 0x80);
        apu.write_reg(0xFF24, 0x77);
        apu.write_reg(0xFF25, 0xFF);
        apu
    }

    #[test]
    fn one_sample_every_two_dots() {
        let mut apu = Apu::new();
        apu.step(5);
        assert_eq!(apu.pending_samples(), 2);
        apu.step(1);
        assert_eq!(apu.pending_samples(), 3);
        let mut out = [[1, 1]; 2];
        assert_eq!(apu.take_samples(&mut out), 2);
        assert!(out.iter().all(|s| *s == [0, 0]));
        assert_eq!(apu.pending_samples(), 1);
    }

    #[test]
    fn triggered_square_produces_tone() {
        let mut apu = powered();
        apu.write_reg(0xFF17, 0xF0);
        apu.write_reg(0xFF16, 0x80);
        apu.write_reg(0xFF18, 0x00);
        apu.write_reg(0xFF19, 0x87);
        assert_eq!(apu.read_reg(0xFF26) & 0x02, 0x02);

        apu.step(8192);
        let mut out = vec![[0, 0]; 8192];
        assert_eq!(apu.take_samples(&mut out), 4096);
        let peak = 15 * 8 * VOLUME_FACTOR;
        assert!(out.contains(&[peak, peak]));
        assert!(out.contains(&[-peak, -peak]));
    }

    #[test]
    fn dac_off_disables_channel() {
        let mut apu = powered();
        apu.write_reg(0xFF12, 0xF0);
        apu.write_reg(0xFF14, 0x80);
        assert_eq!(apu.read_reg(0xFF26) & 0x01, 0x01);
        apu.write_reg(0xFF12, 0x00);
        assert_eq!(apu.read_reg(0xFF26) & 0x01, 0x00);
    }

    #[test]
    fn length_counter_stops_channel() {
        let mut apu = powered();
        apu.write_reg(0xFF21, 0xF0);
        apu.write_reg(0xFF20, 0x3F); // one tick left
        apu.write_reg(0xFF23, 0xC0);
        assert_eq!(apu.read_reg(0xFF26) & 0x08, 0x08);
        apu.clock_sequencer();
        assert_eq!(apu.read_reg(0xFF26) & 0x08, 0x00);
    }

    #[test]
    fn power_off_clears_registers_but_keeps_wave_ram() {
        let mut apu = powered();
        apu.write_reg(0xFF30, 0x12);
        apu.write_reg(0xFF11, 0xC0);
        apu.write_reg(0xFF26, 0x00);
        assert_eq!(apu.read_reg(0xFF11), 0x3F);
        assert_eq!(apu.read_reg(0xFF30), 0x12);
        apu.write_reg(0xFF11, 0xC0);
        assert_eq!(apu.read_reg(0xFF11), 0x3F, "writes are ignored while off");
    }

    #[test]
    fn check_flags_out_of_range_channels() {
        let mut apu = powered();
        apu.write_reg(0xFF22, 0xF7);
        assert_eq!(apu.check(), Ok(()));

        apu.ch2.duty = 4;
        assert_eq!(apu.check(), Err("square channel"));
        apu.ch2.duty = 3;

        apu.ch3.position = 32;
        assert_eq!(apu.check(), Err("wave channel"));
        apu.ch3.position = 0;

        apu.ch4.divisor = 8;
        assert_eq!(apu.check(), Err("noise channel"));
        apu.ch4.divisor = 7;

        apu.sample_phase = DOTS_PER_SAMPLE;
        assert_eq!(apu.check(), Err("APU timing"));
    }
}
