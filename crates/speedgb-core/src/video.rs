//! Caller-owned pixel buffers.
//!
//! Pixels are `0x00RRGGBB`. `pitch` is the distance between the starts of two
//! rows, in pixels, and may exceed the screen width.

use crate::{
    error::PreconditionError,
    hardware::{SCREEN_HEIGHT, SCREEN_WIDTH},
};

/// Thumbnail dimensions embedded in save states.
pub const THUMBNAIL_WIDTH: usize = SCREEN_WIDTH / THUMBNAIL_SCALE;
pub const THUMBNAIL_HEIGHT: usize = SCREEN_HEIGHT / THUMBNAIL_SCALE;
const THUMBNAIL_SCALE: usize = 4;

fn validate(len: usize, pitch: usize) -> Result<(), PreconditionError> {
    if pitch < SCREEN_WIDTH {
        return Err(PreconditionError::PitchTooSmall {
            pitch,
            width: SCREEN_WIDTH,
        });
    }
    let required = pitch * (SCREEN_HEIGHT - 1) + SCREEN_WIDTH;
    if len < required {
        return Err(PreconditionError::VideoBufferTooSmall {
            required,
            actual: len,
        });
    }
    Ok(())
}

/// Writable view of a host frame buffer.
#[derive(Debug)]
pub struct FrameBufferMut<'a> {
    pixels: &'a mut [u32],
    pitch: usize,
}

impl<'a> FrameBufferMut<'a> {
    pub fn new(pixels: &'a mut [u32], pitch: usize) -> Result<Self, PreconditionError> {
        validate(pixels.len(), pitch)?;
        Ok(Self { pixels, pitch })
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    /// Copy a packed 160x144 frame in, row by row.
    pub fn blit(&mut self, frame: &[u32]) {
        for (y, row) in frame.chunks_exact(SCREEN_WIDTH).take(SCREEN_HEIGHT).enumerate() {
            let start = y * self.pitch;
            self.pixels[start..start + SCREEN_WIDTH].copy_from_slice(row);
        }
    }

    pub fn fill(&mut self, color: u32) {
        for y in 0..SCREEN_HEIGHT {
            let start = y * self.pitch;
            self.pixels[start..start + SCREEN_WIDTH].fill(color);
        }
    }

    pub fn as_frame(&self) -> FrameBuffer<'_> {
        FrameBuffer {
            pixels: &*self.pixels,
            pitch: self.pitch,
        }
    }
}

/// Read-only view of a host frame buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffer<'a> {
    pixels: &'a [u32],
    pitch: usize,
}

impl<'a> FrameBuffer<'a> {
    pub fn new(pixels: &'a [u32], pitch: usize) -> Result<Self, PreconditionError> {
        validate(pixels.len(), pitch)?;
        Ok(Self { pixels, pitch })
    }

    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        self.pixels[y * self.pitch + x]
    }

    /// Row `y` without the padding past the screen width.
    pub fn row(&self, y: usize) -> &'a [u32] {
        let start = y * self.pitch;
        &self.pixels[start..start + SCREEN_WIDTH]
    }

    /// Downscale to 40x36 by averaging each 4x4 block per channel.
    pub fn thumbnail(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(THUMBNAIL_WIDTH * THUMBNAIL_HEIGHT);
        for ty in 0..THUMBNAIL_HEIGHT {
            for tx in 0..THUMBNAIL_WIDTH {
                let mut sums = [0u32; 3];
                for y in ty * THUMBNAIL_SCALE..(ty + 1) * THUMBNAIL_SCALE {
                    for x in tx * THUMBNAIL_SCALE..(tx + 1) * THUMBNAIL_SCALE {
                        let p = self.pixel(x, y);
                        sums[0] += (p >> 16) & 0xFF;
                        sums[1] += (p >> 8) & 0xFF;
                        sums[2] += p & 0xFF;
                    }
                }
                let n = (THUMBNAIL_SCALE * THUMBNAIL_SCALE) as u32;
                out.push((sums[0] / n) << 16 | (sums[1] / n) << 8 | sums[2] / n);
            }
        }
        out
    }
}
