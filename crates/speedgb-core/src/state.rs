//! Save-state blobs.
//!
//! ```text
//! u8      0xFF signature
//! u8      format version
//! u8      model (0 = DMG, 1 = CGB)
//! u24 BE  thumbnail length in bytes
//! [u32]   40x36 thumbnail, 0x00RRGGBB little-endian
//! u32     CRC32 of the ROM image
//! u32     payload length
//! [u8]    postcard-encoded machine
//! u32     CRC32 of the payload
//! ```
//!
//! Everything is checked before a machine is handed back, so a rejected blob
//! never reaches live state.

use crate::{
    error::StateError,
    gameboy::GameBoy,
    hardware::Model,
    video::{THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH},
};

pub const SIGNATURE: u8 = 0xFF;
pub const VERSION: u8 = 2;

const THUMBNAIL_BYTES: usize = THUMBNAIL_WIDTH * THUMBNAIL_HEIGHT * 4;

/// Everything in a blob ahead of the machine payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub model: Model,
    pub thumbnail: Vec<u32>,
    pub rom_crc32: u32,
}

pub fn encode(gb: &GameBoy, thumbnail: &[u32], rom_crc32: u32) -> Result<Vec<u8>, StateError> {
    let payload = postcard::to_allocvec(gb)?;

    let mut blob = Vec::with_capacity(payload.len() + THUMBNAIL_BYTES + 20);
    blob.push(SIGNATURE);
    blob.push(VERSION);
    blob.push(gb.model().to_byte());
    blob.extend_from_slice(&(THUMBNAIL_BYTES as u32).to_be_bytes()[1..]);
    for pixel in thumbnail {
        blob.extend_from_slice(&pixel.to_le_bytes());
    }
    blob.extend_from_slice(&rom_crc32.to_le_bytes());
    blob.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    blob.extend_from_slice(&payload);
    blob.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(blob)
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], StateError> {
        if self.data.len() < len {
            return Err(StateError::Truncated);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, StateError> {
        Ok(self.take(1)?[0])
    }

    fn u24_be(&mut self) -> Result<usize, StateError> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]) as usize)
    }

    fn u32_le(&mut self) -> Result<u32, StateError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn read_header(reader: &mut Reader<'_>) -> Result<Header, StateError> {
    if reader.u8()? != SIGNATURE {
        return Err(StateError::BadSignature);
    }
    let version = reader.u8()?;
    if version != VERSION {
        return Err(StateError::UnsupportedVersion {
            expected: VERSION,
            found: version,
        });
    }
    let model = Model::from_byte(reader.u8()?).ok_or(StateError::Incompatible("unknown model"))?;
    if reader.u24_be()? != THUMBNAIL_BYTES {
        return Err(StateError::Incompatible("thumbnail size"));
    }
    let thumbnail = reader
        .take(THUMBNAIL_BYTES)?
        .chunks_exact(4)
        .map(|p| u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
        .collect();
    let rom_crc32 = reader.u32_le()?;
    Ok(Header {
        model,
        thumbnail,
        rom_crc32,
    })
}

/// Read the header of a blob without decoding the machine.
pub fn header(blob: &[u8]) -> Result<Header, StateError> {
    read_header(&mut Reader { data: blob })
}

/// The 40x36 preview stored in a blob.
pub fn thumbnail(blob: &[u8]) -> Result<Vec<u32>, StateError> {
    Ok(header(blob)?.thumbnail)
}

/// Decode a blob made for `model` running the ROM with checksum `rom_crc32`.
/// The returned machine still lacks its ROM image and boot ROM.
pub fn decode(blob: &[u8], model: Model, rom_crc32: u32) -> Result<GameBoy, StateError> {
    let mut reader = Reader { data: blob };
    let header = read_header(&mut reader)?;
    if header.model != model {
        return Err(StateError::ModelMismatch);
    }
    if header.rom_crc32 != rom_crc32 {
        return Err(StateError::RomMismatch {
            expected: rom_crc32,
            found: header.rom_crc32,
        });
    }

    let len = reader.u32_le()? as usize;
    let payload = reader.take(len)?;
    let checksum = reader.u32_le()?;
    if crc32fast::hash(payload) != checksum {
        return Err(StateError::Checksum);
    }
    if !reader.data.is_empty() {
        return Err(StateError::Incompatible("trailing data"));
    }

    let gb: GameBoy = postcard::from_bytes(payload)?;
    validate(&gb, model)?;
    Ok(gb)
}

fn validate(gb: &GameBoy, model: Model) -> Result<(), StateError> {
    if gb.model() != model {
        return Err(StateError::Incompatible("model"));
    }
    gb.mmu.check(model.is_cgb()).map_err(StateError::Incompatible)
}
