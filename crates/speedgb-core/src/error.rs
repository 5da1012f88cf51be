use std::{io, path::PathBuf};

use thiserror::Error;

/// Failure to load a ROM or boot ROM image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed ROM image: {0}")]
    Malformed(&'static str),

    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedMapper(u8),

    #[error("boot ROM is {actual} bytes, expected {expected}")]
    BiosSize { expected: usize, actual: usize },

    #[error("boot ROM checksum {actual:#010X} does not match expected {expected:#010X}")]
    BiosChecksum { expected: u32, actual: u32 },
}

/// An operation was called in a state where it cannot run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("no ROM is loaded")]
    NoRomLoaded,

    #[error("video pitch {pitch} is narrower than the {width}-pixel screen")]
    PitchTooSmall { pitch: usize, width: usize },

    #[error("video buffer holds {actual} pixels, {required} needed at this pitch")]
    VideoBufferTooSmall { required: usize, actual: usize },
}

/// A save-state blob was rejected. The session is left untouched.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state blob is truncated")]
    Truncated,

    #[error("not a save state (bad signature)")]
    BadSignature,

    #[error("unsupported save state version {found} (expected {expected})")]
    UnsupportedVersion { expected: u8, found: u8 },

    #[error("save state was made on a different hardware model")]
    ModelMismatch,

    #[error("save state belongs to a different ROM (CRC32 {found:#010X}, loaded {expected:#010X})")]
    RomMismatch { expected: u32, found: u32 },

    #[error("save state payload checksum mismatch")]
    Checksum,

    #[error("failed to decode save state: {0}")]
    Decode(#[from] postcard::Error),

    #[error("save state is structurally invalid: {0}")]
    Incompatible(&'static str),
}

/// Any error reported by a [`Session`](crate::Session) operation.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type Result<T> = std::result::Result<T, Error>;
