//! Headless host for `speedgb-core`: frame pacing, the timed reset sequence,
//! state slots, scripted input and file outputs.

pub mod audio;
pub mod config;
pub mod driver;
pub mod screenshot;
pub mod script;
pub mod slots;

pub use driver::{Driver, ResetStage};
