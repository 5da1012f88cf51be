use std::{
    fs, io,
    path::{Path, PathBuf},
};

use speedgb_core::state;

pub const MIN_SLOT: u32 = 1;
pub const MAX_SLOT: u32 = 100;

/// Numbered save-state files for one ROM: `<dir>/<stem>_<slot>.gqs`.
#[derive(Debug, Clone)]
pub struct StateSlots {
    dir: PathBuf,
    stem: String,
    slot: u32,
}

impl StateSlots {
    /// Slots for `rom`, stored next to it unless `dir` is given. The stem is
    /// the file name up to its first dot.
    pub fn for_rom(rom: &Path, dir: Option<&Path>) -> Self {
        let name = rom
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = match name.find('.') {
            Some(dot) => name[..dot].to_string(),
            None => name,
        };
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => rom.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        Self {
            dir,
            stem,
            slot: MIN_SLOT,
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn select(&mut self, slot: u32) {
        self.slot = slot.clamp(MIN_SLOT, MAX_SLOT);
    }

    /// Move `amount` slots, wrapping around at either end.
    pub fn advance(&mut self, amount: i32) {
        let span = (MAX_SLOT - MIN_SLOT + 1) as i64;
        let offset = (self.slot - MIN_SLOT) as i64 + amount as i64;
        self.slot = MIN_SLOT + offset.rem_euclid(span) as u32;
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}_{}.gqs", self.stem, self.slot))
    }

    pub fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(self.path())
    }

    pub fn write(&self, blob: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(), blob)
    }

    /// Preview of the selected slot, if it holds a readable state.
    pub fn thumbnail(&self) -> Option<Vec<u32>> {
        let blob = self.read().ok()?;
        state::thumbnail(&blob).ok()
    }
}
