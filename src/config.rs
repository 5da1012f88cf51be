use log::warn;
use serde::{Deserialize, Serialize};
use speedgb_core::LoadFlags;
use std::path::{Path, PathBuf};

/// Size of the CGB boot ROM image the runner accepts.
pub const BIOS_SIZE: usize = 2304;
/// CRC32 of that image.
pub const BIOS_CRC32: u32 = 828_843_416;

/// Persistent host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bios_path: Option<PathBuf>,
    pub load_flags: LoadFlags,
    /// Audio queued ahead of playback before emulation pauses, in ms.
    pub buffer_ms: u64,
    /// Output volume in percent.
    pub volume: u8,
    /// Where state slots go; next to the ROM when unset.
    pub state_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bios_path: None,
            load_flags: LoadFlags::CGB_MODE | LoadFlags::GBA_FLAG,
            buffer_ms: 68,
            volume: 100,
            state_dir: None,
        }
    }
}

impl Settings {
    pub fn volume_scale(&self) -> f32 {
        f32::from(self.volume.min(100)) / 100.0
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("speedgb").join("settings.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("speedgb").join("settings.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("speedgb")
            .join("settings.toml");
    }

    PathBuf::from("settings.toml")
}

pub fn load_from_file(path: &Path) -> Settings {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Settings::default();
    };

    match toml::from_str::<Settings>(&text) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(
                "Failed to parse settings {}: {e}; using defaults",
                path.display()
            );
            Settings::default()
        }
    }
}

pub fn save_to_file(path: &Path, settings: &Settings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(settings).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_or_broken_files_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        assert_eq!(load_from_file(&path), Settings::default());

        std::fs::write(&path, "buffer_ms = \"soon\"").unwrap();
        assert_eq!(load_from_file(&path), Settings::default());
    }

    #[test]
    fn settings_roundtrip_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = Settings {
            bios_path: Some(PathBuf::from("/roms/gbc_bios.bin")),
            load_flags: LoadFlags::CGB_MODE | LoadFlags::NO_BIOS,
            buffer_ms: 100,
            volume: 40,
            state_dir: None,
        };
        save_to_file(&path, &settings).unwrap();
        assert_eq!(load_from_file(&path), settings);
    }

    #[test]
    fn partial_files_keep_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "volume = 25\n").unwrap();
        let settings = load_from_file(&path);
        assert_eq!(settings.volume, 25);
        assert_eq!(settings.buffer_ms, 68);
        assert!(settings.load_flags.contains(LoadFlags::GBA_FLAG));
    }
}
