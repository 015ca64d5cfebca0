use bno055::OFFSET_BYTES;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::controller::interfaces::PersistentStore;

pub const DEFAULT_MIN_PULSE: u16 = 1000;
pub const DEFAULT_MAX_PULSE: u16 = 2000;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MotorRecord {
    pub min_pulse: u16,
    pub max_pulse: u16,
    pub az_scale: f32,
    pub el_scale: f32,
}

impl Default for MotorRecord {
    fn default() -> Self {
        Self {
            min_pulse: DEFAULT_MIN_PULSE,
            max_pulse: DEFAULT_MAX_PULSE,
            az_scale: 0.0,
            el_scale: 0.0,
        }
    }
}

impl MotorRecord {
    pub fn has_valid_limits(&self) -> bool {
        self.min_pulse < self.max_pulse
    }
}

/// Orientation sensor settings kept next to the servo calibration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorRecord {
    /// Operator-set declination. The configured one applies while this is unset.
    pub declination_deg: Option<f32>,
    pub offsets: Option<[u8; OFFSET_BYTES]>,
}

/// Everything that survives a restart. A default record means "uncalibrated".
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct CalibrationRecord {
    pub best_az_motor: u8,
    pub step: u8,
    pub motors: [MotorRecord; 2],
    #[serde(default)]
    pub sensor: SensorRecord,
}

/// Keeps the calibration record as a TOML file.
#[derive(Debug, Clone)]
pub struct TomlStore {
    path: PathBuf,
}

impl TomlStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PersistentStore for TomlStore {
    fn load(&mut self) -> io::Result<CalibrationRecord> {
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn save(&mut self, record: &CalibrationRecord) -> io::Result<()> {
        let content = toml::to_string_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Readers only ever see a complete record.
        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, content)?;
        fs::rename(&staging, &self.path)?;

        debug!(path = %self.path.display(), "Calibration record saved");
        Ok(())
    }
}
