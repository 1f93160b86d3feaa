//! Durable per-client calibration values.
//!
//! Layout on disk:
//!
//! ```json
//! { "<userAgent>": { "<output>": [ ["<ISO-8601>", {"delay": 0.01, "gain": -3}], ... ] } }
//! ```
//!
//! Entries are only ever appended; reads return the last one.  A missing file
//! is a fresh store, a corrupt one is logged and replaced by an empty store.
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};

use crate::common::{box_error::BoxError, bus_message::CompensationProfile};

pub type Entry = (String, CompensationProfile);
type StoreData = BTreeMap<String, BTreeMap<String, Vec<Entry>>>;

pub struct CalibrationStore {
    path: Option<PathBuf>,
    data: StoreData,
}

impl CalibrationStore {
    /// Store that never touches the disk
    pub fn in_memory() -> CalibrationStore {
        CalibrationStore {
            path: None,
            data: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> CalibrationStore {
        let data = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<StoreData>(&raw) {
                Ok(data) => {
                    info!("calibration store: loaded {} clients from {}", data.len(), path.display());
                    data
                }
                Err(e) => {
                    warn!("calibration store: {} is corrupt, starting empty: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("calibration store: no file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                warn!("calibration store: cannot read {}, starting empty: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        CalibrationStore {
            path: Some(path.to_path_buf()),
            data,
        }
    }

    /// Append a timestamped entry and write the file.  Write failures are
    /// logged, the in-memory entry is kept.
    pub fn append(&mut self, user_agent: &str, output: &str, profile: CompensationProfile, when: DateTime<Utc>) -> () {
        let stamp = when.to_rfc3339_opts(SecondsFormat::Millis, true);
        self.data
            .entry(user_agent.to_string())
            .or_default()
            .entry(output.to_string())
            .or_default()
            .push((stamp, profile));
        if let Err(e) = self.save() {
            error!("calibration store: write failed: {}", e);
        }
    }

    pub fn store(&mut self, user_agent: &str, output: &str, profile: CompensationProfile) -> () {
        self.append(user_agent, output, profile, Utc::now());
    }

    /// most recent entry for this client and output
    pub fn latest(&self, user_agent: &str, output: &str) -> Option<CompensationProfile> {
        self.data
            .get(user_agent)?
            .get(output)?
            .last()
            .map(|(_, profile)| *profile)
    }

    pub fn history(&self, user_agent: &str, output: &str) -> &[Entry] {
        self.data
            .get(user_agent)
            .and_then(|outputs| outputs.get(output))
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn save(&self) -> Result<(), BoxError> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&self.data)?)?;
        Ok(())
    }
}
