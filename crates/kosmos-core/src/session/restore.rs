use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::log::LogEntry;
use crate::error::Result;
use crate::pipeline::config::ReductionConfig;
use crate::pipeline::Stage;

/// What [`ReductionConfig::restore_from_log`] did with each entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RestoreReport {
    /// Stages whose section was updated, in first-applied order.
    pub applied: Vec<Stage>,
    /// One note per entry that was left out.
    pub skipped: Vec<String>,
}

/// Overlay the logged keys onto the current value, keeping everything else.
fn overlay<T: Serialize + DeserializeOwned>(current: &T, params: &Map<String, Value>) -> Result<T> {
    let mut value = serde_json::to_value(current)?;
    if let Value::Object(map) = &mut value {
        for (key, v) in params {
            map.insert(key.clone(), v.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

#[derive(serde::Deserialize)]
struct DataInputParams {
    data_dir: Option<PathBuf>,
}

impl ReductionConfig {
    /// Re-apply the stage parameters recorded in a session log. Entries are
    /// applied in order, so the last entry for a stage wins. Per-slit
    /// decisions and other audit entries are reported as skipped.
    pub fn restore_from_log(&mut self, entries: &[LogEntry]) -> RestoreReport {
        let mut report = RestoreReport::default();

        for entry in entries {
            let Some(stage) = entry.stage() else {
                debug!(action = %entry.action, "Audit entry, not restored");
                report
                    .skipped
                    .push(format!("{}: no settings to restore", entry.action));
                continue;
            };

            match self.apply_entry(stage, &entry.parameters) {
                Ok(true) => {
                    if !report.applied.contains(&stage) {
                        report.applied.push(stage);
                    }
                }
                Ok(false) => report
                    .skipped
                    .push(format!("{}: no settings to restore", entry.action)),
                Err(e) => {
                    warn!(action = %entry.action, error = %e, "Could not restore logged parameters");
                    report.skipped.push(format!("{}: {e}", entry.action));
                }
            }
        }
        report
    }

    fn apply_entry(&mut self, stage: Stage, params: &Map<String, Value>) -> Result<bool> {
        match stage {
            Stage::DataInput => {
                let parsed: DataInputParams = serde_json::from_value(Value::Object(params.clone()))?;
                self.data_dir = parsed.data_dir;
            }
            Stage::Bias => self.bias = overlay(&self.bias, params)?,
            Stage::Dark => self.dark = overlay(&self.dark, params)?,
            Stage::Flat => self.flat = overlay(&self.flat, params)?,
            Stage::Arc => self.arc = overlay(&self.arc, params)?,
            Stage::FindSlits => self.slits = overlay(&self.slits, params)?,
            Stage::FilterTargets => self.filter = overlay(&self.filter, params)?,
            Stage::ArcHeaders => return Ok(false),
            Stage::Reduce => self.science = overlay(&self.science, params)?,
            Stage::WaveCal => self.wavecal = overlay(&self.wavecal, params)?,
            Stage::ShiftCheck => self.shift_check = overlay(&self.shift_check, params)?,
            Stage::Extract2d => self.extract2d = overlay(&self.extract2d, params)?,
            Stage::Extract1d => self.extract1d = overlay(&self.extract1d, params)?,
        }
        Ok(true)
    }
}
