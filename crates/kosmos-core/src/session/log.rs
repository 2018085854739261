use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::consts::LOG_SEPARATOR_WIDTH;
use crate::error::{ReductionError, Result};
use crate::pipeline::Stage;

/// One logged action.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    /// Tab heading the action was logged under.
    pub tab: String,
    pub action: String,
    pub timestamp: String,
    pub parameters: Map<String, Value>,
}

impl LogEntry {
    /// The stage whose parameters this entry records, if any.
    pub fn stage(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.action() == self.action)
    }
}

/// Append-only record of the actions taken in one reduction session.
///
/// Entries are always kept in memory. Once [`SessionLog::start`] has opened
/// a file, each entry is also appended to it.
#[derive(Debug, Default)]
pub struct SessionLog {
    path: Option<PathBuf>,
    entries: Vec<LogEntry>,
}

impl SessionLog {
    /// Log that only keeps entries in memory.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create `{name}_log_{date}.txt` under `log_dir` and write its header.
    pub fn start(log_dir: &Path, star_name: &str) -> Result<Self> {
        fs::create_dir_all(log_dir)?;
        let date = Local::now().format("%Y-%m-%d").to_string();
        let safe_name = sanitize_name(star_name);
        if safe_name.is_empty() {
            return Err(ReductionError::InvalidInput(format!(
                "star name '{star_name}' has no usable characters"
            )));
        }
        let path = log_dir.join(format!("{safe_name}_log_{date}.txt"));

        let mut file = File::create(&path)?;
        writeln!(file, "# KOSMOS Reduction Log for Target: {star_name}")?;
        writeln!(file, "# Date: {date}")?;
        writeln!(file, "# This file contains the parameters used in each reduction step.")?;
        writeln!(file, "# It can be used to restore session settings.")?;
        writeln!(file, "{}", "-".repeat(LOG_SEPARATOR_WIDTH))?;

        info!(path = %path.display(), "Logging session");
        Ok(Self {
            path: Some(path),
            entries: Vec::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.path.is_some()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Record `action` under `stage`'s tab with `parameters` serialized as a
    /// JSON object. Non-object parameters are stored under `"value"`.
    pub fn log_action<P: Serialize + ?Sized>(
        &mut self,
        stage: Stage,
        action: &str,
        parameters: &P,
    ) -> Result<()> {
        let parameters = match serde_json::to_value(parameters)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let entry = LogEntry {
            tab: stage.tab().to_string(),
            action: action.to_string(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            parameters,
        };

        if let Some(path) = &self.path {
            let mut file = OpenOptions::new().append(true).open(path)?;
            file.write_all(format_entry(&entry)?.as_bytes())?;
        } else {
            debug!(action, "Session log not started, entry kept in memory only");
        }
        self.entries.push(entry);
        Ok(())
    }
}

fn format_entry(entry: &LogEntry) -> Result<String> {
    let json = serde_json::to_string_pretty(&entry.parameters)?;
    Ok(format!(
        "\n[TAB: {}]\nACTION: {}\nTIMESTAMP: {}\nPARAMETERS:\n{}\n{}\n",
        entry.tab,
        entry.action,
        entry.timestamp,
        json,
        "-".repeat(LOG_SEPARATOR_WIDTH)
    ))
}

/// Keep alphanumerics, `_` and `-`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Parse every block of a session log.
///
/// JSON lines after `PARAMETERS:` are accumulated until they parse as an
/// object. A block whose parameters never parse is dropped when the next
/// block starts; later blocks are still read.
pub fn parse_session_log(text: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut tab = String::new();
    let mut action = String::new();
    let mut timestamp = String::new();
    let mut buffer: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        let tab_heading = trimmed
            .strip_prefix("[TAB:")
            .and_then(|r| r.strip_suffix(']'));
        let opens_block = tab_heading.is_some() || trimmed == "PARAMETERS:";

        if let Some(json) = buffer.as_mut() {
            if opens_block {
                warn!(action = %action, "Unparseable parameters, block dropped");
                buffer = None;
            } else {
                json.push_str(line);
                json.push('\n');
                if let Ok(parameters) = serde_json::from_str::<Map<String, Value>>(json) {
                    entries.push(LogEntry {
                        tab: tab.clone(),
                        action: action.clone(),
                        timestamp: timestamp.clone(),
                        parameters,
                    });
                    buffer = None;
                }
                continue;
            }
        }

        if let Some(rest) = tab_heading {
            tab = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("ACTION:") {
            action = rest.trim().to_string();
        } else if let Some(rest) = trimmed.strip_prefix("TIMESTAMP:") {
            timestamp = rest.trim().to_string();
        } else if trimmed == "PARAMETERS:" {
            buffer = Some(String::new());
        }
    }
    if buffer.is_some() {
        warn!(action = %action, "Unparseable parameters, block dropped");
    }
    entries
}
