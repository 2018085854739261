use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReductionError;

/// Reduction stage, used for session log blocks, progress reporting and
/// error messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    DataInput,
    Bias,
    Dark,
    Flat,
    Arc,
    FindSlits,
    FilterTargets,
    ArcHeaders,
    Reduce,
    WaveCal,
    ShiftCheck,
    Extract2d,
    Extract1d,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Self::DataInput,
        Self::Bias,
        Self::Dark,
        Self::Flat,
        Self::Arc,
        Self::FindSlits,
        Self::FilterTargets,
        Self::ArcHeaders,
        Self::Reduce,
        Self::WaveCal,
        Self::ShiftCheck,
        Self::Extract2d,
        Self::Extract1d,
    ];

    /// Tab the stage belongs to in the session log.
    pub fn tab(self) -> &'static str {
        match self {
            Self::DataInput => "Data Input",
            Self::Bias | Self::Dark | Self::Flat | Self::Arc => "Calibration",
            Self::FindSlits | Self::FilterTargets | Self::ArcHeaders => "Slits & Targets",
            Self::Reduce
            | Self::WaveCal
            | Self::ShiftCheck
            | Self::Extract2d
            | Self::Extract1d => "Science & Extraction",
        }
    }

    /// Action name recorded when the stage's parameters are logged.
    pub fn action(self) -> &'static str {
        match self {
            Self::DataInput => "Initialize Reducer",
            Self::Bias => "Compute Bias",
            Self::Dark => "Compute Dark",
            Self::Flat => "Compute Flat",
            Self::Arc => "Compute Arcs",
            Self::FindSlits => "Find Slits",
            Self::FilterTargets => "Filter Targets",
            Self::ArcHeaders => "Update Arc Headers",
            Self::Reduce => "Reduce Science Frame",
            Self::WaveCal => "Wavelength Calibration",
            Self::ShiftCheck => "Shift Check",
            Self::Extract2d => "2D Extraction",
            Self::Extract1d => "1D Extraction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataInput => write!(f, "Data Input"),
            Self::Bias => write!(f, "Bias"),
            Self::Dark => write!(f, "Dark"),
            Self::Flat => write!(f, "Flat"),
            Self::Arc => write!(f, "Arcs"),
            Self::FindSlits => write!(f, "Find Slits"),
            Self::FilterTargets => write!(f, "Filter Targets"),
            Self::ArcHeaders => write!(f, "Arc Headers"),
            Self::Reduce => write!(f, "Reduce"),
            Self::WaveCal => write!(f, "Wave Cal"),
            Self::ShiftCheck => write!(f, "Shift Check"),
            Self::Extract2d => write!(f, "2D Extract"),
            Self::Extract1d => write!(f, "1D Extract"),
        }
    }
}

impl FromStr for Stage {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|stage| stage.to_string() == s)
            .ok_or_else(|| ReductionError::InvalidInput(format!("unknown stage '{s}'")))
    }
}

/// Progress reporting for batch stages.
///
/// Implementors can use this to drive progress bars or logging. All methods
/// have default no-op implementations.
pub trait ProgressReporter {
    /// A batch stage has started over `total_items` slits or frames.
    fn begin_stage(&self, _stage: Stage, _total_items: Option<usize>) {}

    /// One item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
