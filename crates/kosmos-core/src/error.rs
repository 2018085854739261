use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum ReductionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage}: missing {}. Run the earlier steps first", missing.join(", "))]
    MissingPrerequisite {
        stage: Stage,
        missing: Vec<&'static str>,
    },

    #[error("{stage}: frame list is empty")]
    EmptyFrameList { stage: Stage },

    #[error("{traces} slit traces but {targets} targets; extraction needs one trace per target")]
    CardinalityMismatch { traces: usize, targets: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{stage} failed: {message}")]
    External { stage: Stage, message: String },

    #[error("No wavelength solution at {}", .0.display())]
    SolutionMissing(PathBuf),

    #[error("Line identification for target {target} did not converge after {attempts} attempts")]
    IdentifyDidNotConverge { target: String, attempts: usize },

    #[error("Frame header has no {0} keyword")]
    MissingHeader(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ReductionError {
    /// Shorthand for collaborator failures.
    pub fn external(stage: Stage, message: impl Into<String>) -> Self {
        Self::External {
            stage,
            message: message.into(),
        }
    }

    /// True for errors that are refused before any state change.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingPrerequisite { .. }
                | Self::EmptyFrameList { .. }
                | Self::CardinalityMismatch { .. }
                | Self::InvalidInput(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ReductionError>;
