//! Stage functions. Each takes the [`FrameStore`](crate::store::FrameStore)
//! it reads and writes, its own config section, and the collaborators.
//! Preconditions are checked before anything is written.

pub mod calibration;
pub mod extract1d;
pub mod extract2d;
pub mod science;
pub mod slits;
pub mod wavecal;

use crate::error::ReductionError;
use crate::pipeline::Stage;

/// Precondition failure naming every check that did not hold.
pub(crate) fn missing(stage: Stage, checks: &[(&'static str, bool)]) -> ReductionError {
    ReductionError::MissingPrerequisite {
        stage,
        missing: checks
            .iter()
            .filter(|(_, is_missing)| *is_missing)
            .map(|(name, _)| *name)
            .collect(),
    }
}
