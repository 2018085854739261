//! Operator accept/retry loop shared by the extraction stages.
//!
//! Each slit runs `attempt(radius)` and then waits on [`Operator::confirm`].
//! The loop does not move on to the next slit until the current one is
//! accepted, skipped or failed.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::consts::{APERTURE_RADIUS_MAX, APERTURE_RADIUS_MIN, SKYLINE_RADIUS_MAX, SKYLINE_RADIUS_MIN};
use crate::error::Result;
use crate::target::Target;

use super::Stage;

/// Operator answer at a confirmation prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Run the attempt again with a new radius.
    Retry { radius: usize },
}

/// What the operator is shown before deciding.
#[derive(Clone, Debug)]
pub struct Review<'a> {
    pub stage: Stage,
    pub index: usize,
    pub target: &'a Target,
    pub radius: usize,
    /// 1-based attempt number for this slit.
    pub attempt: usize,
    /// Wavelength zero-point change from a sky-line refit, if one ran.
    pub zero_point_shift: Option<f64>,
}

pub trait Operator {
    fn confirm(&mut self, review: &Review<'_>) -> Decision;
}

/// Accepts every attempt.
pub struct AcceptAll;

impl Operator for AcceptAll {
    fn confirm(&mut self, _review: &Review<'_>) -> Decision {
        Decision::Accept
    }
}

/// Owned copy of a [`Review`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewRecord {
    pub stage: Stage,
    pub index: usize,
    pub target_id: String,
    pub radius: usize,
    pub attempt: usize,
}

/// Replays a fixed queue of decisions, then accepts everything.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    decisions: VecDeque<Decision>,
    reviews: Vec<ReviewRecord>,
}

impl ScriptedOperator {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            reviews: Vec::new(),
        }
    }

    /// Every prompt seen so far.
    pub fn reviews(&self) -> &[ReviewRecord] {
        &self.reviews
    }

    pub fn remaining(&self) -> usize {
        self.decisions.len()
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&mut self, review: &Review<'_>) -> Decision {
        self.reviews.push(ReviewRecord {
            stage: review.stage,
            index: review.index,
            target_id: review.target.id.clone(),
            radius: review.radius,
            attempt: review.attempt,
        });
        self.decisions.pop_front().unwrap_or(Decision::Accept)
    }
}

/// Radii the operator may choose from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadiusRange {
    pub min: usize,
    pub max: usize,
}

/// Object exclusion radius for 2D sky-line refits.
pub const SKYLINE_RADII: RadiusRange = RadiusRange {
    min: SKYLINE_RADIUS_MIN,
    max: SKYLINE_RADIUS_MAX,
};

/// Aperture radius for 1D extraction.
pub const APERTURE_RADII: RadiusRange = RadiusRange {
    min: APERTURE_RADIUS_MIN,
    max: APERTURE_RADIUS_MAX,
};

impl RadiusRange {
    pub fn clamp(self, requested: usize) -> usize {
        let radius = requested.clamp(self.min, self.max);
        if radius != requested {
            warn!(
                requested,
                radius,
                min = self.min,
                max = self.max,
                "Radius outside the allowed choices, clamped"
            );
        }
        radius
    }
}

/// Per-slit progress through an extraction batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlitState {
    Pending,
    Extracted,
    AwaitingConfirmation,
    Accepted,
    Skipped,
    Failed,
}

impl fmt::Display for SlitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Extracted => write!(f, "extracted"),
            Self::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            Self::Accepted => write!(f, "accepted"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final state of one slit in a batch, with the path it took there.
#[derive(Clone, Debug, PartialEq)]
pub struct SlitOutcome {
    pub index: usize,
    pub target_id: String,
    pub state: SlitState,
    /// Every state entered, starting with `Pending`.
    pub history: Vec<SlitState>,
    /// Radius of each attempt, in order.
    pub radii: Vec<usize>,
    pub output: Option<PathBuf>,
    pub zero_point_shift: Option<f64>,
    /// Why the slit was skipped or failed.
    pub note: Option<String>,
}

impl SlitOutcome {
    pub fn pending(index: usize, target: &Target) -> Self {
        Self {
            index,
            target_id: target.id.trim().to_string(),
            state: SlitState::Pending,
            history: vec![SlitState::Pending],
            radii: Vec::new(),
            output: None,
            zero_point_shift: None,
            note: None,
        }
    }

    pub fn transition(&mut self, state: SlitState) {
        self.state = state;
        self.history.push(state);
    }

    pub fn skip(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
        self.transition(SlitState::Skipped);
    }

    pub fn fail(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
        self.transition(SlitState::Failed);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SlitState::Accepted | SlitState::Skipped | SlitState::Failed
        )
    }
}

/// Value produced by one attempt.
#[derive(Clone, Debug)]
pub struct Attempt<T> {
    pub value: T,
    pub zero_point_shift: Option<f64>,
}

impl<T> Attempt<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            zero_point_shift: None,
        }
    }
}

/// The accepted attempt and the radius it used.
#[derive(Clone, Debug)]
pub struct Confirmed<T> {
    pub value: T,
    pub radius: usize,
}

/// Run `attempt` until the operator accepts.
///
/// Only the radius changes between attempts. An error from `attempt` ends the
/// loop and is returned; the caller decides what that means for the slit.
pub fn confirm_loop<T, F>(
    operator: &mut dyn Operator,
    stage: Stage,
    target: &Target,
    outcome: &mut SlitOutcome,
    range: RadiusRange,
    initial_radius: usize,
    mut attempt: F,
) -> Result<Confirmed<T>>
where
    F: FnMut(usize) -> Result<Attempt<T>>,
{
    let mut radius = range.clamp(initial_radius);
    loop {
        outcome.radii.push(radius);
        let result = attempt(radius)?;
        outcome.transition(SlitState::Extracted);
        outcome.zero_point_shift = result.zero_point_shift;
        outcome.transition(SlitState::AwaitingConfirmation);

        let review = Review {
            stage,
            index: outcome.index,
            target,
            radius,
            attempt: outcome.radii.len(),
            zero_point_shift: result.zero_point_shift,
        };
        match operator.confirm(&review) {
            Decision::Accept => {
                outcome.transition(SlitState::Accepted);
                return Ok(Confirmed {
                    value: result.value,
                    radius,
                });
            }
            Decision::Retry { radius: next } => {
                radius = range.clamp(next);
                debug!(target_id = %outcome.target_id, radius, "Retrying with new radius");
            }
        }
    }
}

/// Result of one batch stage over the working targets.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchReport {
    pub stage: Stage,
    pub outcomes: Vec<SlitOutcome>,
}

impl BatchReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            outcomes: Vec::new(),
        }
    }

    pub fn count(&self, state: SlitState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    /// Zero-point shifts of accepted slits, by target ID.
    pub fn zero_point_shifts(&self) -> Vec<(String, f64)> {
        self.outcomes
            .iter()
            .filter(|o| o.state == SlitState::Accepted)
            .filter_map(|o| o.zero_point_shift.map(|d| (o.target_id.clone(), d)))
            .collect()
    }

    /// True once every slit is accepted or skipped.
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.state, SlitState::Accepted | SlitState::Skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(SKYLINE_RADII.clamp(1), 2);
        assert_eq!(SKYLINE_RADII.clamp(20), 15);
        assert_eq!(APERTURE_RADII.clamp(2), 3);
        assert_eq!(APERTURE_RADII.clamp(8), 8);
    }

    #[test]
    fn test_confirm_loop_retries_until_accepted() {
        let target = Target::new("7", "star", 0.0, 0.0);
        let mut outcome = SlitOutcome::pending(0, &target);
        let mut operator = ScriptedOperator::new([
            Decision::Retry { radius: 8 },
            Decision::Retry { radius: 40 },
        ]);
        let confirmed = confirm_loop(
            &mut operator,
            Stage::Extract1d,
            &target,
            &mut outcome,
            APERTURE_RADII,
            5,
            |r| Ok(Attempt::new(r * 10)),
        )
        .unwrap();

        assert_eq!(confirmed.radius, 15);
        assert_eq!(confirmed.value, 150);
        assert_eq!(outcome.radii, vec![5, 8, 15]);
        assert_eq!(outcome.state, SlitState::Accepted);
        assert_eq!(operator.reviews().len(), 3);
        assert_eq!(operator.reviews()[2].attempt, 3);
    }

    #[test]
    fn test_outcome_history() {
        let target = Target::new("1", "a", 0.0, 0.0);
        let mut outcome = SlitOutcome::pending(3, &target);
        outcome.skip("no peak");
        assert_eq!(outcome.history, vec![SlitState::Pending, SlitState::Skipped]);
        assert!(outcome.is_terminal());
    }
}
