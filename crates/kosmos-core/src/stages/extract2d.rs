//! Rectified 2D slitlets from the reduced science frame.
//!
//! Without adjustment each slitlet gets its arc solution as-is. With
//! adjustment the solution's zero point is refit on night-sky lines in rows
//! away from the object, and the operator accepts or retries with a new
//! exclusion radius before the slitlet is written.

use std::path::Path;

use tracing::{info, warn};

use super::missing;
use crate::error::{ReductionError, Result};
use crate::external::{SkyInput, Toolkit, WaveSolution};
use crate::frame::Frame;
use crate::naming::{adjusted_2d_name, unadjusted_2d_name, SolutionKey};
use crate::pipeline::config::Extract2dConfig;
use crate::pipeline::interactive::{
    confirm_loop, Attempt, BatchReport, Operator, SlitOutcome, SlitState, SKYLINE_RADII,
};
use crate::pipeline::{ProgressReporter, Stage};
use crate::store::{FrameStore, Slitlet};
use crate::target::Target;
use crate::trace::SlitTrace;

/// Rows more than `radius` away from `peak`.
pub fn sky_rows(height: usize, peak: usize, radius: usize) -> Vec<usize> {
    (0..height).filter(|&r| r.abs_diff(peak) > radius).collect()
}

/// The working trace and targets, which must pair one to one.
pub(crate) fn working_slits(store: &FrameStore, stage: Stage) -> Result<(&SlitTrace, &[Target])> {
    let (Some(trace), Some(targets)) = (&store.trace, &store.targets) else {
        return Err(missing(
            stage,
            &[
                ("slit trace", store.trace.is_none()),
                ("targets", store.targets.is_none()),
            ],
        ));
    };
    if trace.len() != targets.len() {
        return Err(ReductionError::CardinalityMismatch {
            traces: trace.len(),
            targets: targets.len(),
        });
    }
    Ok((trace, targets))
}

fn rectify(solution: &dyn WaveSolution, slitlet: &Frame, divisor: usize) -> Result<Frame> {
    let calibrated = solution.add_wave(slitlet)?;
    let reference = calibrated.reference_wave(divisor)?;
    solution.correct(&calibrated, reference.view())
}

struct SlitJob<'a> {
    index: usize,
    slitlet: &'a Frame,
    target: &'a Target,
    solution_path: &'a Path,
}

fn extract_unadjusted(
    job: &SlitJob<'_>,
    config: &Extract2dConfig,
    work_dir: &Path,
    tools: &Toolkit<'_>,
    outcome: &mut SlitOutcome,
) -> Result<Frame> {
    let solution = tools.wavecal.open(job.solution_path)?;
    let rectified = rectify(solution.as_ref(), job.slitlet, config.correcting_value)?;
    outcome.transition(SlitState::Extracted);

    let path = work_dir.join(unadjusted_2d_name(
        &job.slitlet.product_name()?,
        job.target.id.trim(),
    ));
    tools.writer.write_frame(&rectified, &path)?;
    outcome.output = Some(path);
    outcome.transition(SlitState::Accepted);
    Ok(rectified)
}

fn extract_adjusted(
    job: &SlitJob<'_>,
    config: &Extract2dConfig,
    work_dir: &Path,
    tools: &Toolkit<'_>,
    operator: &mut dyn Operator,
    outcome: &mut SlitOutcome,
) -> Result<Option<Frame>> {
    let calibrated = tools.wavecal.open(job.solution_path)?.add_wave(job.slitlet)?;
    let Some(&peak) = tools.tracer.find_peak(&calibrated, &config.peak)?.first() else {
        warn!(slit = job.index, target_id = %job.target.id, "No object peak found, skipping slit");
        outcome.skip("no object peak found");
        return Ok(None);
    };

    let confirmed = confirm_loop(
        operator,
        Stage::Extract2d,
        job.target,
        outcome,
        SKYLINE_RADII,
        config.exclusion_radius,
        |radius| {
            // Each attempt starts again from the arc solution on disk.
            let mut solution = tools.wavecal.open(job.solution_path)?;
            let original = solution.zero_point();
            let rows = config
                .skyline
                .rows
                .clone()
                .unwrap_or_else(|| sky_rows(calibrated.height(), peak, radius));
            solution.skyline(
                SkyInput::Rows {
                    frame: &calibrated,
                    rows: &rows,
                },
                &config.skyline,
            )?;
            let rectified = rectify(solution.as_ref(), job.slitlet, config.correcting_value)?;
            tools.display.show(
                &format!("Slit {} sky-line adjusted, radius {radius}", job.index),
                &rectified,
            );
            Ok(Attempt {
                value: rectified,
                zero_point_shift: Some(solution.zero_point() - original),
            })
        },
    )?;

    let path = work_dir.join(adjusted_2d_name(
        &job.slitlet.product_name()?,
        job.target.id.trim(),
    ));
    tools.writer.write_frame(&confirmed.value, &path)?;
    outcome.output = Some(path);
    Ok(Some(confirmed.value))
}

/// Cut and rectify one slitlet per working target.
///
/// Requires a reduced frame and a trace with exactly one entry per target.
/// A missing solution, an absent peak or a collaborator failure ends only
/// that slit.
pub fn extract2d(
    store: &mut FrameStore,
    config: &Extract2dConfig,
    work_dir: &Path,
    tools: &Toolkit<'_>,
    operator: &mut dyn Operator,
    reporter: &dyn ProgressReporter,
) -> Result<BatchReport> {
    let Some(reduced) = &store.reduced else {
        return Err(missing(Stage::Extract2d, &[("reduced science frame", true)]));
    };
    let (trace, targets) = working_slits(store, Stage::Extract2d)?;

    let slitlets = tools.tracer.extract2d(reduced, trace, &config.cutout)?;
    if slitlets.len() != targets.len() {
        return Err(ReductionError::CardinalityMismatch {
            traces: slitlets.len(),
            targets: targets.len(),
        });
    }
    info!(slits = slitlets.len(), adjust = config.adjust, "Extracting 2D slitlets");

    let mut report = BatchReport::new(Stage::Extract2d);
    let mut extracted = Vec::new();
    reporter.begin_stage(Stage::Extract2d, Some(slitlets.len()));
    for (index, (slitlet, target)) in slitlets.iter().zip(targets).enumerate() {
        reporter.advance(index);
        let mut outcome = SlitOutcome::pending(index, target);
        let solution_path = match SolutionKey::for_slit(slitlet, target) {
            Ok(key) => key.path_in(work_dir),
            Err(e) => {
                outcome.fail(e.to_string());
                report.outcomes.push(outcome);
                continue;
            }
        };
        if !tools.wavecal.exists(&solution_path) {
            let e = ReductionError::SolutionMissing(solution_path);
            warn!(slit = index, target_id = %target.id, "{e}");
            outcome.fail(e.to_string());
            report.outcomes.push(outcome);
            continue;
        }

        let job = SlitJob {
            index,
            slitlet,
            target,
            solution_path: &solution_path,
        };
        let result = if config.adjust {
            extract_adjusted(&job, config, work_dir, tools, operator, &mut outcome)
        } else {
            extract_unadjusted(&job, config, work_dir, tools, &mut outcome).map(Some)
        };
        match result {
            Ok(Some(frame)) => extracted.push(Slitlet {
                index,
                target: target.clone(),
                frame,
                sky_adjusted: config.adjust,
            }),
            Ok(None) => {}
            Err(e) => {
                warn!(slit = index, target_id = %target.id, error = %e, "2D extraction failed");
                outcome.fail(e.to_string());
            }
        }
        report.outcomes.push(outcome);
    }
    reporter.advance(report.outcomes.len());
    reporter.finish_stage();

    let diffs = report.zero_point_shifts();
    if !diffs.is_empty() {
        info!(?diffs, "Sky-line zero-point shifts");
    }
    info!(
        accepted = report.count(SlitState::Accepted),
        skipped = report.count(SlitState::Skipped),
        failed = report.count(SlitState::Failed),
        "2D extraction finished"
    );
    store.set_spec2d(extracted);
    Ok(report)
}
