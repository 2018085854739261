//! Arc-lamp wavelength calibration, one solution per working slit.
//!
//! A solution is cached on disk under its [`SolutionKey`] file name; slits
//! with a cached solution are skipped unless `clobber` is set.

use std::ops::Range;
use std::path::Path;

use tracing::{debug, info, warn};

use super::missing;
use crate::error::{ReductionError, Result};
use crate::external::{IdentifyInput, IdentifyOutcome, IdentifyParams, LineFit, Series, Toolkit};
use crate::frame::{Frame, KEY_TARGET_ID};
use crate::naming::SolutionKey;
use crate::pipeline::config::{ShiftCheckConfig, WaveCalConfig};
use crate::pipeline::interactive::{BatchReport, SlitOutcome, SlitState};
use crate::pipeline::{ProgressReporter, Stage};
use crate::store::FrameStore;
use crate::target::Target;

/// Initial pixel lag from the slit's mask X position, truncated toward zero.
pub fn estimate_shift(xmm: f64, multiplier: f64) -> i64 {
    (xmm * multiplier).trunc() as i64
}

/// Lag window for identification attempt `attempt` (1-based). The first
/// attempt searches around the geometric guess, later ones around zero.
pub fn lag_window(shift: i64, offset: i64, attempt: usize) -> Range<i64> {
    if attempt <= 1 {
        (shift - offset)..(shift + offset)
    } else {
        -offset..offset
    }
}

/// Lines identified with weight below `thresh`.
pub fn weak_lines(lines: &[LineFit], thresh: f64) -> Vec<LineFit> {
    lines.iter().copied().filter(|l| l.weight < thresh).collect()
}

fn identify_row(frame: &Frame, position: usize) -> Result<usize> {
    if frame.height() == 0 {
        return Err(ReductionError::InvalidInput("arc cutout has no rows".to_string()));
    }
    Ok((frame.height() / position.max(1)).min(frame.height() - 1))
}

/// Calibrate one arc cutout and write its solution to `path`. Returns the
/// cutout with wavelengths attached.
fn calibrate_slit(
    cutout: &Frame,
    target: &Target,
    path: &Path,
    config: &WaveCalConfig,
    tools: &Toolkit<'_>,
) -> Result<Frame> {
    let mut solution = tools.wavecal.open(&config.lamp_spectrum)?;
    solution.fit(config.fit_degree)?;

    let shift = estimate_shift(cutout.xmm()?, config.shift_multiplier);
    let row = identify_row(cutout, config.arc_line_position)?;
    debug!(target_id = %target.id, shift, row, "Identifying lines");

    let mut attempt = 0;
    loop {
        attempt += 1;
        if attempt > config.max_identify_attempts {
            return Err(ReductionError::IdentifyDidNotConverge {
                target: target.id.trim().to_string(),
                attempts: config.max_identify_attempts,
            });
        }
        let params = IdentifyParams {
            lags: Some(lag_window(shift, config.lags_offset, attempt)),
            nskip: None,
            settings: config,
        };
        match solution.identify(IdentifyInput::Row(cutout.data.row(row)), &params)? {
            IdentifyOutcome::Converged => break,
            IdentifyOutcome::Retry => debug!(attempt, "Identification retry"),
        }
    }

    for line in weak_lines(&solution.lines(), config.weight_thresh) {
        info!(
            target_id = %target.id,
            wave = line.wave,
            weight = line.weight,
            "Weak line"
        );
    }

    solution.set_degree(config.refit_degree);
    let params = IdentifyParams {
        lags: None,
        nskip: Some((cutout.height() / config.sampling_value.max(1)).max(1)),
        settings: config,
    };
    if solution.identify(IdentifyInput::Frame(cutout), &params)? == IdentifyOutcome::Retry {
        warn!(target_id = %target.id, "Full-slit refit did not report convergence");
    }

    solution.write(path)?;
    let calibrated = solution.add_wave(cutout)?;
    let reference = calibrated.reference_wave(config.correcting_value)?;
    let rectified = solution.correct(&calibrated, reference.view())?;
    tools
        .display
        .show(&format!("Target {}", target.id.trim()), &rectified);
    Ok(calibrated)
}

/// Calibrate every working slit. A failure on one slit is logged and recorded
/// in the report; the remaining slits still run.
pub fn calibrate(
    store: &mut FrameStore,
    config: &WaveCalConfig,
    work_dir: &Path,
    tools: &Toolkit<'_>,
    reporter: &dyn ProgressReporter,
) -> Result<BatchReport> {
    let (Some(cutouts), Some(targets)) = (&store.arc_cutouts, &store.targets) else {
        return Err(missing(
            Stage::WaveCal,
            &[
                ("arc cutouts", store.arc_cutouts.is_none()),
                ("targets", store.targets.is_none()),
            ],
        ));
    };
    if cutouts.len() != targets.len() {
        warn!(
            cutouts = cutouts.len(),
            targets = targets.len(),
            "Arc cutouts and targets differ in number, calibrating the common prefix"
        );
    }

    let mut report = BatchReport::new(Stage::WaveCal);
    let mut updated = cutouts.clone();
    reporter.begin_stage(Stage::WaveCal, Some(cutouts.len().min(targets.len())));
    for (index, (cutout, target)) in cutouts.iter().zip(targets).enumerate() {
        reporter.advance(index);
        let mut outcome = SlitOutcome::pending(index, target);
        if let Some(stamped) = cutout.header.text(KEY_TARGET_ID) {
            if stamped != target.id.trim() {
                warn!(
                    target_id = %target.id,
                    cutout_target = stamped,
                    "Arc cutout was cut for another target, rerun Update Arc Headers"
                );
                outcome.fail(format!("arc cutout belongs to target {stamped}"));
                report.outcomes.push(outcome);
                continue;
            }
        }
        let key = match SolutionKey::for_slit(cutout, target) {
            Ok(key) => key,
            Err(e) => {
                warn!(target_id = %target.id, error = %e, "Cannot name wavelength solution");
                outcome.fail(e.to_string());
                report.outcomes.push(outcome);
                continue;
            }
        };
        let path = key.path_in(work_dir);

        if !config.clobber && tools.wavecal.exists(&path) {
            debug!(solution = %key, "Solution exists, skipping");
            outcome.skip(format!("{} exists", path.display()));
            report.outcomes.push(outcome);
            continue;
        }

        match calibrate_slit(cutout, target, &path, config, tools) {
            Ok(calibrated) => {
                info!(solution = %key, "Wavelength solution written");
                updated[index] = calibrated;
                outcome.output = Some(path);
                outcome.transition(SlitState::Accepted);
            }
            Err(e) => {
                warn!(target_id = %target.id, error = %e, "Wavelength calibration failed");
                outcome.fail(e.to_string());
            }
        }
        report.outcomes.push(outcome);
    }
    reporter.advance(report.outcomes.len());
    reporter.finish_stage();

    info!(
        calibrated = report.count(SlitState::Accepted),
        cached = report.count(SlitState::Skipped),
        failed = report.count(SlitState::Failed),
        "Wavelength calibration finished"
    );
    if report.count(SlitState::Accepted) > 0 {
        store.set_arc_cutouts(updated);
    }
    Ok(report)
}

/// Lamp spectrum and one arc row, offset by the estimated shift.
#[derive(Clone, Debug, PartialEq)]
pub struct ShiftCheck {
    pub target_id: String,
    pub xmm: f64,
    pub shift: i64,
    pub lamp: Series,
    pub arc: Series,
}

/// Overlay the reference lamp with the first slit's arc row so the sign and
/// size of the shift multiplier can be checked by eye. Changes no state.
pub fn shift_check(
    store: &FrameStore,
    wavecal: &WaveCalConfig,
    config: &ShiftCheckConfig,
    tools: &Toolkit<'_>,
) -> Result<ShiftCheck> {
    let (Some(cutout), Some(target)) = (
        store.arc_cutouts.as_ref().and_then(|c| c.first()),
        store.targets.as_ref().and_then(|t| t.first()),
    ) else {
        return Err(missing(
            Stage::ShiftCheck,
            &[
                ("arc cutouts", store.arc_cutouts.as_ref().is_none_or(Vec::is_empty)),
                ("targets", store.targets.as_ref().is_none_or(Vec::is_empty)),
            ],
        ));
    };
    if config.arc_row >= cutout.height() {
        return Err(ReductionError::InvalidInput(format!(
            "arc row {} outside a {}-row cutout",
            config.arc_row,
            cutout.height()
        )));
    }

    let xmm = cutout.xmm()?;
    let shift = estimate_shift(xmm, wavecal.shift_multiplier);
    let lamp_flux = tools.wavecal.open(&wavecal.lamp_spectrum)?.reference_spectrum();
    let lamp = Series {
        label: "Lamp Spectrum".to_string(),
        x: (0..lamp_flux.len()).map(|i| i as f64).collect(),
        y: lamp_flux,
    };
    let row = cutout.data.row(config.arc_row);
    let arc = Series {
        label: format!("Shifted Arc (shift={shift})"),
        x: (0..row.len()).map(|i| (i as i64 + shift) as f64).collect(),
        y: row.iter().map(|&v| f64::from(v) * config.flux_scale).collect(),
    };

    info!(xmm, shift, "Shift check");
    tools.display.plot("Spectrum Alignment", &[lamp.clone(), arc.clone()]);
    Ok(ShiftCheck {
        target_id: target.id.trim().to_string(),
        xmm,
        shift,
        lamp,
        arc,
    })
}
