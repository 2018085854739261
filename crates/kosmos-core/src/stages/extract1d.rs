//! 1D spectra from the accepted 2D slitlets.
//!
//! The object is traced once per slit. Every retry re-extracts along that
//! same trace with a new aperture radius, and the background windows are
//! derived from the radius each time.

use std::path::Path;

use ndarray::{s, Array2};
use tracing::{debug, info, warn};

use super::extract2d::working_slits;
use super::missing;
use crate::consts::BACKGROUND_WIDTH_OFFSET;
use crate::error::Result;
use crate::external::{ApertureRequest, SkyInput, Toolkit};
use crate::frame::{Frame, Spec1d};
use crate::naming::{spec1d_name, SolutionKey, Spec1dKind};
use crate::pipeline::config::Extract1dConfig;
use crate::pipeline::interactive::{
    confirm_loop, Attempt, BatchReport, Operator, SlitOutcome, SlitState, APERTURE_RADII,
};
use crate::pipeline::{ProgressReporter, Stage};
use crate::store::{ExtractedSpectrum, FrameStore, Slitlet};
use crate::trace::SlitTrace;

/// Background row windows relative to the object trace.
///
/// Each window spans from the aperture edge out to `gap + (radius - 5)`
/// rows, on both sides of the trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackgroundWindows {
    pub lower: [i64; 2],
    pub upper: [i64; 2],
}

impl BackgroundWindows {
    pub fn derive(radius: usize, gap: i64) -> Self {
        let radius = radius as i64;
        let outer = gap + (radius - BACKGROUND_WIDTH_OFFSET);
        Self {
            lower: [-outer, -radius],
            upper: [outer, radius],
        }
    }

    pub fn as_array(self) -> [[i64; 2]; 2] {
        [self.lower, self.upper]
    }
}

/// Wavelength row of the 2D slitlet at the object peak.
fn wave_at_peak(frame: &Frame, peak: usize) -> Option<Array2<f64>> {
    frame
        .wave
        .as_ref()
        .filter(|w| peak < w.nrows())
        .map(|w| w.slice(s![peak..peak + 1, ..]).to_owned())
}

fn extract_attempt(
    slit: &Slitlet,
    object: &SlitTrace,
    peak: usize,
    radius: usize,
    config: &Extract1dConfig,
    solution_path: Option<&Path>,
    tools: &Toolkit<'_>,
) -> Result<Attempt<Spec1d>> {
    let background = BackgroundWindows::derive(radius, config.sky_gap);
    debug!(radius, ?background, "Extracting");
    let request = ApertureRequest {
        radius,
        background: background.as_array(),
        options: &config.aperture,
    };
    let mut spectrum = tools.tracer.extract(&slit.frame, object, &request)?;
    spectrum.frame.wave = wave_at_peak(&slit.frame, peak);

    let mut attempt = Attempt::new(spectrum);
    if let Some(path) = solution_path {
        let mut solution = tools.wavecal.open(path)?;
        let original = solution.zero_point();
        solution.skyline(SkyInput::Spectrum(&attempt.value), &config.skyline)?;
        let shift = solution.zero_point() - original;
        if let Some(wave) = attempt.value.frame.wave.as_mut() {
            wave.mapv_inplace(|w| w + shift);
        }
        attempt.zero_point_shift = Some(shift);
    }
    Ok(attempt)
}

fn extract_slit(
    slit: &Slitlet,
    config: &Extract1dConfig,
    work_dir: &Path,
    tools: &Toolkit<'_>,
    operator: &mut dyn Operator,
    outcome: &mut SlitOutcome,
) -> Result<Option<ExtractedSpectrum>> {
    let Some(&peak) = tools.tracer.find_peak(&slit.frame, &config.peak)?.first() else {
        warn!(slit = slit.index, target_id = %slit.target.id, "No peak found, skipping slit");
        outcome.skip("no object peak found");
        return Ok(None);
    };

    let seeds = config
        .trace
        .seed_rows
        .clone()
        .unwrap_or_else(|| vec![peak]);
    let mut initial = SlitTrace::constant(peak as f64);
    initial.transpose = config.trace.transpose;
    let object = tools
        .tracer
        .trace(&slit.frame, &seeds, &initial, &config.trace)?;

    let solution_path = if config.sky_adjust {
        Some(SolutionKey::for_slit(&slit.frame, &slit.target)?.path_in(work_dir))
    } else {
        None
    };

    let confirmed = confirm_loop(
        operator,
        Stage::Extract1d,
        &slit.target,
        outcome,
        APERTURE_RADII,
        config.radius,
        |radius| {
            extract_attempt(
                slit,
                &object,
                peak,
                radius,
                config,
                solution_path.as_deref(),
                tools,
            )
        },
    )?;

    let path = work_dir.join(spec1d_name(
        Spec1dKind::select(config.sky_adjust, slit.sky_adjusted),
        confirmed.radius,
        &slit.frame.product_name()?,
        slit.target.id.trim(),
        slit.index,
    ));
    tools.writer.write_spectrum(&confirmed.value, &path)?;
    tools.display.show(
        &format!("1D extracted: slit {}, rad={}", slit.index, confirmed.radius),
        &confirmed.value.frame,
    );
    outcome.output = Some(path.clone());

    Ok(Some(ExtractedSpectrum {
        index: slit.index,
        target: slit.target.clone(),
        radius: confirmed.radius,
        spectrum: confirmed.value,
        path,
    }))
}

/// Extract, confirm and write one spectrum per 2D slitlet. Replaces the
/// stored 1D spectra with the accepted ones.
pub fn extract1d(
    store: &mut FrameStore,
    config: &Extract1dConfig,
    work_dir: &Path,
    tools: &Toolkit<'_>,
    operator: &mut dyn Operator,
    reporter: &dyn ProgressReporter,
) -> Result<BatchReport> {
    working_slits(store, Stage::Extract1d)?;
    let Some(slitlets) = &store.spec2d else {
        return Err(missing(Stage::Extract1d, &[("2D spectra", true)]));
    };
    info!(
        slits = slitlets.len(),
        radius = config.radius,
        sky_adjust = config.sky_adjust,
        "Extracting 1D spectra"
    );

    let mut report = BatchReport::new(Stage::Extract1d);
    let mut spectra = Vec::new();
    reporter.begin_stage(Stage::Extract1d, Some(slitlets.len()));
    for (done, slit) in slitlets.iter().enumerate() {
        reporter.advance(done);
        let mut outcome = SlitOutcome::pending(slit.index, &slit.target);
        match extract_slit(slit, config, work_dir, tools, operator, &mut outcome) {
            Ok(Some(spectrum)) => {
                info!(path = %spectrum.path.display(), "Saved spectrum");
                spectra.push(spectrum);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(slit = slit.index, target_id = %slit.target.id, error = %e, "1D extraction failed");
                outcome.fail(e.to_string());
            }
        }
        report.outcomes.push(outcome);
    }
    reporter.advance(report.outcomes.len());
    reporter.finish_stage();

    info!(
        accepted = report.count(SlitState::Accepted),
        skipped = report.count(SlitState::Skipped),
        failed = report.count(SlitState::Failed),
        "1D extraction finished"
    );
    store.set_spec1d(spectra);
    Ok(report)
}
