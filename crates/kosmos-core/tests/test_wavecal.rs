#[allow(dead_code)]
mod common;

use std::fs;

use tempfile::TempDir;

use kosmos_core::error::ReductionError;
use kosmos_core::pipeline::interactive::SlitState;
use kosmos_core::pipeline::{NoOpReporter, Reduction};
use kosmos_core::stages::wavecal::calibrate;

use common::{Fakes, RecordingReporter};

fn file_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn states(report: &kosmos_core::pipeline::interactive::BatchReport) -> Vec<SlitState> {
    report.outcomes.iter().map(|o| o.state).collect()
}

#[test]
fn test_one_solution_per_slit() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(3);
    let mut reduction = common::through_reduce(&fakes, dir.path());

    let report = reduction.run_wave_cal().unwrap();

    assert_eq!(states(&report), vec![SlitState::Accepted; 3]);
    assert!(report.is_complete());
    assert_eq!(
        file_names(&fakes.wavecal.writes()),
        vec!["CofIwav_M5_100.fits", "CofIwav_M5_101.fits", "CofIwav_M5_102.fits"]
    );
    for path in fakes.wavecal.writes() {
        assert!(path.starts_with(dir.path()));
        assert!(path.is_file());
    }
    let cutouts = reduction.store().arc_cutouts.as_ref().unwrap();
    assert!(cutouts.iter().all(|c| c.is_wavelength_calibrated()));
}

#[test]
fn test_existing_solutions_are_not_rewritten() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(3);
    let mut reduction = common::through_wavecal(&fakes, dir.path());
    let solution = dir.path().join("CofIwav_M5_101.fits");
    let before = fs::read_to_string(&solution).unwrap();
    let revision = reduction.store().revision();

    let report = reduction.run_wave_cal().unwrap();

    assert_eq!(states(&report), vec![SlitState::Skipped; 3]);
    assert!(report.is_complete());
    assert_eq!(fakes.wavecal.writes().len(), 3);
    assert_eq!(fs::read_to_string(&solution).unwrap(), before);
    assert_eq!(reduction.store().revision(), revision);
}

#[test]
fn test_clobber_recomputes() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(2);
    let mut reduction = common::through_wavecal(&fakes, dir.path());
    reduction.config_mut().wavecal.clobber = true;

    let report = reduction.run_wave_cal().unwrap();

    assert_eq!(report.count(SlitState::Accepted), 2);
    assert_eq!(fakes.wavecal.writes().len(), 4);
}

#[test]
fn test_failed_slit_does_not_stop_the_batch() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(3);
    fakes.wavecal.fail_xmm.set(Some(0.5));
    let mut reduction = common::through_reduce(&fakes, dir.path());

    let report = reduction.run_wave_cal().unwrap();

    assert_eq!(
        states(&report),
        vec![SlitState::Accepted, SlitState::Failed, SlitState::Accepted]
    );
    assert!(!report.is_complete());
    let failed = &report.outcomes[1];
    assert_eq!(failed.target_id, "101");
    assert!(failed.note.as_deref().unwrap().contains("no lines found"));
    assert!(dir.path().join("CofIwav_M5_102.fits").is_file());
}

#[test]
fn test_first_attempt_searches_around_geometric_shift() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(2);
    fakes.wavecal.retries.set(2);
    let mut reduction = common::through_reduce(&fakes, dir.path());

    reduction.run_wave_cal().unwrap();

    let stats = fakes.wavecal.stats.borrow();
    assert_eq!(stats.row_lags.len(), 6);
    // Target 101 sits at XMM 0.5: shift trunc(0.5 * -22.5) = -11.
    assert_eq!(stats.row_lags[3], -61..39);
    assert_eq!(stats.row_lags[4], -50..50);
    assert_eq!(stats.row_lags[5], -50..50);
}

#[test]
fn test_refit_samples_every_tenth_of_the_slit() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(2);
    let mut reduction = common::through_reduce(&fakes, dir.path());

    reduction.run_wave_cal().unwrap();

    let expected = Some(common::SLIT_ROWS / 10);
    assert_eq!(fakes.wavecal.stats.borrow().frame_nskip, vec![expected; 2]);
}

#[test]
fn test_identification_gives_up() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(1);
    fakes.wavecal.retries.set(100);
    let mut reduction = common::through_reduce(&fakes, dir.path());
    reduction.config_mut().wavecal.max_identify_attempts = 3;

    let report = reduction.run_wave_cal().unwrap();

    assert_eq!(states(&report), vec![SlitState::Failed]);
    assert!(report.outcomes[0]
        .note
        .as_deref()
        .unwrap()
        .contains("did not converge after 3 attempts"));
    assert_eq!(fakes.wavecal.stats.borrow().row_lags.len(), 3);
    assert!(fakes.wavecal.writes().is_empty());
}

#[test]
fn test_wavecal_needs_arc_cutouts() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(2);
    let mut reduction = Reduction::new(common::config(dir.path()), fakes.toolkit());
    reduction.find_slits().unwrap();

    let err = reduction.run_wave_cal().unwrap_err();

    let ReductionError::MissingPrerequisite { missing, .. } = err else {
        panic!("expected a missing prerequisite");
    };
    assert_eq!(missing, vec!["arc cutouts"]);
}

#[test]
fn test_progress_advances_per_slit() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(3);
    let reporter = RecordingReporter::default();
    let mut reduction = common::through_reduce(&fakes, dir.path()).with_reporter(&reporter);

    reduction.run_wave_cal().unwrap();

    assert_eq!(
        *reporter.events.borrow(),
        vec![
            "begin WaveCal Some(3)",
            "advance 0",
            "advance 1",
            "advance 2",
            "advance 3",
            "finish"
        ]
    );
}

#[test]
fn test_filter_invalidates_arc_cutouts() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(3);
    let mut reduction = common::through_reduce(&fakes, dir.path());
    reduction.config_mut().filter.values = "2".to_string();
    reduction.filter_targets().unwrap();

    let err = reduction.run_wave_cal().unwrap_err();

    let ReductionError::MissingPrerequisite { missing, .. } = err else {
        panic!("expected a missing prerequisite");
    };
    assert_eq!(missing, vec!["arc cutouts"]);
    assert!(fakes.wavecal.writes().is_empty());

    reduction.update_arc_headers().unwrap();
    let report = reduction.run_wave_cal().unwrap();

    assert_eq!(states(&report), vec![SlitState::Accepted]);
    // Target 102 sits at XMM 1.0: shift trunc(1.0 * -22.5) = -22.
    assert_eq!(fakes.wavecal.stats.borrow().row_lags, vec![-72..28]);
    assert_eq!(file_names(&fakes.wavecal.writes()), vec!["CofIwav_M5_102.fits"]);
}

#[test]
fn test_cutout_for_another_target_is_not_calibrated() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(2);
    let reduction = common::through_reduce(&fakes, dir.path());
    let mut store = reduction.store().clone();
    // Working targets swapped behind the store's back.
    store.targets.as_mut().unwrap().reverse();

    let report = calibrate(
        &mut store,
        &reduction.config().wavecal,
        dir.path(),
        &fakes.toolkit(),
        &NoOpReporter,
    )
    .unwrap();

    assert_eq!(states(&report), vec![SlitState::Failed; 2]);
    assert!(report.outcomes[0]
        .note
        .as_deref()
        .unwrap()
        .contains("belongs to target 100"));
    assert!(fakes.wavecal.writes().is_empty());
}

#[test]
fn test_shift_check_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(3);
    let mut reduction = common::through_reduce(&fakes, dir.path());
    let before = reduction.store().clone();

    let check = reduction.shift_check().unwrap();

    assert_eq!(reduction.store(), &before);
    assert_eq!(check.target_id, "100");
    assert_eq!(check.shift, 0);
    assert_eq!(check.lamp.y.len(), 10);
    assert_eq!(check.arc.x.len(), common::SLIT_COLS);
    // Row 19 of the first cutout starts at 19 * 40, scaled by 30.
    approx::assert_relative_eq!(check.arc.y[0], 760.0 * 30.0);
    assert!(fakes.wavecal.writes().is_empty());
}

#[test]
fn test_shift_check_offsets_arc_by_estimated_shift() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(3);
    let mut reduction = Reduction::new(common::config(dir.path()), fakes.toolkit());
    reduction.compute_arcs().unwrap();
    reduction.find_slits().unwrap();
    reduction.config_mut().filter.values = "2".to_string();
    reduction.filter_targets().unwrap();
    reduction.update_arc_headers().unwrap();

    let check = reduction.shift_check().unwrap();

    assert_eq!(check.target_id, "102");
    assert_eq!(check.shift, -22);
    assert_eq!(check.arc.x[0], -22.0);
    assert_eq!(check.arc.x[5], -17.0);
}

#[test]
fn test_shift_check_row_outside_cutout() {
    let dir = TempDir::new().unwrap();
    let fakes = Fakes::new(1);
    let mut reduction = common::through_reduce(&fakes, dir.path());
    reduction.config_mut().shift_check.arc_row = common::SLIT_ROWS;

    let err = reduction.shift_check().unwrap_err();
    assert!(matches!(err, ReductionError::InvalidInput(_)));
}
