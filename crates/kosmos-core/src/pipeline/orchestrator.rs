use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::external::Toolkit;
use crate::session::SessionLog;
use crate::stages::slits::SlitDiscovery;
use crate::stages::wavecal::ShiftCheck;
use crate::stages::{calibration, extract1d, extract2d, science, slits, wavecal};
use crate::store::FrameStore;
use crate::target::Selection;

use super::config::ReductionConfig;
use super::interactive::{BatchReport, Operator, SlitState};
use super::types::{NoOpReporter, ProgressReporter, Stage};

/// Action recorded for every slit the operator accepted.
const ACCEPT_SLIT_ACTION: &str = "Accept Slit";

#[derive(Serialize)]
struct DataInput<'a> {
    data_dir: Option<&'a Path>,
}

#[derive(Serialize)]
struct AcceptedSlit<'a> {
    slit: usize,
    target_id: &'a str,
    radius: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sky_gap: Option<i64>,
    output: Option<&'a Path>,
    zero_point_shift: Option<f64>,
}

/// Log the parameters a stage is about to run with.
fn record<P: Serialize + ?Sized>(log: &mut SessionLog, stage: Stage, params: &P) -> Result<()> {
    log.log_action(stage, stage.action(), params)
}

/// One reduction session: configuration, products, session log and the
/// collaborators every stage calls.
///
/// Each stage method logs the parameters it runs with, then hands the store
/// and its config section to the stage function.
pub struct Reduction<'a> {
    config: ReductionConfig,
    store: FrameStore,
    log: SessionLog,
    tools: Toolkit<'a>,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> Reduction<'a> {
    pub fn new(config: ReductionConfig, tools: Toolkit<'a>) -> Self {
        Self {
            config,
            store: FrameStore::new(),
            log: SessionLog::in_memory(),
            tools,
            reporter: &NoOpReporter,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &ReductionConfig {
        &self.config
    }

    /// Parameters for the next stage runs.
    pub fn config_mut(&mut self) -> &mut ReductionConfig {
        &mut self.config
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Open the session log file for `star_name` and record the data folder.
    /// Entries logged so far stay in memory only.
    pub fn start_session(&mut self, star_name: &str) -> Result<PathBuf> {
        let log = SessionLog::start(&self.config.log_dir, star_name)?;
        let path = log.path().map(Path::to_path_buf).unwrap_or_default();
        self.log = log;
        self.config.session_name = Some(star_name.to_string());
        self.log.log_action(
            Stage::DataInput,
            Stage::DataInput.action(),
            &DataInput {
                data_dir: self.config.data_dir.as_deref(),
            },
        )?;
        Ok(path)
    }

    /// Drop every product, keeping the configuration and log.
    pub fn reset(&mut self) {
        self.store.reset();
        info!("Frame store reset");
    }

    fn run<T>(&mut self, stage: Stage, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.reporter.begin_stage(stage, None);
        let result = f(self);
        self.reporter.finish_stage();
        result
    }

    pub fn compute_bias(&mut self) -> Result<()> {
        record(&mut self.log, Stage::Bias, &self.config.bias)?;
        self.run(Stage::Bias, |r| {
            calibration::compute_bias(&mut r.store, &r.config.bias, &r.tools)
        })
    }

    pub fn compute_dark(&mut self) -> Result<()> {
        record(&mut self.log, Stage::Dark, &self.config.dark)?;
        self.run(Stage::Dark, |r| {
            calibration::compute_dark(&mut r.store, &r.config.dark, &r.tools)
        })
    }

    pub fn compute_flat(&mut self) -> Result<()> {
        record(&mut self.log, Stage::Flat, &self.config.flat)?;
        self.run(Stage::Flat, |r| {
            calibration::compute_flat(&mut r.store, &r.config.flat, &r.tools)
        })
    }

    pub fn compute_arcs(&mut self) -> Result<()> {
        record(&mut self.log, Stage::Arc, &self.config.arc)?;
        self.run(Stage::Arc, |r| {
            calibration::compute_arcs(&mut r.store, &r.config.arc, &r.tools)
        })
    }

    pub fn find_slits(&mut self) -> Result<SlitDiscovery> {
        record(&mut self.log, Stage::FindSlits, &self.config.slits)?;
        self.run(Stage::FindSlits, |r| {
            slits::find_slits(&mut r.store, &r.config.slits, &r.tools)
        })
    }

    pub fn filter_targets(&mut self) -> Result<Selection> {
        record(&mut self.log, Stage::FilterTargets, &self.config.filter)?;
        slits::filter_targets(&mut self.store, &self.config.filter)
    }

    pub fn reset_filter(&mut self) -> Result<()> {
        self.log
            .log_action(Stage::FilterTargets, "Reset Filter", &())?;
        slits::reset_filter(&mut self.store)
    }

    pub fn update_arc_headers(&mut self) -> Result<usize> {
        record(&mut self.log, Stage::ArcHeaders, &())?;
        self.run(Stage::ArcHeaders, |r| {
            slits::update_arc_headers(&mut r.store, &r.tools)
        })
    }

    pub fn reduce_science(&mut self) -> Result<()> {
        record(&mut self.log, Stage::Reduce, &self.config.science)?;
        self.run(Stage::Reduce, |r| {
            science::reduce_science(&mut r.store, &r.config.science, &r.tools)
        })
    }

    pub fn run_wave_cal(&mut self) -> Result<BatchReport> {
        record(&mut self.log, Stage::WaveCal, &self.config.wavecal)?;
        wavecal::calibrate(
            &mut self.store,
            &self.config.wavecal,
            &self.config.work_dir,
            &self.tools,
            self.reporter,
        )
    }

    pub fn shift_check(&mut self) -> Result<ShiftCheck> {
        record(&mut self.log, Stage::ShiftCheck, &self.config.shift_check)?;
        wavecal::shift_check(
            &self.store,
            &self.config.wavecal,
            &self.config.shift_check,
            &self.tools,
        )
    }

    pub fn extract2d(&mut self, operator: &mut dyn Operator) -> Result<BatchReport> {
        record(&mut self.log, Stage::Extract2d, &self.config.extract2d)?;
        let report = extract2d::extract2d(
            &mut self.store,
            &self.config.extract2d,
            &self.config.work_dir,
            &self.tools,
            operator,
            self.reporter,
        )?;
        self.log_accepted(&report, None)?;
        Ok(report)
    }

    pub fn extract1d(&mut self, operator: &mut dyn Operator) -> Result<BatchReport> {
        record(&mut self.log, Stage::Extract1d, &self.config.extract1d)?;
        let report = extract1d::extract1d(
            &mut self.store,
            &self.config.extract1d,
            &self.config.work_dir,
            &self.tools,
            operator,
            self.reporter,
        )?;
        self.log_accepted(&report, Some(self.config.extract1d.sky_gap))?;
        Ok(report)
    }

    fn log_accepted(&mut self, report: &BatchReport, sky_gap: Option<i64>) -> Result<()> {
        for outcome in report
            .outcomes
            .iter()
            .filter(|o| o.state == SlitState::Accepted)
        {
            self.log.log_action(
                report.stage,
                ACCEPT_SLIT_ACTION,
                &AcceptedSlit {
                    slit: outcome.index,
                    target_id: &outcome.target_id,
                    radius: outcome.radii.last().copied(),
                    sky_gap,
                    output: outcome.output.as_deref(),
                    zero_point_shift: outcome.zero_point_shift,
                },
            )?;
        }
        Ok(())
    }
}
