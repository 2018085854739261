use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ndarray::{Array2, ArrayView1};

use kosmos_core::error::{ReductionError, Result};
use kosmos_core::external::{
    ApertureRequest, DesignReader, FrameReducer, IdentifyInput, IdentifyOutcome, IdentifyParams,
    LineFit, NoOpDisplay, ProductWriter, ReduceRequest, SkyInput, SlitTracer, Toolkit,
    WaveCalLoader, WaveSolution,
};
use kosmos_core::frame::{Frame, FrameId, FrameList, Header, Spec1d, KEY_FILE, KEY_OBJNAME};
use kosmos_core::pipeline::config::{
    CombineSettings, CutoutConfig, DarkConfig, FlatConfig, ObjectTraceConfig, PeakConfig,
    ReductionConfig, SkylineConfig, SlitsConfig,
};
use kosmos_core::pipeline::{ProgressReporter, Reduction, Stage};
use kosmos_core::target::Target;
use kosmos_core::trace::{Polynomial, SlitEdges, SlitTrace};

pub const OBJECT: &str = "M5";
pub const RAW_FILE: &str = "M5real.0008.fits";
pub const SLIT_ROWS: usize = 20;
pub const SLIT_COLS: usize = 40;

/// Frame with the object header every fake product carries.
pub fn frame(rows: usize, cols: usize, fill: f32) -> Frame {
    let mut header = Header::new();
    header.set(KEY_OBJNAME, OBJECT);
    header.set(KEY_FILE, RAW_FILE);
    Frame::new(Array2::from_elem((rows, cols), fill)).with_header(header)
}

/// `n` targets with IDs `"100"`, `"101"`, ... and Y increasing with index.
pub fn targets(n: usize) -> Vec<Target> {
    (0..n)
        .map(|i| {
            Target::new(
                format!("{}", 100 + i),
                format!("star_{i}"),
                0.5 * i as f64,
                i as f64,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Records every call as a short description.
#[derive(Default)]
pub struct FakeReducer {
    pub calls: RefCell<Vec<String>>,
    pub fail_reduce: Cell<bool>,
}

impl FakeReducer {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl FrameReducer for FakeReducer {
    fn reduce(&self, id: &FrameId, request: &ReduceRequest<'_>) -> Result<Frame> {
        self.calls.borrow_mut().push(format!(
            "reduce {id} bias={} dark={} flat={} settings={}",
            request.bias.is_some(),
            request.dark.is_some(),
            request.flat.is_some(),
            request.settings.is_some()
        ));
        if self.fail_reduce.get() {
            return Err(ReductionError::external(Stage::Reduce, "reader exploded"));
        }
        Ok(frame(100, SLIT_COLS, 10.0))
    }

    fn mkbias(&self, frames: &FrameList, settings: &CombineSettings) -> Result<Frame> {
        self.calls
            .borrow_mut()
            .push(format!("mkbias {frames} {}", settings.method));
        Ok(frame(100, SLIT_COLS, 1.0))
    }

    fn mkdark(&self, frames: &FrameList, bias: Option<&Frame>, _config: &DarkConfig) -> Result<Frame> {
        self.calls
            .borrow_mut()
            .push(format!("mkdark {frames} bias={}", bias.is_some()));
        Ok(frame(100, SLIT_COLS, 0.1))
    }

    fn mkflat(
        &self,
        frames: &FrameList,
        bias: Option<&Frame>,
        dark: Option<&Frame>,
        _config: &FlatConfig,
    ) -> Result<Frame> {
        self.calls.borrow_mut().push(format!(
            "mkflat {frames} bias={} dark={}",
            bias.is_some(),
            dark.is_some()
        ));
        Ok(frame(100, SLIT_COLS, 1.0))
    }

    fn sum(&self, frames: &FrameList) -> Result<Frame> {
        self.calls.borrow_mut().push(format!("sum {frames}"));
        Ok(frame(100, SLIT_COLS, 50.0))
    }
}

// ---------------------------------------------------------------------------
// Design file
// ---------------------------------------------------------------------------

/// Returns its targets in reverse Y order so sorting is observable.
pub struct FakeDesign {
    pub targets: Vec<Target>,
    pub reads: Cell<usize>,
}

impl FakeDesign {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets,
            reads: Cell::new(0),
        }
    }
}

impl DesignReader for FakeDesign {
    fn read_targets(&self, _path: &Path) -> Result<Vec<Target>> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.targets.iter().rev().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

pub struct FakeTracer {
    pub bottom: usize,
    pub top: usize,
    /// Queued `find_peak` answers; `default_peak` once empty.
    pub peaks: RefCell<VecDeque<Vec<usize>>>,
    pub default_peak: usize,
    pub peak_calls: Cell<usize>,
    pub trace_calls: Cell<usize>,
    pub trace_seeds: RefCell<Vec<Vec<usize>>>,
    /// Radius and background of every `extract` call.
    pub extractions: RefCell<Vec<(usize, [[i64; 2]; 2])>>,
}

impl FakeTracer {
    pub fn new(slits: usize) -> Self {
        Self::with_edges(slits, slits)
    }

    pub fn with_edges(bottom: usize, top: usize) -> Self {
        Self {
            bottom,
            top,
            peaks: RefCell::new(VecDeque::new()),
            default_peak: 10,
            peak_calls: Cell::new(0),
            trace_calls: Cell::new(0),
            trace_seeds: RefCell::new(Vec::new()),
            extractions: RefCell::new(Vec::new()),
        }
    }

    pub fn queue_peaks(&self, peaks: Vec<usize>) {
        self.peaks.borrow_mut().push_back(peaks);
    }

    pub fn extracted_radii(&self) -> Vec<usize> {
        self.extractions.borrow().iter().map(|(r, _)| *r).collect()
    }
}

impl SlitTracer for FakeTracer {
    fn find_slits(&self, _flat: &Frame, _config: &SlitsConfig) -> Result<SlitEdges> {
        let n = self.bottom.min(self.top);
        let edge = |i: usize| Polynomial::constant((i * SLIT_ROWS) as f64);
        Ok(SlitEdges {
            bottom: (0..self.bottom).map(edge).collect(),
            top: (0..self.top).map(|i| edge(i + 1)).collect(),
            trace: SlitTrace {
                model: (0..n)
                    .map(|i| Polynomial::constant((i * SLIT_ROWS + SLIT_ROWS / 2) as f64))
                    .collect(),
                rows: (0..n).map(|i| [i * SLIT_ROWS, (i + 1) * SLIT_ROWS]).collect(),
                transpose: false,
            },
        })
    }

    fn extract2d(&self, frame: &Frame, trace: &SlitTrace, _cutout: &CutoutConfig) -> Result<Vec<Frame>> {
        Ok((0..trace.len())
            .map(|i| {
                let mut cutout = Frame::new(Array2::from_shape_fn((SLIT_ROWS, SLIT_COLS), |(r, c)| {
                    (r * SLIT_COLS + c + i) as f32
                }));
                cutout.header = frame.header.clone();
                cutout
            })
            .collect())
    }

    fn find_peak(&self, _frame: &Frame, _config: &PeakConfig) -> Result<Vec<usize>> {
        self.peak_calls.set(self.peak_calls.get() + 1);
        Ok(self
            .peaks
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| vec![self.default_peak]))
    }

    fn trace(
        &self,
        _frame: &Frame,
        seeds: &[usize],
        initial: &SlitTrace,
        _config: &ObjectTraceConfig,
    ) -> Result<SlitTrace> {
        self.trace_calls.set(self.trace_calls.get() + 1);
        self.trace_seeds.borrow_mut().push(seeds.to_vec());
        Ok(initial.clone())
    }

    fn extract(&self, _frame: &Frame, _trace: &SlitTrace, request: &ApertureRequest<'_>) -> Result<Spec1d> {
        self.extractions
            .borrow_mut()
            .push((request.radius, request.background));
        let flux = Frame::new(Array2::from_elem((1, SLIT_COLS), request.radius as f32));
        Ok(Spec1d::new(flux, Array2::zeros((1, SLIT_COLS))))
    }
}

// ---------------------------------------------------------------------------
// Wavelength solutions
// ---------------------------------------------------------------------------

/// Counters shared by the loader and every solution it opens.
#[derive(Debug, Default)]
pub struct WaveStats {
    pub opened: Vec<PathBuf>,
    pub writes: Vec<PathBuf>,
    pub row_lags: Vec<std::ops::Range<i64>>,
    pub frame_nskip: Vec<Option<usize>>,
    pub sky_rows: Vec<Vec<usize>>,
    pub sky_spectra: usize,
}

pub struct FakeWaveCal {
    pub stats: Rc<RefCell<WaveStats>>,
    /// Row identification answers `Retry` this many times before converging.
    pub retries: Cell<usize>,
    /// `add_wave` fails for frames with this XMM.
    pub fail_xmm: Cell<Option<f64>>,
    /// Zero-point change from every sky-line refit.
    pub sky_shift: f64,
}

impl Default for FakeWaveCal {
    fn default() -> Self {
        Self {
            stats: Rc::default(),
            retries: Cell::new(0),
            fail_xmm: Cell::new(None),
            sky_shift: 0.5,
        }
    }
}

impl FakeWaveCal {
    pub fn writes(&self) -> Vec<PathBuf> {
        self.stats.borrow().writes.clone()
    }
}

struct FakeSolution {
    stats: Rc<RefCell<WaveStats>>,
    zero_point: f64,
    retries_left: usize,
    fail_xmm: Option<f64>,
    sky_shift: f64,
}

impl WaveSolution for FakeSolution {
    fn fit(&mut self, _degree: usize) -> Result<()> {
        Ok(())
    }

    fn set_degree(&mut self, _degree: usize) {}

    fn identify(&mut self, input: IdentifyInput<'_>, params: &IdentifyParams<'_>) -> Result<IdentifyOutcome> {
        let mut stats = self.stats.borrow_mut();
        match input {
            IdentifyInput::Row(_) => {
                stats.row_lags.push(params.lags.clone().unwrap_or(0..0));
                if self.retries_left > 0 {
                    self.retries_left -= 1;
                    return Ok(IdentifyOutcome::Retry);
                }
            }
            IdentifyInput::Frame(_) => stats.frame_nskip.push(params.nskip),
        }
        Ok(IdentifyOutcome::Converged)
    }

    fn lines(&self) -> Vec<LineFit> {
        vec![
            LineFit { wave: 6402.2, weight: 0.9 },
            LineFit { wave: 7032.4, weight: 0.3 },
        ]
    }

    fn zero_point(&self) -> f64 {
        self.zero_point
    }

    fn reference_spectrum(&self) -> Vec<f64> {
        vec![1.0; 10]
    }

    fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, format!("{}", self.zero_point))?;
        self.stats.borrow_mut().writes.push(path.to_path_buf());
        Ok(())
    }

    fn add_wave(&self, frame: &Frame) -> Result<Frame> {
        if self.fail_xmm.is_some() && frame.header.number("XMM") == self.fail_xmm {
            return Err(ReductionError::external(Stage::WaveCal, "no lines found"));
        }
        let mut out = frame.clone();
        let zero = self.zero_point;
        out.wave = Some(Array2::from_shape_fn(frame.data.raw_dim(), |(_, c)| zero + c as f64));
        Ok(out)
    }

    fn correct(&self, frame: &Frame, _reference: ArrayView1<'_, f64>) -> Result<Frame> {
        Ok(frame.clone())
    }

    fn skyline(&mut self, input: SkyInput<'_>, _config: &SkylineConfig) -> Result<()> {
        {
            let mut stats = self.stats.borrow_mut();
            match input {
                SkyInput::Rows { rows, .. } => stats.sky_rows.push(rows.to_vec()),
                SkyInput::Spectrum(_) => stats.sky_spectra += 1,
            }
        }
        self.zero_point += self.sky_shift;
        Ok(())
    }
}

impl WaveCalLoader for FakeWaveCal {
    fn open(&self, path: &Path) -> Result<Box<dyn WaveSolution>> {
        self.stats.borrow_mut().opened.push(path.to_path_buf());
        let zero_point = fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(6000.0);
        Ok(Box::new(FakeSolution {
            stats: Rc::clone(&self.stats),
            zero_point,
            retries_left: self.retries.get(),
            fail_xmm: self.fail_xmm.get(),
            sky_shift: self.sky_shift,
        }))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeWriter {
    pub frames: RefCell<Vec<PathBuf>>,
    pub spectra: RefCell<Vec<PathBuf>>,
}

impl FakeWriter {
    pub fn frame_names(&self) -> Vec<String> {
        names(&self.frames.borrow())
    }

    pub fn spectrum_names(&self) -> Vec<String> {
        names(&self.spectra.borrow())
    }
}

fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

impl ProductWriter for FakeWriter {
    fn write_frame(&self, _frame: &Frame, path: &Path) -> Result<()> {
        self.frames.borrow_mut().push(path.to_path_buf());
        Ok(())
    }

    fn write_spectrum(&self, _spectrum: &Spec1d, path: &Path) -> Result<()> {
        self.spectra.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Records every progress event as a short string.
#[derive(Default)]
pub struct RecordingReporter {
    pub events: RefCell<Vec<String>>,
}

impl ProgressReporter for RecordingReporter {
    fn begin_stage(&self, stage: Stage, total_items: Option<usize>) {
        self.events
            .borrow_mut()
            .push(format!("begin {stage:?} {total_items:?}"));
    }

    fn advance(&self, items_done: usize) {
        self.events.borrow_mut().push(format!("advance {items_done}"));
    }

    fn finish_stage(&self) {
        self.events.borrow_mut().push("finish".to_string());
    }
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

/// Every fake collaborator for one test.
pub struct Fakes {
    pub reducer: FakeReducer,
    pub design: FakeDesign,
    pub tracer: FakeTracer,
    pub wavecal: FakeWaveCal,
    pub writer: FakeWriter,
    pub display: NoOpDisplay,
}

impl Fakes {
    /// `slits` slit edges and as many targets.
    pub fn new(slits: usize) -> Self {
        Self::with_counts(slits, slits, slits)
    }

    pub fn with_counts(bottom: usize, top: usize, n_targets: usize) -> Self {
        Self {
            reducer: FakeReducer::default(),
            design: FakeDesign::new(targets(n_targets)),
            tracer: FakeTracer::with_edges(bottom, top),
            wavecal: FakeWaveCal::default(),
            writer: FakeWriter::default(),
            display: NoOpDisplay,
        }
    }

    pub fn toolkit(&self) -> Toolkit<'_> {
        Toolkit {
            reducer: &self.reducer,
            design: &self.design,
            tracer: &self.tracer,
            wavecal: &self.wavecal,
            writer: &self.writer,
            display: &self.display,
        }
    }
}

/// Config with every frame list filled in, writing under `work_dir`.
pub fn config(work_dir: &Path) -> ReductionConfig {
    let mut config = ReductionConfig {
        work_dir: work_dir.to_path_buf(),
        log_dir: work_dir.join("reduction_log"),
        ..Default::default()
    };
    config.bias.frames = FrameList::from(vec![74, 75, 76, 77, 78]);
    config.dark.frames = FrameList::from(vec![79, 80, 81]);
    config.flat.frames = FrameList::from(vec![82, 83]);
    config.arc.frames = FrameList::from(vec![84, 85]);
    config.slits.flat = Some(FrameId::Number(82));
    config.slits.design_file = Some(PathBuf::from("mask.txt"));
    config.science.frame = Some(FrameId::Number(8));
    config
}

/// Run every stage up to and including science reduction.
pub fn through_reduce<'a>(fakes: &'a Fakes, work_dir: &Path) -> Reduction<'a> {
    let mut reduction = Reduction::new(config(work_dir), fakes.toolkit());
    reduction.compute_bias().unwrap();
    reduction.compute_dark().unwrap();
    reduction.compute_flat().unwrap();
    reduction.compute_arcs().unwrap();
    reduction.find_slits().unwrap();
    reduction.update_arc_headers().unwrap();
    reduction.reduce_science().unwrap();
    reduction
}

/// [`through_reduce`] plus wavelength calibration.
pub fn through_wavecal<'a>(fakes: &'a Fakes, work_dir: &Path) -> Reduction<'a> {
    let mut reduction = through_reduce(fakes, work_dir);
    reduction.run_wave_cal().unwrap();
    reduction
}
