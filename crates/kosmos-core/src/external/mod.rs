//! Seams to the external reduction library.
//!
//! Every numerical primitive (combination statistics, cosmic-ray rejection,
//! edge finding, line identification, polynomial fitting, FITS I/O) lives
//! behind these traits. The controller only decides what to call, with which
//! inputs, and where the outputs go.

use std::ops::Range;
use std::path::Path;

use ndarray::ArrayView1;

use crate::error::Result;
use crate::frame::{Frame, FrameId, FrameList, Spec1d};
use crate::pipeline::config::{
    ApertureConfig, CombineSettings, CutoutConfig, DarkConfig, FlatConfig, ObjectTraceConfig,
    PeakConfig, ScienceConfig, SkylineConfig, SlitsConfig, WaveCalConfig,
};
use crate::target::Target;
use crate::trace::{SlitEdges, SlitTrace};

/// Calibrations and options for reducing one raw frame. Calibrations left as
/// `None` are not applied.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReduceRequest<'a> {
    pub bias: Option<&'a Frame>,
    pub dark: Option<&'a Frame>,
    pub flat: Option<&'a Frame>,
    /// Cosmic-ray and detector options; `None` reads the frame as-is.
    pub settings: Option<&'a ScienceConfig>,
}

impl ReduceRequest<'_> {
    /// Read a frame with no calibration and no cosmic-ray rejection.
    pub fn uncalibrated() -> Self {
        Self::default()
    }
}

/// Raw frame reader and calibration-master combiner.
pub trait FrameReducer {
    fn reduce(&self, id: &FrameId, request: &ReduceRequest<'_>) -> Result<Frame>;

    fn mkbias(&self, frames: &FrameList, settings: &CombineSettings) -> Result<Frame>;

    fn mkdark(&self, frames: &FrameList, bias: Option<&Frame>, config: &DarkConfig)
        -> Result<Frame>;

    fn mkflat(
        &self,
        frames: &FrameList,
        bias: Option<&Frame>,
        dark: Option<&Frame>,
        config: &FlatConfig,
    ) -> Result<Frame>;

    /// Plain sum, used for arc lamps.
    fn sum(&self, frames: &FrameList) -> Result<Frame>;
}

/// Slit-mask design file reader.
pub trait DesignReader {
    /// Targets in file order.
    fn read_targets(&self, path: &Path) -> Result<Vec<Target>>;
}

/// Aperture and background geometry for one 1D extraction.
#[derive(Clone, Copy, Debug)]
pub struct ApertureRequest<'a> {
    pub radius: usize,
    /// Background windows as `[[lo, hi], [lo, hi]]` row offsets from the trace.
    pub background: [[i64; 2]; 2],
    pub options: &'a ApertureConfig,
}

/// Slit edge finder and extractor.
pub trait SlitTracer {
    /// Fit slit edges on a flat.
    fn find_slits(&self, flat: &Frame, config: &SlitsConfig) -> Result<SlitEdges>;

    /// Cut one 2D slitlet per trace entry.
    fn extract2d(&self, frame: &Frame, trace: &SlitTrace, cutout: &CutoutConfig)
        -> Result<Vec<Frame>>;

    /// Spatial rows of object peaks, brightest first. Empty when none pass
    /// the threshold.
    fn find_peak(&self, frame: &Frame, config: &PeakConfig) -> Result<Vec<usize>>;

    /// Follow object centroids along dispersion, starting from `seeds`.
    fn trace(
        &self,
        frame: &Frame,
        seeds: &[usize],
        initial: &SlitTrace,
        config: &ObjectTraceConfig,
    ) -> Result<SlitTrace>;

    fn extract(&self, frame: &Frame, trace: &SlitTrace, request: &ApertureRequest<'_>)
        -> Result<Spec1d>;
}

/// What line identification runs on.
#[derive(Clone, Copy, Debug)]
pub enum IdentifyInput<'a> {
    /// A single extracted row.
    Row(ArrayView1<'a, f32>),
    /// Every `nskip`-th row of a slitlet.
    Frame(&'a Frame),
}

/// Line identification parameters.
#[derive(Clone, Debug)]
pub struct IdentifyParams<'a> {
    /// Cross-correlation lag window; `None` skips the correlation search.
    pub lags: Option<Range<i64>>,
    pub nskip: Option<usize>,
    /// Threshold, radius, line list and the remaining forwarded options.
    pub settings: &'a WaveCalConfig,
}

/// Return of one identification call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentifyOutcome {
    Converged,
    /// The library asked to be called again.
    Retry,
}

/// One identified lamp line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineFit {
    pub wave: f64,
    pub weight: f64,
}

/// Sky emission input for a sky-line refit.
#[derive(Clone, Copy, Debug)]
pub enum SkyInput<'a> {
    /// Rows of a wavelength-calibrated slitlet.
    Rows { frame: &'a Frame, rows: &'a [usize] },
    /// An extracted spectrum.
    Spectrum(&'a Spec1d),
}

/// A polynomial wavelength solution.
pub trait WaveSolution {
    fn fit(&mut self, degree: usize) -> Result<()>;

    fn set_degree(&mut self, degree: usize);

    fn identify(
        &mut self,
        input: IdentifyInput<'_>,
        params: &IdentifyParams<'_>,
    ) -> Result<IdentifyOutcome>;

    fn lines(&self) -> Vec<LineFit>;

    /// Constant term of the solution.
    fn zero_point(&self) -> f64;

    /// Flux of the reference spectrum the solution was built from.
    fn reference_spectrum(&self) -> Vec<f64>;

    fn write(&self, path: &Path) -> Result<()>;

    /// Copy of `frame` with a per-pixel wavelength array.
    fn add_wave(&self, frame: &Frame) -> Result<Frame>;

    /// Resample `frame` onto the `reference` wavelength grid.
    fn correct(&self, frame: &Frame, reference: ArrayView1<'_, f64>) -> Result<Frame>;

    /// Refit the zero point on sky emission lines.
    fn skyline(&mut self, input: SkyInput<'_>, config: &SkylineConfig) -> Result<()>;
}

/// Opens wavelength solutions and reference lamp spectra.
pub trait WaveCalLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn WaveSolution>>;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Writes extracted products.
pub trait ProductWriter {
    fn write_frame(&self, frame: &Frame, path: &Path) -> Result<()>;

    fn write_spectrum(&self, spectrum: &Spec1d, path: &Path) -> Result<()>;
}

/// One line of an overlay plot.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Optional visual output. All methods default to doing nothing.
pub trait FrameDisplay {
    fn show(&self, _title: &str, _frame: &Frame) {}

    fn plot(&self, _title: &str, _series: &[Series]) {}

    fn clear(&self) {}
}

pub struct NoOpDisplay;
impl FrameDisplay for NoOpDisplay {}

/// Every collaborator a reduction session talks to.
#[derive(Clone, Copy)]
pub struct Toolkit<'a> {
    pub reducer: &'a dyn FrameReducer,
    pub design: &'a dyn DesignReader,
    pub tracer: &'a dyn SlitTracer,
    pub wavecal: &'a dyn WaveCalLoader,
    pub writer: &'a dyn ProductWriter,
    pub display: &'a dyn FrameDisplay,
}
