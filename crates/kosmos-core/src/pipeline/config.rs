use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_ARC_LINE_POSITION, DEFAULT_CORRECTING_VALUE, DEFAULT_EXTRACTION_RADIUS,
    DEFAULT_FLAT_SN_MIN, DEFAULT_FLAT_WIDTH, DEFAULT_LAGS_OFFSET, DEFAULT_LOG_DIR,
    DEFAULT_MAX_IDENTIFY_ATTEMPTS, DEFAULT_SAMPLING_VALUE, DEFAULT_SHIFT_CHECK_ROW,
    DEFAULT_SHIFT_MULTIPLIER, DEFAULT_SIGMA_REJECT, DEFAULT_SKYLINE_RADIUS, DEFAULT_SKY_GAP,
    DEFAULT_WEAK_WEIGHT, SHIFT_CHECK_FLUX_SCALE,
};
use crate::error::Result;
use crate::frame::{FrameId, FrameList};
use crate::target::FilterMethod;

/// Every parameter of a reduction session, one section per stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Folder of raw frames the reducer was opened on.
    pub data_dir: Option<PathBuf>,
    /// Where solutions and extracted products are written.
    pub work_dir: PathBuf,
    /// Where session logs are written.
    pub log_dir: PathBuf,
    /// Star/target name used to name the session log.
    pub session_name: Option<String>,
    pub bias: BiasConfig,
    pub dark: DarkConfig,
    pub flat: FlatConfig,
    pub arc: ArcConfig,
    pub slits: SlitsConfig,
    pub filter: FilterConfig,
    pub science: ScienceConfig,
    pub wavecal: WaveCalConfig,
    pub shift_check: ShiftCheckConfig,
    pub extract2d: Extract2dConfig,
    pub extract1d: Extract1dConfig,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            work_dir: PathBuf::from("."),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            session_name: None,
            bias: BiasConfig::default(),
            dark: DarkConfig::default(),
            flat: FlatConfig::default(),
            arc: ArcConfig::default(),
            slits: SlitsConfig::default(),
            filter: FilterConfig::default(),
            science: ScienceConfig::default(),
            wavecal: WaveCalConfig::default(),
            shift_check: ShiftCheckConfig::default(),
            extract2d: Extract2dConfig::default(),
            extract1d: Extract1dConfig::default(),
        }
    }
}

impl ReductionConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Pixel statistic used to combine calibration exposures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMethod {
    #[default]
    Median,
    Mean,
    /// Sigma-rejected mean.
    Reject,
}

impl fmt::Display for CombineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Median => write!(f, "median"),
            Self::Mean => write!(f, "mean"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Options shared by every combined calibration master.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineSettings {
    pub method: CombineMethod,
    /// Rejection threshold used by [`CombineMethod::Reject`].
    pub sigma_reject: f64,
    pub trim: bool,
    /// Show every input exposure while combining.
    pub display_individual: bool,
}

impl Default for CombineSettings {
    fn default() -> Self {
        Self {
            method: CombineMethod::Median,
            sigma_reject: DEFAULT_SIGMA_REJECT,
            trim: false,
            display_individual: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    pub frames: FrameList,
    #[serde(flatten)]
    pub combine: CombineSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkConfig {
    pub frames: FrameList,
    #[serde(flatten)]
    pub combine: CombineSettings,
    /// Subtract the master bias before combining.
    pub apply_bias: bool,
    /// Floor dark current at `clip x uncertainty`.
    pub clip: Option<f64>,
}

impl Default for DarkConfig {
    fn default() -> Self {
        Self {
            frames: FrameList::default(),
            combine: CombineSettings::default(),
            apply_bias: true,
            clip: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatConfig {
    pub frames: FrameList,
    #[serde(flatten)]
    pub combine: CombineSettings,
    pub apply_bias: bool,
    pub apply_dark: bool,
    /// Divide out the mean spectral shape, leaving pixel-to-pixel structure.
    pub spectral: bool,
    /// Smoothing window for the spectral shape.
    pub width: usize,
    pub normalize: bool,
    /// Below this S/N normalization is skipped.
    pub sn_min: f64,
    pub littrow: bool,
}

impl Default for FlatConfig {
    fn default() -> Self {
        Self {
            frames: FrameList::default(),
            combine: CombineSettings::default(),
            apply_bias: true,
            apply_dark: true,
            spectral: true,
            width: DEFAULT_FLAT_WIDTH,
            normalize: true,
            sn_min: DEFAULT_FLAT_SN_MIN,
            littrow: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcConfig {
    pub frames: FrameList,
}

/// Slit edge detection on a flat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlitsConfig {
    /// Flat exposure the slits are found on.
    pub flat: Option<FrameId>,
    /// Slit-mask design file.
    pub design_file: Option<PathBuf>,
    pub edge_threshold: f64,
    pub smooth_radius: f64,
    pub fit_degree: usize,
    /// Detect edges on signal-to-noise instead of raw counts.
    pub sn_edges: bool,
    pub skip_pixels: usize,
    /// Spectrum center column, when known.
    pub center: Option<usize>,
    /// Refuse to store slits when edge and target counts differ.
    pub strict_count: bool,
}

impl Default for SlitsConfig {
    fn default() -> Self {
        Self {
            flat: None,
            design_file: None,
            edge_threshold: 0.5,
            smooth_radius: 3.0,
            fit_degree: 2,
            sn_edges: true,
            skip_pixels: 50,
            center: None,
            strict_count: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub method: FilterMethod,
    /// Comma-separated indices, IDs or names.
    pub values: String,
}

/// Cosmic-ray rejection applied by the reducer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CosmicRayMethod {
    None,
    #[default]
    Lacosmic,
    /// Median-box rejection with the given (rows, columns) box.
    Box([usize; 2]),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScienceConfig {
    pub frame: Option<FrameId>,
    pub apply_bias: bool,
    pub apply_dark: bool,
    pub apply_flat: bool,
    pub cosmic_ray: CosmicRayMethod,
    pub cr_sigma: f64,
    pub cr_object_limit: f64,
    pub sigfrac: f64,
    pub channel: Option<usize>,
    /// Scattered-light correction box, when requested.
    pub scattered_light: Option<usize>,
    /// Replace masked pixels with this value.
    pub bad_pixel_value: Option<i64>,
    pub trim: bool,
    pub utr: bool,
    pub extension: usize,
    pub plate_solve: bool,
    pub seeing: f64,
}

impl Default for ScienceConfig {
    fn default() -> Self {
        Self {
            frame: None,
            apply_bias: true,
            apply_dark: true,
            apply_flat: false,
            cosmic_ray: CosmicRayMethod::Lacosmic,
            cr_sigma: 5.0,
            cr_object_limit: 5.0,
            sigfrac: 0.3,
            channel: None,
            scattered_light: None,
            bad_pixel_value: None,
            trim: true,
            utr: false,
            extension: 0,
            plate_solve: false,
            seeing: 2.0,
        }
    }
}

/// Arc-lamp wavelength calibration, one solution per slit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveCalConfig {
    /// Recompute solutions that already exist on disk.
    pub clobber: bool,
    /// Reference lamp spectrum with a known wavelength model.
    pub lamp_spectrum: PathBuf,
    /// Degree of the initial fit to the reference lamp.
    pub fit_degree: usize,
    /// Degree of the full-slit refit.
    pub refit_degree: usize,
    /// Converts header XMM into an initial lag guess.
    pub shift_multiplier: f64,
    /// Half-width of the lag window.
    pub lags_offset: i64,
    pub identify_thresh: f64,
    pub rad: usize,
    pub maxshift: f64,
    /// Lamp line list.
    pub line_list: Option<PathBuf>,
    pub sky: bool,
    pub fit: bool,
    pub interactive: bool,
    pub plot: bool,
    pub xmin: Option<f64>,
    pub xmax: Option<f64>,
    pub nskip: Option<usize>,
    pub rows: Option<Vec<usize>>,
    /// Full-slit refit samples every `rows / sampling_value`-th row.
    pub sampling_value: usize,
    /// Rectification reference row is `rows / correcting_value`.
    pub correcting_value: usize,
    pub weight_thresh: f64,
    /// Single-row identification uses row `rows / arc_line_position`.
    pub arc_line_position: usize,
    pub max_identify_attempts: usize,
}

impl Default for WaveCalConfig {
    fn default() -> Self {
        Self {
            clobber: false,
            lamp_spectrum: PathBuf::from("KOSMOS/KOSMOS_red_waves.fits"),
            fit_degree: 3,
            refit_degree: 5,
            shift_multiplier: DEFAULT_SHIFT_MULTIPLIER,
            lags_offset: DEFAULT_LAGS_OFFSET,
            identify_thresh: 10.0,
            rad: 5,
            maxshift: 1.0e10,
            line_list: Some(PathBuf::from("new_wave_lamp/old_neon_red_center.dat")),
            sky: false,
            fit: true,
            interactive: false,
            plot: true,
            xmin: None,
            xmax: None,
            nskip: None,
            rows: None,
            sampling_value: DEFAULT_SAMPLING_VALUE,
            correcting_value: DEFAULT_CORRECTING_VALUE,
            weight_thresh: DEFAULT_WEAK_WEIGHT,
            arc_line_position: DEFAULT_ARC_LINE_POSITION,
            max_identify_attempts: DEFAULT_MAX_IDENTIFY_ATTEMPTS,
        }
    }
}

/// Lamp/arc overlay used to eyeball the shift multiplier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShiftCheckConfig {
    pub arc_row: usize,
    pub flux_scale: f64,
}

impl Default for ShiftCheckConfig {
    fn default() -> Self {
        Self {
            arc_row: DEFAULT_SHIFT_CHECK_ROW,
            flux_scale: SHIFT_CHECK_FLUX_SCALE,
        }
    }
}

/// Row window and padding for cutting slitlets out of a frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutoutConfig {
    pub rows: Option<[usize; 2]>,
    pub buffer: usize,
}

/// Spatial peak finding within a slitlet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Search width; `None` searches the whole slit around its center.
    pub width: Option<usize>,
    pub sc0: Option<usize>,
    pub thresh: f64,
    pub sort: bool,
    pub back_percentile: f64,
    pub method: String,
    pub smooth: f64,
    pub diff: usize,
    pub bundle: usize,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            width: None,
            sc0: None,
            thresh: 10.0,
            sort: true,
            back_percentile: 10.0,
            method: "linear".to_string(),
            smooth: 5.0,
            diff: 10_000,
            bundle: 10_000,
        }
    }
}

/// Sky emission-line wavelength refit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkylineConfig {
    pub thresh: f64,
    pub linear: bool,
    pub line_list: PathBuf,
    pub interactive: bool,
    pub plot: bool,
    /// Explicit sky rows; overrides the rows derived from the object radius.
    pub rows: Option<Vec<usize>>,
}

impl Default for SkylineConfig {
    fn default() -> Self {
        Self {
            thresh: 10.0,
            linear: false,
            line_list: PathBuf::from("skyline.dat"),
            interactive: true,
            plot: false,
            rows: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extract2dConfig {
    /// Refit each slitlet's wavelengths on sky lines before rectifying.
    pub adjust: bool,
    pub cutout: CutoutConfig,
    pub peak: PeakConfig,
    pub skyline: SkylineConfig,
    /// Rows within this distance of the object peak are excluded from the sky fit.
    pub exclusion_radius: usize,
    pub correcting_value: usize,
}

impl Default for Extract2dConfig {
    fn default() -> Self {
        Self {
            adjust: true,
            cutout: CutoutConfig::default(),
            peak: PeakConfig::default(),
            skyline: SkylineConfig::default(),
            exclusion_radius: DEFAULT_SKYLINE_RADIUS,
            correcting_value: DEFAULT_CORRECTING_VALUE,
        }
    }
}

/// Object centroid tracing along the dispersion axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectTraceConfig {
    /// Seed rows; defaults to the found peak.
    pub seed_rows: Option<Vec<usize>>,
    pub degree: usize,
    pub sigdegree: usize,
    pub rad: Option<usize>,
    pub sc0: Option<usize>,
    pub thresh: f64,
    pub skip: usize,
    pub gaussian: bool,
    pub lags: Option<[i64; 2]>,
    pub transpose: bool,
}

impl Default for ObjectTraceConfig {
    fn default() -> Self {
        Self {
            seed_rows: None,
            degree: 3,
            sigdegree: 3,
            rad: Some(5),
            sc0: None,
            thresh: 20.0,
            skip: 20,
            gaussian: true,
            lags: Some([-39, 39]),
            transpose: false,
        }
    }
}

/// Options forwarded to the extractor unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApertureConfig {
    pub fit: bool,
    pub old: bool,
    pub nout: Option<usize>,
    /// Extractor threads; 0 lets the library decide.
    pub threads: usize,
    pub medfilt: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Extract1dConfig {
    /// Refit wavelengths on sky lines in each extracted spectrum.
    pub sky_adjust: bool,
    /// Initial aperture radius.
    pub radius: usize,
    /// Gap between aperture edge and each background window.
    pub sky_gap: i64,
    pub peak: PeakConfig,
    pub trace: ObjectTraceConfig,
    pub aperture: ApertureConfig,
    pub skyline: SkylineConfig,
}

impl Default for Extract1dConfig {
    fn default() -> Self {
        Self {
            sky_adjust: false,
            radius: DEFAULT_EXTRACTION_RADIUS,
            sky_gap: DEFAULT_SKY_GAP,
            peak: PeakConfig {
                thresh: 50.0,
                ..Default::default()
            },
            trace: ObjectTraceConfig::default(),
            aperture: ApertureConfig::default(),
            skyline: SkylineConfig {
                thresh: 12.0,
                line_list: PathBuf::from("new_wave_lamp/skyline.dat"),
                plot: true,
                ..Default::default()
            },
        }
    }
}
