/// Prefix of persisted wavelength solution files.
pub const SOLUTION_PREFIX: &str = "CofIwav";

/// Extension used for every FITS product written by the pipeline.
pub const FITS_EXTENSION: &str = "fits";

/// Default combine rejection threshold (sigma) for bias, dark and flat masters.
pub const DEFAULT_SIGMA_REJECT: f64 = 5.0;

/// Default smoothing window (pixels) used when normalizing a spectral flat.
pub const DEFAULT_FLAT_WIDTH: usize = 101;

/// Signal-to-noise floor below which flat normalization is skipped.
pub const DEFAULT_FLAT_SN_MIN: f64 = 50.0;

/// Empirical pixels-per-millimeter factor converting mask XMM into a lag
/// guess for the red KOSMOS lamp. Sign depends on lamp and grating.
pub const DEFAULT_SHIFT_MULTIPLIER: f64 = -22.5;

/// Half-width of the cross-correlation lag window.
pub const DEFAULT_LAGS_OFFSET: i64 = 50;

/// Lines identified with a weight below this are reported as weak.
pub const DEFAULT_WEAK_WEIGHT: f64 = 0.5;

/// Full-slit refit uses every `rows / DEFAULT_SAMPLING_VALUE`-th row.
pub const DEFAULT_SAMPLING_VALUE: usize = 10;

/// Wavelength reference row for rectification is `rows / DEFAULT_CORRECTING_VALUE`.
pub const DEFAULT_CORRECTING_VALUE: usize = 2;

/// Representative identification row is `rows / DEFAULT_ARC_LINE_POSITION`.
pub const DEFAULT_ARC_LINE_POSITION: usize = 2;

/// Upper bound on repeated single-row identification attempts.
pub const DEFAULT_MAX_IDENTIFY_ATTEMPTS: usize = 25;

/// Arc row overlaid on the lamp spectrum by the shift check.
pub const DEFAULT_SHIFT_CHECK_ROW: usize = 19;

/// Arc flux scale applied in the shift check overlay.
pub const SHIFT_CHECK_FLUX_SCALE: f64 = 30.0;

/// Default object exclusion radius for 2D sky-line refits.
pub const DEFAULT_SKYLINE_RADIUS: usize = 5;

/// Radii the operator may pick when retrying a 2D sky-line refit.
pub const SKYLINE_RADIUS_MIN: usize = 2;
pub const SKYLINE_RADIUS_MAX: usize = 15;

/// Default 1D extraction aperture radius.
pub const DEFAULT_EXTRACTION_RADIUS: usize = 5;

/// Radii the operator may pick when retrying a 1D extraction.
pub const APERTURE_RADIUS_MIN: usize = 3;
pub const APERTURE_RADIUS_MAX: usize = 15;

/// Gap (rows) between the aperture edge and each background window.
pub const DEFAULT_SKY_GAP: i64 = 10;

/// Background window width is `radius - BACKGROUND_WIDTH_OFFSET` rows.
pub const BACKGROUND_WIDTH_OFFSET: i64 = 5;

/// Directory the session log is written to when none is configured.
pub const DEFAULT_LOG_DIR: &str = "reduction_log";

/// Session log block separator.
pub const LOG_SEPARATOR_WIDTH: usize = 60;
