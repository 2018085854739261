//! File names of persisted products.
//!
//! Names double as cache keys: a wavelength solution exists for an
//! `(object, target)` pair exactly when a file named by [`SolutionKey`] is on
//! disk.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::consts::{FITS_EXTENSION, SOLUTION_PREFIX};
use crate::error::Result;
use crate::frame::Frame;
use crate::target::Target;

/// Identity of a wavelength solution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SolutionKey {
    pub object: String,
    pub target_id: String,
}

impl SolutionKey {
    pub fn new(object: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            target_id: target_id.into(),
        }
    }

    /// Key for the slitlet cut from a frame for `target`.
    pub fn for_slit(frame: &Frame, target: &Target) -> Result<Self> {
        Ok(Self::new(frame.object_name()?, target.id.trim()))
    }

    pub fn file_name(&self) -> String {
        format!(
            "{SOLUTION_PREFIX}_{}_{}.{FITS_EXTENSION}",
            self.object, self.target_id
        )
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl fmt::Display for SolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object, self.target_id)
    }
}

/// Rectified slitlet after a sky-line wavelength adjustment.
pub fn adjusted_2d_name(name: &str, target_id: &str) -> String {
    format!("{name}_{target_id}_2d.{FITS_EXTENSION}")
}

/// Rectified slitlet using the arc solution as-is.
pub fn unadjusted_2d_name(name: &str, target_id: &str) -> String {
    format!("{name}_{target_id}_not_adjusted_2d.{FITS_EXTENSION}")
}

/// Which wavelength correction a 1D product carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Spec1dKind {
    /// Arc solution only; the 2D stage ran without sky-line adjustment.
    ArcOnly,
    /// Wavelengths inherited from a sky-line adjusted 2D slitlet.
    FromSpec2d,
    /// Wavelengths additionally refit on sky lines in the 1D spectrum.
    SkyAdjusted,
}

impl Spec1dKind {
    /// `sky_adjust` is the 1D refit flag, `spec2d_adjusted` the mode the
    /// slitlet was extracted in.
    pub fn select(sky_adjust: bool, spec2d_adjusted: bool) -> Self {
        match (sky_adjust, spec2d_adjusted) {
            (true, _) => Self::SkyAdjusted,
            (false, true) => Self::FromSpec2d,
            (false, false) => Self::ArcOnly,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::ArcOnly => "not_ad",
            Self::FromSpec2d => "2d_ad",
            Self::SkyAdjusted => "1d_ad",
        }
    }
}

pub fn spec1d_name(
    kind: Spec1dKind,
    radius: usize,
    name: &str,
    target_id: &str,
    slit_index: usize,
) -> String {
    format!(
        "{}_{radius}_{name}_{target_id}_{slit_index}.{FITS_EXTENSION}",
        kind.prefix()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solution_file_name() {
        let key = SolutionKey::new("M5", "42");
        assert_eq!(key.file_name(), "CofIwav_M5_42.fits");
    }

    #[test]
    fn test_product_names() {
        assert_eq!(adjusted_2d_name("M5real", "7"), "M5real_7_2d.fits");
        assert_eq!(
            unadjusted_2d_name("M5real", "7"),
            "M5real_7_not_adjusted_2d.fits"
        );
        assert_eq!(
            spec1d_name(Spec1dKind::SkyAdjusted, 8, "M5real", "7", 3),
            "1d_ad_8_M5real_7_3.fits"
        );
        assert_eq!(
            spec1d_name(Spec1dKind::FromSpec2d, 5, "M5real", "7", 0),
            "2d_ad_5_M5real_7_0.fits"
        );
        assert_eq!(
            spec1d_name(Spec1dKind::ArcOnly, 5, "M5real", "7", 0),
            "not_ad_5_M5real_7_0.fits"
        );
    }

    #[test]
    fn test_spec1d_kind_follows_adjustments() {
        assert_eq!(Spec1dKind::select(true, false), Spec1dKind::SkyAdjusted);
        assert_eq!(Spec1dKind::select(false, true), Spec1dKind::FromSpec2d);
        assert_eq!(Spec1dKind::select(false, false), Spec1dKind::ArcOnly);
    }
}
