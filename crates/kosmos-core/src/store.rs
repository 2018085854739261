use std::fmt;
use std::path::PathBuf;

use crate::frame::{Frame, Spec1d};
use crate::target::Target;
use crate::trace::SlitTrace;

/// Which calibration master a stage produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MasterKind {
    Bias,
    Dark,
    Flat,
    Arc,
}

impl fmt::Display for MasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bias => write!(f, "bias"),
            Self::Dark => write!(f, "dark"),
            Self::Flat => write!(f, "flat"),
            Self::Arc => write!(f, "arc"),
        }
    }
}

/// A rectified 2D slitlet and the target it was cut for.
#[derive(Clone, Debug, PartialEq)]
pub struct Slitlet {
    /// Position of the target in the working target list.
    pub index: usize,
    pub target: Target,
    pub frame: Frame,
    /// Wavelengths were refit on sky lines rather than taken from the arc.
    pub sky_adjusted: bool,
}

/// An accepted 1D extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedSpectrum {
    pub index: usize,
    pub target: Target,
    pub radius: usize,
    pub spectrum: Spec1d,
    pub path: PathBuf,
}

/// Named data products of one reduction session.
///
/// Stages receive the store by `&mut` and either replace whole fields or
/// leave it untouched; a stage that fails a precondition never writes.
/// `revision` counts completed writes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStore {
    pub bias: Option<Frame>,
    pub dark: Option<Frame>,
    pub flat: Option<Frame>,
    pub arc: Option<Frame>,
    /// Science frame after calibration and cosmic-ray rejection.
    pub reduced: Option<Frame>,
    pub full_trace: Option<SlitTrace>,
    pub full_targets: Option<Vec<Target>>,
    /// Working subset of `full_trace`, index-aligned with `targets`.
    pub trace: Option<SlitTrace>,
    pub targets: Option<Vec<Target>>,
    /// Arc cutouts stamped with target mask coordinates.
    pub arc_cutouts: Option<Vec<Frame>>,
    pub spec2d: Option<Vec<Slitlet>>,
    pub spec1d: Vec<ExtractedSpectrum>,
    revision: u64,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn master(&self, kind: MasterKind) -> Option<&Frame> {
        match kind {
            MasterKind::Bias => self.bias.as_ref(),
            MasterKind::Dark => self.dark.as_ref(),
            MasterKind::Flat => self.flat.as_ref(),
            MasterKind::Arc => self.arc.as_ref(),
        }
    }

    pub fn set_master(&mut self, kind: MasterKind, frame: Frame) {
        let slot = match kind {
            MasterKind::Bias => &mut self.bias,
            MasterKind::Dark => &mut self.dark,
            MasterKind::Flat => &mut self.flat,
            MasterKind::Arc => &mut self.arc,
        };
        *slot = Some(frame);
        self.touch();
    }

    /// Store freshly discovered slits as both the full and working copies.
    pub fn set_slits(&mut self, trace: SlitTrace, targets: Vec<Target>) {
        self.full_trace = Some(trace.clone());
        self.full_targets = Some(targets.clone());
        self.select(trace, targets);
    }

    /// Replace the working subset. The full copies are left alone.
    pub fn set_selection(&mut self, trace: SlitTrace, targets: Vec<Target>) {
        self.select(trace, targets);
    }

    /// Restore the working subset from the full copies. Returns false when
    /// slits were never found.
    pub fn reset_selection(&mut self) -> bool {
        match (self.full_trace.clone(), self.full_targets.clone()) {
            (Some(trace), Some(targets)) => {
                self.select(trace, targets);
                true
            }
            _ => false,
        }
    }

    // Arc cutouts and 2D slitlets are index-aligned with the working targets,
    // so they go whenever the selection changes.
    fn select(&mut self, trace: SlitTrace, targets: Vec<Target>) {
        self.trace = Some(trace);
        self.targets = Some(targets);
        self.arc_cutouts = None;
        self.spec2d = None;
        self.touch();
    }

    pub fn set_arc_cutouts(&mut self, cutouts: Vec<Frame>) {
        self.arc_cutouts = Some(cutouts);
        self.touch();
    }

    pub fn set_reduced(&mut self, frame: Frame) {
        self.reduced = Some(frame);
        self.touch();
    }

    pub fn set_spec2d(&mut self, slitlets: Vec<Slitlet>) {
        self.spec2d = Some(slitlets);
        self.touch();
    }

    pub fn set_spec1d(&mut self, spectra: Vec<ExtractedSpectrum>) {
        self.spec1d = spectra;
        self.touch();
    }

    /// Drop every product.
    pub fn reset(&mut self) {
        let revision = self.revision;
        *self = Self::default();
        self.revision = revision;
        self.touch();
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}
