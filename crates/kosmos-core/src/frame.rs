use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{ReductionError, Result};

/// Header keyword holding the target/object name.
pub const KEY_OBJNAME: &str = "OBJNAME";
/// Header keyword holding the raw file name the frame was read from.
pub const KEY_FILE: &str = "FILE";
/// Mask-plane X coordinate (mm) stamped on arc cutouts.
pub const KEY_XMM: &str = "XMM";
/// Mask-plane Y coordinate (mm) stamped on arc cutouts.
pub const KEY_YMM: &str = "YMM";
/// ID of the target an arc cutout was cut for.
pub const KEY_TARGET_ID: &str = "TARGID";

/// A single FITS header value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Keyword/value metadata attached to a frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    cards: BTreeMap<String, HeaderValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.cards.insert(key.into(), value.into());
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_text)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.cards.iter()
    }
}

/// A 2D pixel array with uncertainty, header, and an optional per-pixel
/// wavelength array once a wavelength solution has been applied.
///
/// Stages never mutate a produced frame in place; they store a new one.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Pixel data, shape = (rows, columns). Rows run along the slit.
    pub data: Array2<f32>,
    /// 1-sigma uncertainty, same shape as `data`.
    pub uncertainty: Array2<f32>,
    pub header: Header,
    /// Wavelength of every pixel, same shape as `data`.
    pub wave: Option<Array2<f64>>,
}

impl Frame {
    /// Frame with zero uncertainty and an empty header.
    pub fn new(data: Array2<f32>) -> Self {
        let uncertainty = Array2::zeros(data.raw_dim());
        Self {
            data,
            uncertainty,
            header: Header::new(),
            wave: None,
        }
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_wavelength_calibrated(&self) -> bool {
        self.wave.is_some()
    }

    pub fn object_name(&self) -> Result<&str> {
        self.header
            .text(KEY_OBJNAME)
            .map(str::trim)
            .ok_or(ReductionError::MissingHeader(KEY_OBJNAME))
    }

    pub fn xmm(&self) -> Result<f64> {
        self.header
            .number(KEY_XMM)
            .ok_or(ReductionError::MissingHeader(KEY_XMM))
    }

    /// Name used for extracted products: the raw file name up to the first
    /// dot, falling back to the object name.
    pub fn product_name(&self) -> Result<String> {
        if let Some(file) = self.header.text(KEY_FILE) {
            let stem = file.split('.').next().unwrap_or(file).trim();
            if !stem.is_empty() {
                return Ok(stem.to_string());
            }
        }
        self.object_name().map(str::to_string)
    }

    /// Wavelength row `rows / divisor`, the reference used to rectify a slitlet.
    pub fn reference_wave(&self, divisor: usize) -> Result<Array1<f64>> {
        let wave = self.wave.as_ref().ok_or_else(|| {
            ReductionError::InvalidInput("frame has no wavelength array".to_string())
        })?;
        if wave.nrows() == 0 {
            return Err(ReductionError::InvalidInput(
                "frame has no rows".to_string(),
            ));
        }
        let row = (wave.nrows() / divisor.max(1)).min(wave.nrows() - 1);
        Ok(wave.row(row).to_owned())
    }
}

/// Extracted 1D spectrum: one row per traced object, with the sky that was
/// subtracted alongside.
#[derive(Clone, Debug, PartialEq)]
pub struct Spec1d {
    /// Flux, uncertainty, header and wavelength of the extraction.
    pub frame: Frame,
    /// Sky estimate from the background windows, same shape as the flux.
    pub sky: Array2<f32>,
}

impl Spec1d {
    pub fn new(frame: Frame, sky: Array2<f32>) -> Self {
        Self { frame, sky }
    }
}

/// Identifier of one raw exposure: a frame number or a file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameId {
    Number(u32),
    Name(String),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for FrameId {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ReductionError::InvalidInput(
                "empty frame identifier".to_string(),
            ));
        }
        Ok(s.parse::<u32>()
            .map(Self::Number)
            .unwrap_or_else(|_| Self::Name(s.to_string())))
    }
}

/// Raw exposures to combine. Parsed from comma-separated text: when every
/// item is an integer the list holds frame numbers, otherwise file names.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameList(pub Vec<FrameId>);

impl FrameList {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameId> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<&FrameId> {
        self.0.first()
    }
}

impl From<Vec<u32>> for FrameList {
    fn from(numbers: Vec<u32>) -> Self {
        Self(numbers.into_iter().map(FrameId::Number).collect())
    }
}

impl FromStr for FrameList {
    type Err = ReductionError;

    fn from_str(s: &str) -> Result<Self> {
        let items: Vec<&str> = s.split(',').map(str::trim).filter(|x| !x.is_empty()).collect();
        let numbers: Option<Vec<u32>> = items.iter().map(|x| x.parse().ok()).collect();
        Ok(match numbers {
            Some(numbers) => numbers.into(),
            None => Self(
                items
                    .into_iter()
                    .map(|x| FrameId::Name(x.to_string()))
                    .collect(),
            ),
        })
    }
}

impl fmt::Display for FrameList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join(","))
    }
}
