use serde::{Deserialize, Serialize};

/// Polynomial in the dispersion coordinate, lowest order first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    pub coeffs: Vec<f64>,
}

impl Polynomial {
    pub fn new(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn constant(value: f64) -> Self {
        Self {
            coeffs: vec![value],
        }
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Horner evaluation.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Geometric model of a set of slits (or of objects within one slit):
/// one center polynomial and one row window per entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SlitTrace {
    pub model: Vec<Polynomial>,
    /// Spatial row range `[start, end)` for each entry.
    pub rows: Vec<[usize; 2]>,
    /// Dispersion runs along image rows when true.
    pub transpose: bool,
}

impl SlitTrace {
    /// Single-entry trace that follows a fixed spatial row.
    pub fn constant(center: f64) -> Self {
        Self {
            model: vec![Polynomial::constant(center)],
            rows: Vec::new(),
            transpose: false,
        }
    }

    pub fn len(&self) -> usize {
        self.model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }

    /// Keep only the entries at `indices`, in that order. Indices past the
    /// end of `model` or `rows` are skipped for that list only.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            model: indices
                .iter()
                .filter_map(|&i| self.model.get(i).cloned())
                .collect(),
            rows: indices.iter().filter_map(|&i| self.rows.get(i).copied()).collect(),
            transpose: self.transpose,
        }
    }
}

/// Slit edges found on a flat, plus the trace built from them.
#[derive(Clone, Debug, PartialEq)]
pub struct SlitEdges {
    pub bottom: Vec<Polynomial>,
    pub top: Vec<Polynomial>,
    pub trace: SlitTrace,
}
