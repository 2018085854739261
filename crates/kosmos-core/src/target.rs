use std::fmt;

use serde::{Deserialize, Serialize};

/// One slit of the mask, as read from the design file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    /// Mask-plane X coordinate in millimeters.
    pub xmm: f64,
    /// Mask-plane Y coordinate in millimeters.
    pub ymm: f64,
}

impl Target {
    pub fn new(id: impl Into<String>, name: impl Into<String>, xmm: f64, ymm: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            xmm,
            ymm,
        }
    }
}

/// Sort targets by mask Y coordinate, the order slits appear on the detector.
pub fn sort_by_ymm(targets: &mut [Target]) {
    targets.sort_by(|a, b| a.ymm.total_cmp(&b.ymm));
}

/// Column used to select a subset of targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMethod {
    #[default]
    Index,
    #[serde(rename = "ID")]
    Id,
    Name,
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index => write!(f, "Index"),
            Self::Id => write!(f, "ID"),
            Self::Name => write!(f, "Name"),
        }
    }
}

/// Result of matching filter values against the full target list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    /// Indices into the full target list, in the order they were matched.
    pub indices: Vec<usize>,
    /// One diagnostic per value that could not be used.
    pub rejected: Vec<String>,
}

fn strip_token(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '\'' || c == '"')
}

/// Match comma-separated `values` against `targets`.
///
/// Index values keep the order they were given; out-of-range or non-numeric
/// entries are rejected individually. ID and Name values match whole
/// whitespace-stripped strings, case-sensitively, and return indices in
/// table order.
pub fn select_indices(targets: &[Target], method: FilterMethod, values: &str) -> Selection {
    let tokens: Vec<&str> = values
        .split(',')
        .map(strip_token)
        .filter(|t| !t.is_empty())
        .collect();
    let mut selection = Selection::default();

    match method {
        FilterMethod::Index => {
            for token in tokens {
                if !token.chars().all(|c| c.is_ascii_digit()) {
                    selection.rejected.push(format!("Invalid index '{token}'"));
                    continue;
                }
                match token.parse::<usize>() {
                    Ok(idx) if idx < targets.len() => selection.indices.push(idx),
                    _ => selection.rejected.push(format!(
                        "Index {token} out of range (0-{})",
                        targets.len().saturating_sub(1)
                    )),
                }
            }
        }
        FilterMethod::Id | FilterMethod::Name => {
            let column = |t: &Target| -> String {
                match method {
                    FilterMethod::Id => t.id.trim().to_string(),
                    _ => t.name.trim().to_string(),
                }
            };
            for (idx, target) in targets.iter().enumerate() {
                if tokens.contains(&column(target).as_str()) {
                    selection.indices.push(idx);
                }
            }
            for token in tokens {
                if !targets.iter().any(|t| column(t) == token) {
                    selection
                        .rejected
                        .push(format!("No target with {method} '{token}'"));
                }
            }
        }
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<Target> {
        vec![
            Target::new("101", "star_a", 1.0, -3.0),
            Target::new("102", "star_b", 2.0, 0.5),
            Target::new(" 103 ", "Star_C", -1.0, 4.0),
        ]
    }

    #[test]
    fn test_index_keeps_given_order_and_drops_bad_values() {
        let sel = select_indices(&targets(), FilterMethod::Index, "2, x, 0, 9");
        assert_eq!(sel.indices, vec![2, 0]);
        assert_eq!(sel.rejected.len(), 2);
    }

    #[test]
    fn test_negative_index_rejected() {
        let sel = select_indices(&targets(), FilterMethod::Index, "-1");
        assert!(sel.indices.is_empty());
        assert_eq!(sel.rejected, vec!["Invalid index '-1'".to_string()]);
    }

    #[test]
    fn test_id_match_strips_whitespace_and_quotes() {
        let sel = select_indices(&targets(), FilterMethod::Id, "'103', \"101\"");
        assert_eq!(sel.indices, vec![0, 2]);
        assert!(sel.rejected.is_empty());
    }

    #[test]
    fn test_name_match_is_case_sensitive() {
        let sel = select_indices(&targets(), FilterMethod::Name, "star_c, star_b");
        assert_eq!(sel.indices, vec![1]);
        assert_eq!(sel.rejected.len(), 1);
    }

    #[test]
    fn test_sort_by_ymm() {
        let mut t = targets();
        sort_by_ymm(&mut t);
        let ids: Vec<&str> = t.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", " 103 "]);
    }
}
