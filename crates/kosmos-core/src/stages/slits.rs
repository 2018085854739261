use tracing::{info, warn};

use super::missing;
use crate::error::{ReductionError, Result};
use crate::external::{ReduceRequest, Toolkit};
use crate::frame::{KEY_TARGET_ID, KEY_XMM, KEY_YMM};
use crate::pipeline::config::{CutoutConfig, FilterConfig, SlitsConfig};
use crate::pipeline::Stage;
use crate::store::FrameStore;
use crate::target::{select_indices, sort_by_ymm, Selection, Target};

/// Edge and target counts from one `find_slits` run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlitDiscovery {
    pub bottom: usize,
    pub top: usize,
    pub targets: usize,
}

impl SlitDiscovery {
    /// Slits with both edges found.
    pub fn slits(&self) -> usize {
        self.bottom.min(self.top)
    }

    pub fn is_consistent(&self) -> bool {
        self.bottom == self.top && self.top == self.targets
    }

    /// `"{slits} vs {targets}"` when the counts disagree.
    pub fn mismatch(&self) -> Option<String> {
        (!self.is_consistent()).then(|| format!("{} vs {}", self.slits(), self.targets))
    }
}

/// Fit slit edges on the configured flat and load the design-file targets,
/// sorted by mask Y. Both are stored as the full and working copies.
///
/// A count mismatch is a warning unless `strict_count` is set, in which case
/// nothing is stored.
pub fn find_slits(
    store: &mut FrameStore,
    config: &SlitsConfig,
    tools: &Toolkit<'_>,
) -> Result<SlitDiscovery> {
    let (Some(flat_id), Some(design_file)) = (&config.flat, &config.design_file) else {
        return Err(missing(
            Stage::FindSlits,
            &[
                ("flat frame", config.flat.is_none()),
                ("design file", config.design_file.is_none()),
            ],
        ));
    };

    let flat = tools
        .reducer
        .reduce(flat_id, &ReduceRequest::uncalibrated())?;
    let edges = tools.tracer.find_slits(&flat, config)?;
    let mut targets = tools.design.read_targets(design_file)?;
    sort_by_ymm(&mut targets);

    let discovery = SlitDiscovery {
        bottom: edges.bottom.len(),
        top: edges.top.len(),
        targets: targets.len(),
    };
    if let Some(counts) = discovery.mismatch() {
        if config.strict_count {
            return Err(ReductionError::CardinalityMismatch {
                traces: edges.trace.len(),
                targets: targets.len(),
            });
        }
        warn!(
            bottom = discovery.bottom,
            top = discovery.top,
            "Number of slits does not match number of targets: {counts}"
        );
    }

    info!(
        slits = discovery.slits(),
        targets = discovery.targets,
        flat = %flat_id,
        "Found slits"
    );
    store.set_slits(edges.trace, targets);
    Ok(discovery)
}

/// Select a working subset from the full slit list.
///
/// Always filters from the full copies, so a second call replaces the first
/// rather than narrowing it. When nothing matches the current selection is
/// kept.
pub fn filter_targets(store: &mut FrameStore, config: &FilterConfig) -> Result<Selection> {
    let (Some(full_trace), Some(full_targets)) = (&store.full_trace, &store.full_targets) else {
        return Err(missing(
            Stage::FilterTargets,
            &[
                ("slit trace", store.full_trace.is_none()),
                ("targets", store.full_targets.is_none()),
            ],
        ));
    };

    let selection = select_indices(full_targets, config.method, &config.values);
    for reason in &selection.rejected {
        warn!(method = %config.method, "{reason}");
    }
    if selection.indices.is_empty() {
        warn!(
            method = %config.method,
            values = %config.values,
            "No targets matched, selection unchanged"
        );
        return Ok(selection);
    }

    let trace = full_trace.select(&selection.indices);
    let targets: Vec<Target> = selection
        .indices
        .iter()
        .map(|&i| full_targets[i].clone())
        .collect();
    info!(
        selected = targets.len(),
        total = full_targets.len(),
        method = %config.method,
        "Filtered targets"
    );
    store.set_selection(trace, targets);
    Ok(selection)
}

/// Restore the full slit list.
pub fn reset_filter(store: &mut FrameStore) -> Result<()> {
    if !store.reset_selection() {
        return Err(missing(
            Stage::FilterTargets,
            &[
                ("slit trace", store.full_trace.is_none()),
                ("targets", store.full_targets.is_none()),
            ],
        ));
    }
    info!("Target selection reset");
    Ok(())
}

/// Cut one arc slitlet per working target and stamp it with the target's
/// mask coordinates. Returns the number of cutouts.
pub fn update_arc_headers(store: &mut FrameStore, tools: &Toolkit<'_>) -> Result<usize> {
    let (Some(trace), Some(arc), Some(targets)) = (&store.trace, &store.arc, &store.targets) else {
        return Err(missing(
            Stage::ArcHeaders,
            &[
                ("slit trace", store.trace.is_none()),
                ("master arc", store.arc.is_none()),
                ("targets", store.targets.is_none()),
            ],
        ));
    };

    let mut cutouts = tools
        .tracer
        .extract2d(arc, trace, &CutoutConfig::default())?;
    if cutouts.len() != targets.len() {
        warn!(
            cutouts = cutouts.len(),
            targets = targets.len(),
            "Arc cutouts and targets differ in number"
        );
    }
    for (cutout, target) in cutouts.iter_mut().zip(targets) {
        cutout.header.set(KEY_XMM, target.xmm);
        cutout.header.set(KEY_YMM, target.ymm);
        cutout.header.set(KEY_TARGET_ID, target.id.trim());
    }

    let count = cutouts.len();
    info!(cutouts = count, "Arc headers updated");
    store.set_arc_cutouts(cutouts);
    Ok(count)
}
