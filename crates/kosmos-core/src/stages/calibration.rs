//! Master bias, dark, flat and arc frames.
//!
//! Dark can subtract the master bias; flat can apply both. When a config asks
//! for a master that does not exist yet the stage refuses rather than
//! combining without it.

use tracing::info;

use super::missing;
use crate::error::{ReductionError, Result};
use crate::external::Toolkit;
use crate::frame::FrameList;
use crate::pipeline::config::{ArcConfig, BiasConfig, DarkConfig, FlatConfig};
use crate::pipeline::Stage;
use crate::store::{FrameStore, MasterKind};

fn require_frames(stage: Stage, frames: &FrameList) -> Result<()> {
    if frames.is_empty() {
        return Err(ReductionError::EmptyFrameList { stage });
    }
    Ok(())
}

pub fn compute_bias(store: &mut FrameStore, config: &BiasConfig, tools: &Toolkit<'_>) -> Result<()> {
    require_frames(Stage::Bias, &config.frames)?;
    info!(
        frames = config.frames.len(),
        method = %config.combine.method,
        "Combining bias frames"
    );

    let bias = tools.reducer.mkbias(&config.frames, &config.combine)?;
    tools.display.show("Master bias", &bias);
    store.set_master(MasterKind::Bias, bias);
    Ok(())
}

pub fn compute_dark(store: &mut FrameStore, config: &DarkConfig, tools: &Toolkit<'_>) -> Result<()> {
    require_frames(Stage::Dark, &config.frames)?;
    if config.apply_bias && store.bias.is_none() {
        return Err(missing(Stage::Dark, &[("master bias", true)]));
    }
    let bias = if config.apply_bias { store.bias.as_ref() } else { None };
    info!(
        frames = config.frames.len(),
        method = %config.combine.method,
        bias = bias.is_some(),
        clip = ?config.clip,
        "Combining dark frames"
    );

    let dark = tools.reducer.mkdark(&config.frames, bias, config)?;
    tools.display.show("Master dark", &dark);
    store.set_master(MasterKind::Dark, dark);
    Ok(())
}

pub fn compute_flat(store: &mut FrameStore, config: &FlatConfig, tools: &Toolkit<'_>) -> Result<()> {
    require_frames(Stage::Flat, &config.frames)?;
    let no_bias = config.apply_bias && store.bias.is_none();
    let no_dark = config.apply_dark && store.dark.is_none();
    if no_bias || no_dark {
        return Err(missing(
            Stage::Flat,
            &[("master bias", no_bias), ("master dark", no_dark)],
        ));
    }
    let bias = if config.apply_bias { store.bias.as_ref() } else { None };
    let dark = if config.apply_dark { store.dark.as_ref() } else { None };
    info!(
        frames = config.frames.len(),
        method = %config.combine.method,
        spectral = config.spectral,
        width = config.width,
        sn_min = config.sn_min,
        "Combining flat frames"
    );

    let flat = tools.reducer.mkflat(&config.frames, bias, dark, config)?;
    tools.display.show("Master flat", &flat);
    store.set_master(MasterKind::Flat, flat);
    Ok(())
}

/// Arc lamps are summed with no calibration applied.
pub fn compute_arcs(store: &mut FrameStore, config: &ArcConfig, tools: &Toolkit<'_>) -> Result<()> {
    require_frames(Stage::Arc, &config.frames)?;
    info!(frames = config.frames.len(), "Summing arc frames");

    let arc = tools.reducer.sum(&config.frames)?;
    tools.display.show("Summed arcs", &arc);
    store.set_master(MasterKind::Arc, arc);
    Ok(())
}
