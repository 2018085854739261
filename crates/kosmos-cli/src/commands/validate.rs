use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use kosmos_core::pipeline::config::ReductionConfig;
use tracing::info;

use crate::summary::print_config_summary;

#[derive(Args)]
pub struct ValidateArgs {
    /// Reduction config file (TOML)
    pub config: PathBuf,

    /// Fail when any stage is missing its inputs
    #[arg(long)]
    pub strict: bool,
}

/// Inputs each stage needs from the config alone.
pub fn missing_inputs(config: &ReductionConfig) -> Vec<&'static str> {
    let checks = [
        ("bias frames", config.bias.frames.is_empty()),
        ("dark frames", config.dark.frames.is_empty()),
        ("flat frames", config.flat.frames.is_empty()),
        ("arc frames", config.arc.frames.is_empty()),
        ("slit flat frame", config.slits.flat.is_none()),
        ("design file", config.slits.design_file.is_none()),
        ("science frame", config.science.frame.is_none()),
    ];
    checks
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(name, _)| name)
        .collect()
}

pub fn run(args: &ValidateArgs) -> Result<()> {
    let config = super::load_config(&args.config)?;
    info!(path = %args.config.display(), "Loaded config");
    let missing = missing_inputs(&config);
    print_config_summary(&config, &missing);

    if args.strict && !missing.is_empty() {
        bail!("Config is missing: {}", missing.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use kosmos_core::frame::{FrameId, FrameList};

    use super::*;

    #[test]
    fn test_default_config_misses_every_input() {
        assert_eq!(missing_inputs(&ReductionConfig::default()).len(), 7);
    }

    #[test]
    fn test_complete_config() {
        let mut config = ReductionConfig::default();
        config.bias.frames = FrameList::from(vec![1, 2]);
        config.dark.frames = FrameList::from(vec![3]);
        config.flat.frames = FrameList::from(vec![4]);
        config.arc.frames = FrameList::from(vec![5]);
        config.slits.flat = Some(FrameId::Number(4));
        config.slits.design_file = Some(PathBuf::from("mask.txt"));
        config.science.frame = Some(FrameId::Number(8));
        assert!(missing_inputs(&config).is_empty());
    }
}
