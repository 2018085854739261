use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use kosmos_core::frame::FrameId;
use kosmos_core::pipeline::config::ReductionConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a full default ReductionConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let mut config = ReductionConfig {
        data_dir: Some(PathBuf::from("data")),
        ..Default::default()
    };
    config.slits.design_file = Some(PathBuf::from("mask_design.txt"));
    config.science.frame = Some(FrameId::Name("object.0001.fits".to_string()));

    super::write_config(&config, args.output.as_deref())
}
