use tracing::info;

use super::missing;
use crate::error::Result;
use crate::external::{ReduceRequest, Toolkit};
use crate::pipeline::config::ScienceConfig;
use crate::pipeline::Stage;
use crate::store::FrameStore;

/// Calibrate one raw science frame and clean cosmic rays.
///
/// Each of bias, dark and flat is applied only when its flag is set. A flag
/// set for a master that does not exist is a precondition failure.
pub fn reduce_science(
    store: &mut FrameStore,
    config: &ScienceConfig,
    tools: &Toolkit<'_>,
) -> Result<()> {
    let no_bias = config.apply_bias && store.bias.is_none();
    let no_dark = config.apply_dark && store.dark.is_none();
    let no_flat = config.apply_flat && store.flat.is_none();
    let frame_id = match &config.frame {
        Some(id) if !(no_bias || no_dark || no_flat) => id,
        _ => {
            return Err(missing(
                Stage::Reduce,
                &[
                    ("science frame", config.frame.is_none()),
                    ("master bias", no_bias),
                    ("master dark", no_dark),
                    ("master flat", no_flat),
                ],
            ))
        }
    };

    let request = ReduceRequest {
        bias: store.bias.as_ref().filter(|_| config.apply_bias),
        dark: store.dark.as_ref().filter(|_| config.apply_dark),
        flat: store.flat.as_ref().filter(|_| config.apply_flat),
        settings: Some(config),
    };
    info!(
        frame = %frame_id,
        bias = request.bias.is_some(),
        dark = request.dark.is_some(),
        flat = request.flat.is_some(),
        cosmic_ray = ?config.cosmic_ray,
        "Reducing science frame"
    );

    let reduced = tools.reducer.reduce(frame_id, &request)?;
    tools.display.show("Reduced science frame", &reduced);
    store.set_reduced(reduced);
    Ok(())
}
