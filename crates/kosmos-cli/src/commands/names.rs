use anyhow::{bail, Result};
use clap::Args;
use kosmos_core::consts::DEFAULT_EXTRACTION_RADIUS;
use kosmos_core::naming::{adjusted_2d_name, spec1d_name, unadjusted_2d_name, SolutionKey, Spec1dKind};

use crate::summary::{print_product_names, ProductNames};

#[derive(Args)]
pub struct NamesArgs {
    /// Object name from the frame header (OBJNAME)
    pub object: String,

    /// Target IDs, in working slit order
    #[arg(required = true)]
    pub target_ids: Vec<String>,

    /// Product name (raw file stem); defaults to the object name
    #[arg(long)]
    pub product: Option<String>,

    /// Aperture radius used in 1D product names
    #[arg(long, default_value_t = DEFAULT_EXTRACTION_RADIUS)]
    pub radius: usize,
}

pub fn product_names(args: &NamesArgs) -> Result<Vec<ProductNames>> {
    let object = args.object.trim();
    if object.is_empty() {
        bail!("Object name is empty");
    }
    let product = args.product.as_deref().unwrap_or(object);

    Ok(args
        .target_ids
        .iter()
        .map(|id| id.trim())
        .enumerate()
        .map(|(index, id)| ProductNames {
            index,
            target_id: id.to_string(),
            solution: SolutionKey::new(object, id).file_name(),
            spec2d: adjusted_2d_name(product, id),
            spec2d_unadjusted: unadjusted_2d_name(product, id),
            spec1d_arc: spec1d_name(Spec1dKind::ArcOnly, args.radius, product, id, index),
            spec1d: spec1d_name(Spec1dKind::FromSpec2d, args.radius, product, id, index),
            spec1d_sky: spec1d_name(Spec1dKind::SkyAdjusted, args.radius, product, id, index),
        })
        .collect())
}

pub fn run(args: &NamesArgs) -> Result<()> {
    let names = product_names(args)?;
    print_product_names(&args.object, &names);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_follow_slit_order() {
        let args = NamesArgs {
            object: "M5".to_string(),
            target_ids: vec!["42".to_string(), " 7 ".to_string()],
            product: Some("M5real".to_string()),
            radius: 8,
        };
        let names = product_names(&args).unwrap();
        assert_eq!(names[1].solution, "CofIwav_M5_7.fits");
        assert_eq!(names[1].spec2d, "M5real_7_2d.fits");
        assert_eq!(names[1].spec1d, "2d_ad_8_M5real_7_1.fits");
        assert_eq!(names[0].spec1d_sky, "1d_ad_8_M5real_42_0.fits");
        assert_eq!(names[0].spec1d_arc, "not_ad_8_M5real_42_0.fits");
    }

    #[test]
    fn test_blank_object_rejected() {
        let args = NamesArgs {
            object: "  ".to_string(),
            target_ids: vec!["1".to_string()],
            product: None,
            radius: 5,
        };
        assert!(product_names(&args).is_err());
    }
}
