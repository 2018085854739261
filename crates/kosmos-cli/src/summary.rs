use anyhow::Result;
use console::Style;
use kosmos_core::frame::FrameList;
use kosmos_core::pipeline::config::{CombineSettings, ReductionConfig};
use kosmos_core::pipeline::Stage;
use kosmos_core::session::{LogEntry, RestoreReport};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!(
        "  {}",
        s.title.apply_to("\u{2550}".repeat(title.chars().count()))
    );
    println!();
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn print_frames(s: &Styles, label: &str, frames: &FrameList) {
    if frames.is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to(label),
            s.disabled.apply_to("none")
        );
    } else {
        println!(
            "    {:<12}{} {}",
            s.label.apply_to(label),
            s.value.apply_to(frames),
            s.label.apply_to(format!("({})", frames.len()))
        );
    }
}

fn print_combine(s: &Styles, combine: &CombineSettings) {
    println!(
        "    {:<12}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(combine.method)
    );
}

pub fn print_config_summary(config: &ReductionConfig, missing: &[&str]) {
    let s = Styles::new();
    print_title(&s, "KOSMOS Reduction");

    // Folders
    if let Some(ref data_dir) = config.data_dir {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Data"),
            s.path.apply_to(data_dir.display())
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Products"),
        s.path.apply_to(config.work_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Logs"),
        s.path.apply_to(config.log_dir.display())
    );
    println!();

    // Calibration
    println!("  {}", s.header.apply_to("Calibration"));
    print_frames(&s, "Bias", &config.bias.frames);
    print_combine(&s, &config.bias.combine);
    print_frames(&s, "Dark", &config.dark.frames);
    print_frames(&s, "Flat", &config.flat.frames);
    println!(
        "    {:<12}{}",
        s.label.apply_to("Spectral"),
        s.value.apply_to(yes_no(config.flat.spectral))
    );
    print_frames(&s, "Arcs", &config.arc.frames);
    println!();

    // Slits
    println!("  {}", s.header.apply_to("Slits & Targets"));
    match &config.slits.design_file {
        Some(path) => println!(
            "    {:<12}{}",
            s.label.apply_to("Design"),
            s.path.apply_to(path.display())
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Design"),
            s.disabled.apply_to("not set")
        ),
    }
    if config.filter.values.trim().is_empty() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Filter"),
            s.disabled.apply_to("all targets")
        );
    } else {
        println!(
            "    {:<12}{} {}",
            s.label.apply_to("Filter"),
            s.method.apply_to(config.filter.method),
            s.value.apply_to(&config.filter.values)
        );
    }
    println!();

    // Science
    println!("  {}", s.header.apply_to("Science & Extraction"));
    match &config.science.frame {
        Some(frame) => println!(
            "    {:<12}{}",
            s.label.apply_to("Frame"),
            s.value.apply_to(frame)
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Frame"),
            s.disabled.apply_to("not set")
        ),
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Calibrate"),
        s.value.apply_to(format!(
            "bias {}, dark {}, flat {}",
            yes_no(config.science.apply_bias),
            yes_no(config.science.apply_dark),
            yes_no(config.science.apply_flat)
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Cosmic rays"),
        s.method.apply_to(format!("{:?}", config.science.cosmic_ray))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Lamp"),
        s.path.apply_to(config.wavecal.lamp_spectrum.display())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Shift mult"),
        s.value.apply_to(config.wavecal.shift_multiplier)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("2D adjust"),
        s.value.apply_to(if config.extract2d.adjust {
            format!("sky lines, radius {}", config.extract2d.exclusion_radius)
        } else {
            "arc solution only".to_string()
        })
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("1D radius"),
        s.value.apply_to(format!(
            "{} px, sky gap {}",
            config.extract1d.radius, config.extract1d.sky_gap
        ))
    );
    println!();

    if missing.is_empty() {
        println!("  {}", s.method.apply_to("All stage inputs set"));
    } else {
        println!("  {}", s.header.apply_to("Missing"));
        for item in missing {
            println!("    {}", s.disabled.apply_to(item));
        }
    }
    println!();
}

pub fn print_log_entry(entry: &LogEntry) -> Result<()> {
    let s = Styles::new();
    println!(
        "{} {} {}",
        s.label.apply_to(&entry.timestamp),
        s.header.apply_to(format!("[{}]", entry.tab)),
        s.value.apply_to(&entry.action)
    );
    if !entry.parameters.is_empty() {
        let json = serde_json::to_string_pretty(&entry.parameters)?;
        for line in json.lines() {
            println!("    {line}");
        }
    }
    Ok(())
}

/// Restore notes go to stderr when stdout carries the restored TOML.
pub fn print_restore_report(report: &RestoreReport, stdout: bool) {
    let s = Styles::new();
    let applied: Vec<String> = report.applied.iter().map(ToString::to_string).collect();
    let mut lines = vec![format!(
        "{} {}",
        s.header.apply_to("Restored"),
        s.value.apply_to(if applied.is_empty() {
            "nothing".to_string()
        } else {
            applied.join(", ")
        })
    )];
    lines.extend(
        report
            .skipped
            .iter()
            .map(|note| format!("  {}", s.disabled.apply_to(note))),
    );

    for line in lines {
        if stdout {
            println!("{line}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// File names one target's products are written under.
pub struct ProductNames {
    pub index: usize,
    pub target_id: String,
    pub solution: String,
    pub spec2d: String,
    pub spec2d_unadjusted: String,
    pub spec1d_arc: String,
    pub spec1d: String,
    pub spec1d_sky: String,
}

pub fn print_product_names(object: &str, names: &[ProductNames]) {
    let s = Styles::new();
    print_title(&s, &format!("Products for {object}"));

    for n in names {
        println!(
            "  {} {}",
            s.header.apply_to(format!("Slit {}", n.index)),
            s.value.apply_to(&n.target_id)
        );
        for (label, name) in [
            ("Solution", &n.solution),
            ("2D", &n.spec2d),
            ("2D (arc)", &n.spec2d_unadjusted),
            ("1D (arc)", &n.spec1d_arc),
            ("1D", &n.spec1d),
            ("1D (sky)", &n.spec1d_sky),
        ] {
            println!("    {:<12}{}", s.label.apply_to(label), s.path.apply_to(name));
        }
    }
    println!();
}

pub fn print_stages() {
    let s = Styles::new();
    print_title(&s, "Reduction Stages");

    let mut tab = "";
    for (i, stage) in Stage::ALL.into_iter().enumerate() {
        if stage.tab() != tab {
            tab = stage.tab();
            println!("  {}", s.header.apply_to(tab));
        }
        println!(
            "    {}. {:<14}{}",
            s.label.apply_to(i + 1),
            s.value.apply_to(stage),
            s.method.apply_to(stage.action())
        );
    }
    println!();
}
