//! keyout: batch background removal from the command line.
//!
//! Runs every input image through the removal pipeline, writes the
//! result as PNG next to each other in the output directory, and prints
//! per-stage diagnostics. Useful for:
//!
//! - Tuning thresholds and cleanup radii before using them interactively
//! - Processing a folder of product shots with one set of settings
//! - Measuring per-stage durations on large images
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin keyout -- [OPTIONS] <IMAGES>...
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for per-stage
//! timing as it happens.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use keyout_engine::settings::{MinRegionSize, PickedColor, RemovalMode};
use keyout_engine::{
    BatchEvent, BatchOutcome, BatchRunner, CancelToken, Color, EditorSettings, ImageItem, ItemStatus,
    PipelineDiagnostics, PipelineWarning,
};
use serde::Serialize;

/// Remove backgrounds and solid colors from raster images.
///
/// Each input is keyed, cleaned up, and written to the output directory
/// as `<name>_processed.png` (or `<name>_trimmed.png` with `--trim`).
#[derive(Parser)]
#[command(name = "keyout", version)]
struct Cli {
    /// Input images (PNG, JPEG, GIF, WebP).
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory for the output PNGs.
    #[arg(long, short, default_value = ".")]
    out_dir: PathBuf,

    /// How the key color is chosen.
    #[arg(long, value_enum, default_value_t = Mode::Auto)]
    mode: Mode,

    /// Key color in manual mode (`#rrggbb` or `#rgb`).
    #[arg(long, default_value = "#ffffff")]
    target_color: Color,

    /// Color tolerance, 1-100.
    #[arg(long, default_value_t = 30)]
    threshold: u8,

    /// Extra key color with its own tolerance, as `#rrggbb:threshold`.
    /// Repeatable; manual mode only.
    #[arg(long = "pick", value_parser = parse_pick)]
    picks: Vec<PickedColor>,

    /// Only remove matches connected to the image border.
    #[arg(long)]
    contiguous: bool,

    /// Fill transparent holes smaller than this many pixels.
    #[arg(long)]
    min_region_size: Option<u32>,

    /// Feather the alpha edge over this many pixels.
    #[arg(long)]
    feather: Option<u8>,

    /// Erode the alpha edge by this many pixels.
    #[arg(long)]
    erode: Option<u8>,

    /// Remove opaque islands of at most this many pixels.
    #[arg(long)]
    remove_specks: Option<u32>,

    /// Crop each output to its visible content.
    #[arg(long)]
    trim: bool,

    /// Bake this background color into the output.
    #[arg(long)]
    background: Option<Color>,

    /// Pause between images, in milliseconds.
    #[arg(long, default_value_t = 0)]
    settle_ms: u64,

    /// Output a JSON summary instead of human-readable reports.
    #[arg(long)]
    json: bool,

    /// Full editor settings as a JSON string.
    ///
    /// When provided, all other settings flags are ignored.
    #[arg(long)]
    settings_json: Option<String>,
}

/// Key color selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Key on the top-left pixel.
    Auto,
    /// Key on `--target-color` plus any `--pick` colors.
    Manual,
}

fn parse_pick(s: &str) -> Result<PickedColor, String> {
    let (color, threshold) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected COLOR:THRESHOLD, got {s:?}"))?;
    Ok(PickedColor {
        color: color.parse().map_err(|e| format!("{e}"))?,
        threshold: threshold.parse().map_err(|e| format!("bad threshold {threshold:?}: {e}"))?,
    })
}

/// Build [`EditorSettings`] from CLI arguments.
///
/// If `--settings-json` is provided, the JSON is parsed directly and all
/// individual settings flags are ignored.
fn settings_from_cli(cli: &Cli) -> Result<EditorSettings, String> {
    if let Some(ref json) = cli.settings_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --settings-json: {e}"));
    }

    let mut settings = EditorSettings::default();

    let cr = &mut settings.color_removal;
    cr.mode = match cli.mode {
        Mode::Auto => RemovalMode::Auto,
        Mode::Manual => RemovalMode::Manual,
    };
    cr.target_color = cli.target_color;
    cr.threshold = cli.threshold;
    cr.contiguous = cli.contiguous;
    cr.picked_colors.clone_from(&cli.picks);
    if let Some(value) = cli.min_region_size {
        cr.min_region_size = MinRegionSize { enabled: true, value };
    }

    if let Some(radius) = cli.feather {
        settings.edge_cleanup.enabled = true;
        settings.edge_cleanup.trim_radius = radius;
    }
    if let Some(radius) = cli.erode {
        settings.edge_cleanup.legacy_enabled = true;
        settings.edge_cleanup.legacy_radius = radius;
    }

    if let Some(size) = cli.remove_specks {
        settings.speckle.enabled = true;
        settings.speckle.min_speck_size = size;
        settings.speckle.set_remove_specks(true);
    }

    settings.effects.download.trim_transparent_pixels = cli.trim;
    if let Some(color) = cli.background {
        settings.effects.background.enabled = true;
        settings.effects.background.save_with_background = true;
        settings.effects.background.color = color;
    }

    Ok(settings)
}

/// Per-image line of the JSON summary.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageReport<'a> {
    name: &'a str,
    status: &'a ItemStatus,
    output: Option<PathBuf>,
    warnings: &'a [PipelineWarning],
    diagnostics: Option<&'a PipelineDiagnostics>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings = match settings_from_cli(&cli) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let runner = match BatchRunner::new(settings) {
        Ok(r) => r.with_settle(Duration::from_millis(cli.settle_ms)),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&cli.out_dir) {
        eprintln!("Error creating {}: {e}", cli.out_dir.display());
        return ExitCode::FAILURE;
    }

    let mut unreadable = 0;
    let mut items = Vec::with_capacity(cli.images.len());
    for (id, path) in (0u64..).zip(&cli.images) {
        match std::fs::read(path) {
            Ok(bytes) => items.push(ImageItem::new(id, display_name(path), bytes)),
            Err(e) => {
                log::error!("Error reading {}: {e}", path.display());
                unreadable += 1;
            }
        }
    }

    let outcome = runner.run(&mut items, &CancelToken::new(), |event| {
        if let BatchEvent::Failed { id, message } = &event {
            log::error!("image {id}: {message}");
        } else {
            log::debug!("{event:?}");
        }
    });

    let mut write_failures = 0;
    let mut reports = Vec::with_capacity(items.len());
    for item in &items {
        let output = item
            .processed()
            .and_then(|processed| match write_output(&cli.out_dir, item.name(), processed, runner.settings()) {
                Ok(path) => Some(path),
                Err(msg) => {
                    log::error!("{msg}");
                    write_failures += 1;
                    None
                }
            });
        if !cli.json {
            print_item(item, output.as_deref());
        }
        reports.push(ImageReport {
            name: item.name(),
            status: item.status(),
            output,
            warnings: item.warnings(),
            diagnostics: item.diagnostics(),
        });
    }

    if cli.json {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing summary: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let summary = outcome.summary();
    eprintln!(
        "{} succeeded, {} failed, {} unreadable, {} not written",
        summary.succeeded, summary.failed, unreadable, write_failures,
    );
    if matches!(outcome, BatchOutcome::Completed(_)) && summary.failed == 0 && unreadable == 0 && write_failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

fn write_output(
    out_dir: &Path,
    name: &str,
    processed: &keyout_engine::RgbaImage,
    settings: &EditorSettings,
) -> Result<PathBuf, String> {
    let export = keyout_export::export(processed, name, &settings.effects).map_err(|e| format!("{name}: {e}"))?;
    let path = out_dir.join(&export.filename);
    std::fs::write(&path, &export.png).map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    log::info!(
        "{} written ({}x{}, {} bytes)",
        path.display(),
        export.width,
        export.height,
        export.png.len()
    );
    Ok(path)
}

fn print_item(item: &ImageItem, output: Option<&Path>) {
    println!("{}", item.name());
    match item.status() {
        ItemStatus::Error(message) => println!("  error: {message}"),
        status => {
            if let Some(path) = output {
                println!("  -> {}", path.display());
            } else {
                println!("  {status:?}");
            }
        }
    }
    for warning in item.warnings() {
        println!("  warning: {warning}");
    }
    if let Some(diagnostics) = item.diagnostics() {
        println!("{}", diagnostics.report());
    }
    println!();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pick_parses_color_and_threshold() {
        let pick = parse_pick("#00ff00:25").unwrap();
        assert_eq!(pick.color, Color::new(0, 255, 0));
        assert_eq!(pick.threshold, 25);
        assert!(parse_pick("#00ff00").is_err());
        assert!(parse_pick("#00ff00:lots").is_err());
    }

    #[test]
    fn flags_map_onto_settings() {
        let cli = Cli::parse_from([
            "keyout",
            "--mode",
            "manual",
            "--pick",
            "#112233:10",
            "--contiguous",
            "--feather",
            "3",
            "--remove-specks",
            "12",
            "--background",
            "#000",
            "--trim",
            "in.png",
        ]);
        let settings = settings_from_cli(&cli).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.color_removal.mode, RemovalMode::Manual);
        assert!(settings.color_removal.contiguous);
        assert_eq!(settings.color_removal.picked_colors.len(), 1);
        assert_eq!(settings.edge_cleanup.trim_radius, 3);
        assert!(settings.speckle.remove_specks());
        assert!(settings.effects.background.save_with_background);
        assert_eq!(settings.effects.background.color, Color::BLACK);
        assert!(settings.effects.download.trim_transparent_pixels);
    }

    #[test]
    fn settings_json_overrides_flags() {
        let json = serde_json::to_string(&EditorSettings::default()).unwrap();
        let cli = Cli::parse_from(["keyout", "--threshold", "99", "--settings-json", &json, "in.png"]);
        assert_eq!(settings_from_cli(&cli).unwrap(), EditorSettings::default());
    }
}
