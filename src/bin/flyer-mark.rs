use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use flyer_mark_removal::config::DEFAULT_SCALES;
use flyer_mark_removal::{default_output_path, DetectionConfig, ProcessResult, RemovalEngine};

#[derive(Parser)]
#[command(
    name = "flyer-mark",
    about = "Find the logo and bottom ribbon in flyer images and erase them",
    version,
    after_help = "Simple usage: flyer-mark --logo logo.png --ribbon ribbon.png -i flyer.jpg\n\n\
                  Logos are inpainted; the ribbon is painted white. Without --ribbon only\n\
                  the logo is removed."
)]
struct Cli {
    /// Logo template image
    #[arg(long)]
    logo: PathBuf,

    /// Bottom ribbon template image
    #[arg(long)]
    ribbon: Option<PathBuf>,

    /// Input image file or directory
    #[arg(short, long)]
    input: PathBuf,

    /// Output file or directory (default: {name}_cleaned.{ext})
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Logo matching threshold (higher = stricter)
    #[arg(short, long, default_value = "0.7")]
    threshold: f32,

    /// Ribbon matching threshold
    #[arg(long, default_value = "0.6")]
    ribbon_threshold: f32,

    /// Inpainting radius in pixels
    #[arg(long, default_value = "5")]
    inpaint_radius: u32,

    /// Comma-separated logo scale factors
    #[arg(long, value_delimiter = ',')]
    scales: Option<Vec<f32>>,

    /// Padding around each logo match, in pixels
    #[arg(long, default_value = "4")]
    padding: u32,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = DetectionConfig {
        logo_threshold: cli.threshold,
        ribbon_threshold: cli.ribbon_threshold,
        scales: cli.scales.clone().unwrap_or_else(|| DEFAULT_SCALES.to_vec()),
        padding: cli.padding,
        inpaint_radius: cli.inpaint_radius,
        ..DetectionConfig::default()
    };

    let engine = match RemovalEngine::from_paths(&cli.logo, cli.ribbon.as_deref(), config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: {e}");
            process::exit(1);
        }
    };

    let input_path = cli.input.as_path();
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", input_path.display());
        process::exit(1);
    }

    let results = if input_path.is_dir() {
        let Some(output_dir) = &cli.output else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: flyer-mark --logo <logo> -i <input_dir> -o <output_dir>");
            process::exit(1);
        };
        match engine.process_directory(input_path, output_dir) {
            Ok(results) => results,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    } else {
        let output_path = cli
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(input_path));
        vec![engine.process_file(input_path, &output_path)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &cli);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Cleaned: {success_count}");
        if skip_count > 0 {
            eprint!(", Unchanged: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, cli: &Cli) {
    if cli.quiet && result.success {
        return;
    }

    let filename = file_label(&result.path);

    if result.skipped {
        eprintln!("[SKIP] {filename}: {}", result.message);
    } else if result.success {
        eprintln!("[OK] {filename}: {}", result.message);
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if cli.verbose {
        if let Some(report) = &result.report {
            for m in &report.logo_matches {
                eprintln!(
                    "  -> logo at ({}, {}) {}x{} scale {} score {:.3}",
                    m.x, m.y, m.width, m.height, m.scale, m.score
                );
            }
        }
    }
}

fn file_label(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
