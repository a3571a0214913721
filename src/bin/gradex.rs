//! CLI binary for gradex-batch.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig` plus the mode options, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use gradex_batch::{
    load_rubric, run_export_sync, run_overlay_sync, BatchConfig, BatchProgressCallback, BatchReport,
    ExportOptions, OverlayOptions, PageHistogram, ProgressCallback, TempFilePolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over the scripts of the batch, one log line
/// per finished script, and a page-count histogram fed as scripts complete.
struct CliProgressCallback {
    /// `None` when the bar is disabled; the histogram is still recorded.
    bar: Option<ProgressBar>,
    histogram: Arc<PageHistogram>,
}

impl CliProgressCallback {
    fn new(show_bar: bool, histogram: Arc<PageHistogram>) -> Arc<Self> {
        let bar = show_bar.then(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(SPINNER),
            );
            bar.set_prefix("Scanning");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        Arc::new(Self { bar, histogram })
    }

    fn println(&self, line: String) {
        if let Some(ref bar) = self.bar {
            bar.println(line);
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_jobs: usize) {
        let Some(ref bar) = self.bar else { return };
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} scripts  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER),
        );
        bar.set_length(total_jobs as u64);
        bar.set_prefix("Processing");
        bar.reset_eta();
    }

    fn on_job_start(&self, label: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(label.to_string());
        }
    }

    fn on_job_complete(&self, label: &str, pages: usize) {
        self.histogram.record(pages);
        self.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            label,
            dim(&format!("{pages} pages"))
        ));
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    fn on_job_skipped(&self, label: &str) {
        self.println(format!("  {} {:<24} {}", dim("↷"), label, dim("exists")));
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    fn on_job_error(&self, label: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.println(format!("  {} {:<24} {}", red("✗"), label, red(&msg)));
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    fn on_batch_complete(&self, _total_jobs: usize, _failed: usize) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Overlay the marking spread on every script in input_dir
  gradex overlay --course MATH10001 --marker ABC

  # Second-pass check, discarding intermediate images
  gradex overlay --course MATH10001 --spread check --temp discard \
    --inputdir marked --outputdir checked

  # Export for the grading platform (images + XML)
  gradex export --course MATH10001 --inputdir scans --outputdir export

  # Regenerate only the descriptors
  gradex export --course MATH10001 --xmlonly --redo

ENVIRONMENT VARIABLES:
  GRADEX_*                Every flag, e.g. GRADEX_COURSE, GRADEX_INPUTDIR
  RUST_LOG                Overrides the log filter
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
"#;

/// Batch overlay and export of scanned exam scripts.
#[derive(Parser, Debug)]
#[command(
    name = "gradex",
    version,
    about = "Batch overlay and export of scanned exam scripts",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print the batch report as JSON on stdout.
    #[arg(long, global = true, env = "GRADEX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "GRADEX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "GRADEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the error count.
    #[arg(short, long, global = true, env = "GRADEX_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Overlay a marking spread onto every script.
    Overlay(OverlayArgs),
    /// Export page images and XML descriptors for the grading platform.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Course code, e.g. MATH10001.
    #[arg(long, env = "GRADEX_COURSE", default_value = "MATH00000")]
    course: String,

    /// Folder containing the scripts.
    #[arg(long = "inputdir", env = "GRADEX_INPUTDIR", default_value = "input_dir")]
    input_dir: PathBuf,

    /// Folder for outputs and intermediates.
    #[arg(long = "outputdir", env = "GRADEX_OUTPUTDIR", default_value = "output_dir")]
    output_dir: PathBuf,

    /// Reprocess scripts whose output already exists.
    #[arg(long, env = "GRADEX_REDO")]
    redo: bool,

    /// Upper bound on any single engine call, in seconds.
    #[arg(long, env = "GRADEX_ENGINE_TIMEOUT", default_value_t = 300,
          value_parser = clap::value_parser!(u64).range(1..))]
    engine_timeout: u64,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "GRADEX_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,
}

#[derive(Args, Debug)]
struct OverlayArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Exam diet, e.g. "April 2020".
    #[arg(long, env = "GRADEX_DIET", default_value = "April 2020")]
    diet: String,

    /// Rubric CSV with `part` and `marks` columns.
    #[arg(long, env = "GRADEX_PARTS", default_value = "parts_and_marks.csv")]
    parts: PathBuf,

    /// Marker initials.
    #[arg(long, env = "GRADEX_MARKER", default_value = "")]
    marker: String,

    /// Layout template describing the spreads.
    #[arg(long, env = "GRADEX_LAYOUT", default_value = "som/layout.svg")]
    layout: PathBuf,

    /// Spread to apply: mark, check, scrutiny, …
    #[arg(long, env = "GRADEX_SPREAD", default_value = "mark")]
    spread: String,

    /// Keep or discard intermediate page images and documents.
    #[arg(long, env = "GRADEX_TEMP", value_enum, default_value = "keep")]
    temp: TempArg,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Write descriptors only; skip the page images.
    #[arg(long = "xmlonly", env = "GRADEX_XMLONLY")]
    xml_only: bool,

    /// Scan date for the descriptors (dd/mm/YYYY). Default: today.
    #[arg(long, env = "GRADEX_SCAN_DATE")]
    scan_date: Option<String>,

    /// Scanning centre code.
    #[arg(long, env = "GRADEX_CENTRE", default_value = "UoESoM")]
    centre: String,

    /// Regex extracting the script digits from a file name (group 1).
    #[arg(long, env = "GRADEX_CANDIDATE_PATTERN")]
    candidate_pattern: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TempArg {
    Keep,
    Discard,
}

impl From<TempArg> for TempFilePolicy {
    fn from(v: TempArg) -> Self {
        match v {
            TempArg::Keep => TempFilePolicy::Keep,
            TempArg::Discard => TempFilePolicy::Discard,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────────
    // On the very first run the library is downloaded and cached; later
    // startups only check the cache path.
    if !pdfium_auto::is_pdfium_cached() {
        ensure_pdfium(cli.quiet)?;
    }

    let histogram = Arc::new(PageHistogram::new());
    let progress = CliProgressCallback::new(show_progress, Arc::clone(&histogram));

    // ── Run the batch ────────────────────────────────────────────────────
    let report = match &cli.command {
        Command::Overlay(args) => {
            let config = build_config(&args.common, progress)?
                .exam_diet(args.diet.as_str())
                .marker(args.marker.as_str())
                .temp_files(args.temp.into())
                .build()
                .context("Invalid configuration")?;
            let rubric = load_rubric(&args.parts).context("Failed to load rubric")?;
            let options = OverlayOptions::new(&args.layout, &args.spread).with_rubric(rubric);

            // The sync drivers shut their runtime down without waiting on
            // engine calls that already timed out.
            run_overlay_sync(&config, &options).context("Overlay batch failed")?
        }
        Command::Export(args) => {
            let config = build_config(&args.common, progress)?
                .build()
                .context("Invalid configuration")?;
            let options = build_export_options(args)?;

            run_export_sync(&config, &options).context("Export batch failed")?
        }
    };

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &histogram);
    }

    // The error count is printed even in quiet mode.
    let errors = report.error_count();
    eprintln!(
        "{} errors",
        if errors == 0 {
            green(&errors.to_string())
        } else {
            red(&errors.to_string())
        }
    );

    Ok(if errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Download the pdfium library, with a byte-progress bar unless quiet.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if quiet {
        pdfium_auto::ensure_pdfium_library(None).context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
        if let Some(t) = total {
            if bar.length().unwrap_or(0) != t {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    }))
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

/// Map the shared flags onto a builder; the caller adds mode-specific ones.
fn build_config(
    args: &CommonArgs,
    progress: Arc<CliProgressCallback>,
) -> Result<gradex_batch::BatchConfigBuilder> {
    Ok(BatchConfig::builder()
        .input_dir(&args.input_dir)
        .output_dir(&args.output_dir)
        .course_code(args.course.as_str())
        .force_redo(args.redo)
        .engine_timeout_secs(args.engine_timeout)
        .dpi(args.dpi)
        .progress_callback(progress as ProgressCallback))
}

fn build_export_options(args: &ExportArgs) -> Result<ExportOptions> {
    let mut options = ExportOptions {
        xml_only: args.xml_only,
        centre: args.centre.clone(),
        ..ExportOptions::default()
    };

    if let Some(ref date) = args.scan_date {
        chrono::NaiveDate::parse_from_str(date, "%d/%m/%Y")
            .with_context(|| format!("Scan date '{date}' is not dd/mm/YYYY"))?;
        options.scan_date = date.clone();
    }

    if let Some(ref pattern) = args.candidate_pattern {
        options = options
            .with_candidate_pattern(pattern)
            .context("Invalid candidate pattern")?;
    }

    Ok(options)
}

fn print_summary(report: &BatchReport, histogram: &PageHistogram) {
    let s = &report.stats;
    eprintln!(
        "{}  {} done, {} skipped, {} failed  {} pages  {}ms  ({} workers)",
        if s.failed == 0 { green("✔") } else { red("✘") },
        bold(&s.done.to_string()),
        s.skipped,
        s.failed,
        s.total_pages,
        s.total_duration_ms,
        s.workers,
    );
    if let Some(max) = s.max_pages {
        eprintln!("   Maximum page length: {}", bold(&max.to_string()));
    }
    for job in report.failures() {
        if let Some(ref e) = job.error {
            eprintln!("   {} {}: {}", red("✗"), job.input, e);
        }
    }
    if histogram.total() > 0 {
        eprintln!();
        eprint!("{}", histogram.render(40));
    }
}
