//! CLI binary for docstitch.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AssemblyConfig` and requests, and writes the resulting PDF.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use docstitch::{
    assemble_sections, render_document, AssemblyConfig, AssemblyError, AssemblyOutput,
    AssemblyProgressCallback, AssemblyRequest, DocumentRequest, DocumentResponse, ImageSpec,
    ProgressCallback,
};
use docstitch::pipeline::encode::encode_pdf;
use docstitch::write_atomic;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Live progress bar over the dynamic sections. Sections finish out of order,
/// so start times are tracked per section name.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning sections…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, name: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(name))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AssemblyProgressCallback for CliProgressCallback {
    fn on_assembly_start(&self, dynamic_sections: usize, static_sections: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} sections  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(dynamic_sections as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
        self.bar.println(format!(
            "{} {}",
            bold("◆"),
            bold(&format!(
                "{dynamic_sections} dynamic + {static_sections} static sections"
            ))
        ));
    }

    fn on_section_start(&self, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(name.to_string(), Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_section_complete(&self, name: &str, pdf_len: usize) {
        let secs = self.elapsed_secs(name);
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            name,
            dim(&format!("{:>8} bytes", pdf_len)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_section_error(&self, name: &str, error: &str) {
        let secs = self.elapsed_secs(name);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_assembly_complete(&self, total_sections: usize, merged_sections: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {}/{} sections merged",
                green("✔"),
                bold(&merged_sections.to_string()),
                total_sections
            );
        } else {
            eprintln!(
                "{} {}/{} sections merged  ({} failed)",
                yellow("⚠"),
                bold(&merged_sections.to_string()),
                total_sections,
                red(&failed.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Assemble temp/contract/ with data from a JSON file
  docstitch assemble contract --data data.json -o contract.pdf

  # Inline data, Base64 output on stdout
  docstitch assemble contract --data-json '{"client":"ACME"}' --base64

  # Service-style JSON response ({"status": ..., "pdf_base64" | "message": ...})
  docstitch assemble contract --data data.json --json > response.json

  # Single template with an inline image bound to {{ image_placeholder }}
  docstitch render letter.docx --data data.json --image logo.png \
      --image-width 1.5 --image-height 0.5 -o letter.pdf

SECTION FOLDERS:
  Files are classified by name and merged by their numeric prefix:

    01_dynamic_cover.docx    template, filled with --data, converted to PDF
    02_static_terms.pdf      pre-rendered, merged as-is
    03_dynamic_annex.docx

  Files without a numeric prefix sort first. A failing section is skipped;
  only a request that yields no PDF at all is an error.

ENVIRONMENT VARIABLES:
  GOTENBERG_API_URL        Gotenberg base URL (default http://localhost:3000)
  DOCSTITCH_ROOT_DIR       Directory folders and templates are resolved under
  DOCSTITCH_MAX_WORKERS    Upper bound on concurrent section renders
  RUST_LOG                 Log filter, overrides --verbose/--quiet

SETUP:
  docker run --rm -p 3000:3000 gotenberg/gotenberg:8
"#;

/// Fill Word templates with JSON data and assemble them into PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "docstitch",
    version,
    about = "Fill Word templates with JSON data and assemble them into PDFs",
    long_about = "Render .docx templates against JSON data, convert them to PDF through a \
Gotenberg service, and merge multi-section folders (templates and ready-made PDFs) \
into one ordered document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gotenberg base URL.
    #[arg(long, global = true, env = "GOTENBERG_API_URL", default_value = docstitch::config::DEFAULT_CONVERTER_URL)]
    converter_url: String,

    /// Directory section folders and templates are resolved under.
    #[arg(long, global = true, env = "DOCSTITCH_ROOT_DIR", default_value = "temp")]
    root_dir: PathBuf,

    /// Maximum number of sections rendered concurrently.
    #[arg(long, global = true, env = "DOCSTITCH_MAX_WORKERS", default_value_t = 6)]
    max_workers: usize,

    /// HTTP timeout of one conversion call, in seconds.
    #[arg(long, global = true, env = "DOCSTITCH_CONVERTER_TIMEOUT", default_value_t = 120)]
    converter_timeout: u64,

    /// Bound on one whole section task, in seconds (0 disables).
    #[arg(long, global = true, env = "DOCSTITCH_SECTION_TIMEOUT", default_value_t = 300)]
    section_timeout: u64,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DOCSTITCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCSTITCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCSTITCH_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble every section of a folder into one PDF.
    Assemble {
        /// Folder under --root-dir holding the sections.
        folder: String,

        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Fill a single template and convert it to PDF.
    Render {
        /// Template under --root-dir.
        file: String,

        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// JSON file with the render data ("-" reads stdin).
    #[arg(short, long, conflicts_with = "data_json")]
    data: Option<PathBuf>,

    /// Render data as an inline JSON object.
    #[arg(long)]
    data_json: Option<String>,

    /// Image bound to {{ image_placeholder }} (PNG, JPEG, GIF or BMP).
    #[arg(long)]
    image: Option<PathBuf>,

    /// Image width in inches.
    #[arg(long, requires = "image")]
    image_width: Option<f64>,

    /// Image height in inches.
    #[arg(long, requires = "image")]
    image_height: Option<f64>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write the PDF to this file.
    #[arg(short, long, conflicts_with_all = ["base64", "json"])]
    output: Option<PathBuf>,

    /// Print the PDF as Base64 on stdout.
    #[arg(long, conflicts_with = "json")]
    base64: bool,

    /// Print a {"status": ...} JSON response on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is shown.
    let json = match &cli.command {
        Command::Assemble { output, .. } | Command::Render { output, .. } => output.json,
    };
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !json
        && matches!(cli.command, Command::Assemble { .. });
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|p| p as Arc<dyn AssemblyProgressCallback>),
    )?;

    // ── Run ──────────────────────────────────────────────────────────────
    match &cli.command {
        Command::Assemble {
            folder,
            input,
            output,
        } => {
            let request = AssemblyRequest {
                folder_name: folder.clone(),
                data: load_data(input).await?,
                image: load_image(input).await?,
            };
            let result = assemble_sections(&request, &config).await;
            if let (Err(_), Some(p)) = (&result, &progress) {
                p.bar.finish_and_clear();
            }
            if output.json {
                return respond_json(result.map(|o| o.pdf));
            }
            let assembled = result.context("Assembly failed")?;
            if !cli.quiet && !show_progress {
                print_summary(&assembled);
            }
            emit_pdf(&assembled.pdf, output, cli.quiet).await
        }
        Command::Render {
            file,
            input,
            output,
        } => {
            let request = DocumentRequest {
                file_name: file.clone(),
                data: load_data(input).await?,
                image: load_image(input).await?,
            };
            let result = render_document(&request, &config).await;
            if output.json {
                return respond_json(result);
            }
            let pdf = result.context("Rendering failed")?;
            emit_pdf(&pdf, output, cli.quiet).await
        }
    }
}

/// Map CLI args to `AssemblyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssemblyConfig> {
    let mut builder = AssemblyConfig::builder()
        .converter_url(cli.converter_url.clone())
        .root_dir(cli.root_dir.clone())
        .max_workers(cli.max_workers)
        .converter_timeout_secs(cli.converter_timeout)
        .section_timeout_secs((cli.section_timeout > 0).then_some(cli.section_timeout));

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Render data from `--data` / `--data-json`; empty when neither is given.
async fn load_data(input: &InputArgs) -> Result<Map<String, Value>> {
    let raw = match (&input.data, &input.data_json) {
        (Some(path), _) if path == Path::new("-") => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read data from stdin")?;
            buf
        }
        (Some(path), _) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read data from {:?}", path))?,
        (None, Some(inline)) => inline.clone(),
        (None, None) => return Ok(Map::new()),
    };

    match serde_json::from_str::<Value>(&raw).context("Data is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("Data must be a JSON object, got {}", json_kind(&other)),
    }
}

async fn load_image(input: &InputArgs) -> Result<Option<ImageSpec>> {
    let Some(ref path) = input.image else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {:?}", path))?;
    Ok(Some(ImageSpec {
        content: STANDARD.encode(bytes),
        width: input.image_width,
        height: input.image_height,
    }))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Print the service response body; exit non-zero on error.
fn respond_json(result: Result<Vec<u8>, AssemblyError>) -> Result<()> {
    let (code, body) = DocumentResponse::from_result(result);
    let json = serde_json::to_string_pretty(&body).context("Failed to serialise response")?;
    println!("{json}");
    if !body.is_success() {
        std::process::exit(if code >= 500 { 2 } else { 1 });
    }
    Ok(())
}

async fn emit_pdf(pdf: &[u8], output: &OutputArgs, quiet: bool) -> Result<()> {
    if let Some(ref path) = output.output {
        write_atomic(path, pdf.to_vec())
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        if !quiet {
            eprintln!(
                "{}  {} bytes  →  {}",
                green("✔"),
                pdf.len(),
                bold(&path.display().to_string())
            );
        }
        return Ok(());
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if output.base64 {
        writeln!(handle, "{}", encode_pdf(pdf)).context("Failed to write to stdout")?;
        return Ok(());
    }
    if stdout.is_terminal() {
        bail!("Refusing to write binary PDF to a terminal; use -o FILE, --base64 or --json");
    }
    handle.write_all(pdf).context("Failed to write to stdout")?;
    Ok(())
}

fn print_summary(output: &AssemblyOutput) {
    let stats = &output.stats;
    eprintln!(
        "Assembled {} dynamic + {} static sections in {}ms",
        stats.rendered_sections, stats.loaded_static_sections, stats.total_duration_ms
    );
    for failure in output.failures() {
        if let Some(ref e) = failure.error {
            eprintln!("  {} {}", red("✗"), e);
        }
    }
    if stats.missing_static_sections > 0 {
        eprintln!(
            "  {} static sections missing",
            stats.missing_static_sections
        );
    }
    if let Some(ref name) = stats.fallback_section {
        eprintln!(
            "  {} merge failed, returning '{}' alone",
            yellow("⚠"),
            name
        );
    }
}
