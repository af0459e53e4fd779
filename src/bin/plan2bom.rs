//! CLI binary for plan2bom.
//!
//! A thin shim over the library crate: resolves the plan and knowledge
//! files, picks the analysis service, streams progress to the terminal and
//! prints the bill of materials.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use plan2bom::{
    resolve_document, AnalysisService, BillItem, BomGenerator, GeminiConfig, GeminiService,
    LlmProviderService, NoopProgress, PdfiumRasterizer, PipelineConfig, ProgressFn,
    ProgressReporter,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Spinner progress reporter ────────────────────────────────────────────────

/// Prints each progress message above a spinner that shows the latest one.
struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        let style =
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Analyzing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for SpinnerProgress {
    fn on_progress(&self, message: &str) {
        self.bar.println(format!("  {} {}", cyan("›"), dim(message)));
        self.bar.set_message(message.to_string());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a plan with Gemini
  plan2bom plano.pdf

  # Add reference material (catalogues, earlier take-offs)
  plan2bom plano.pdf -k catalogo.png -k ejemplo.jpg

  # JSON output to a file
  plan2bom plano.pdf --format json -o catalogo.json

  # Use another provider through edgequake-llm
  plan2bom --provider openai --model gpt-4.1 plano.pdf

  # Save the first-page preview as well
  plan2bom plano.pdf --preview plano.png

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default service)
  OPENAI_API_KEY          OpenAI API key (with --provider openai)
  ANTHROPIC_API_KEY       Anthropic API key (with --provider anthropic)
  PDFIUM_LIB_PATH         Path to libpdfium; the system library is used otherwise
  RUST_LOG                Override the log filter
"#;

/// Generate an HVAC bill of materials from a floor plan.
#[derive(Parser, Debug)]
#[command(
    name = "plan2bom",
    version,
    about = "Generate an HVAC bill of materials from a floor plan using a vision model",
    long_about = "Render the first page of a floor plan (PDF or image), send it with optional \
reference images to a vision model constrained to a JSON schema, and print the resulting \
Catálogo de Conceptos.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Plan: local PDF/image path or HTTP/HTTPS URL.
    plan: String,

    /// Knowledge file (image) sent as reference material. Repeatable.
    #[arg(short = 'k', long = "knowledge", value_name = "FILE")]
    knowledge: Vec<String>,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, env = "PLAN2BOM_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, env = "PLAN2BOM_FORMAT", value_enum, default_value = "table")]
    format: OutputFormat,

    /// Use an edgequake-llm provider (openai, anthropic, ollama, ...) instead of Gemini.
    #[arg(long, env = "PLAN2BOM_PROVIDER")]
    provider: Option<String>,

    /// Model ID (default: gemini-2.5-pro).
    #[arg(long, env = "PLAN2BOM_MODEL")]
    model: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Render scale for PDF plans (1.5–4.0).
    #[arg(long, env = "PLAN2BOM_SCALE", default_value_t = 1.5)]
    scale: f32,

    /// JPEG quality for the rendered plan (1–100).
    #[arg(long, env = "PLAN2BOM_QUALITY", default_value_t = 90)]
    quality: u8,

    /// PDF user password for encrypted plans.
    #[arg(long, env = "PLAN2BOM_PASSWORD")]
    password: Option<String>,

    /// Path to a text file replacing the built-in instructions.
    #[arg(long, env = "PLAN2BOM_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Also write a PNG preview of the plan's first page here.
    #[arg(long, env = "PLAN2BOM_PREVIEW")]
    preview: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PLAN2BOM_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Analysis call timeout in seconds.
    #[arg(long, env = "PLAN2BOM_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PLAN2BOM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PLAN2BOM_QUIET")]
    quiet: bool,

    /// Disable the spinner; progress is printed as plain lines.
    #[arg(long, env = "PLAN2BOM_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already shows every stage; keep library INFO logs quiet
    // while it is active.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Resolve inputs ───────────────────────────────────────────────────
    let plan = resolve_document(&cli.plan, cli.download_timeout)
        .await
        .with_context(|| format!("Failed to open plan {}", cli.plan))?;

    let mut knowledge = Vec::with_capacity(cli.knowledge.len());
    for input in &cli.knowledge {
        let doc = resolve_document(input, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to open knowledge file {input}"))?;
        knowledge.push(doc);
    }

    // ── Build generator ──────────────────────────────────────────────────
    let config = build_config(&cli).await?;
    let generator = BomGenerator::new(
        Arc::new(PdfiumRasterizer::new()),
        build_service(&cli)?,
        config,
    );

    if let Some(ref path) = cli.preview {
        let preview = generator
            .preview(&plan)
            .await
            .context("Failed to render preview")?;
        tokio::fs::write(path, &preview.bytes)
            .await
            .with_context(|| format!("Failed to write preview to {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} preview {}x{}  →  {}",
                green("✔"),
                preview.width,
                preview.height,
                bold(&path.display().to_string())
            );
        }
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let spinner = show_progress.then(SpinnerProgress::new);
    let plain = ProgressFn(|m: &str| eprintln!("{m}"));
    let reporter: &dyn ProgressReporter = match (&spinner, cli.quiet) {
        (Some(s), _) => s,
        (None, true) => &NoopProgress,
        (None, false) => &plain,
    };

    let result = generator.generate(plan, knowledge, reporter).await;
    if let Some(ref s) = spinner {
        s.finish();
    }
    let bom = result.context("Analysis failed")?;

    // ── Output ───────────────────────────────────────────────────────────
    let rendered = match cli.format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&bom.items).context("Failed to serialise items")? + "\n"
        }
        OutputFormat::Table => render_table(&bom.items),
    };

    if let Some(ref path) = cli.output {
        tokio::fs::write(path, rendered.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet {
        let tokens = match (bom.stats.input_tokens, bom.stats.output_tokens) {
            (Some(i), Some(o)) => format!("  {} tokens in  /  {} tokens out", i, o),
            _ => String::new(),
        };
        eprintln!(
            "{} {} items  {}ms{}",
            green("✔"),
            bold(&bom.len().to_string()),
            bom.stats.total_duration_ms,
            dim(&tokens),
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .render_scale(cli.scale)
        .jpeg_quality(cli.quality);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref path) = cli.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.instructions(text);
    }

    builder.build().context("Invalid configuration")
}

/// Gemini by default; any other `--provider` goes through edgequake-llm.
fn build_service(cli: &Cli) -> Result<Arc<dyn AnalysisService>> {
    match cli.provider.as_deref() {
        Some(name) if !name.eq_ignore_ascii_case("gemini") => {
            let service = LlmProviderService::from_name(name, cli.model.as_deref())
                .context("Failed to configure provider")?
                .with_timeout(Duration::from_secs(cli.api_timeout));
            Ok(Arc::new(service))
        }
        _ => {
            let api_key = cli.api_key.clone().context(
                "No Gemini API key: pass --api-key or set GEMINI_API_KEY \
                 (or choose another service with --provider)",
            )?;
            let mut config = GeminiConfig::builder().timeout_secs(cli.api_timeout);
            if let Some(ref model) = cli.model {
                config = config.model(model.clone());
            }
            let config = config.build().context("Invalid Gemini configuration")?;
            let service = GeminiService::new(api_key, config)?;
            Ok(Arc::new(service))
        }
    }
}

/// Aligned four-column table, or "No items found." for an empty result.
fn render_table(items: &[BillItem]) -> String {
    if items.is_empty() {
        return "No items found.\n".to_string();
    }

    let headers = ["Código", "Descripción", "Unidad", "Cantidad"];
    let rows: Vec<[String; 4]> = items
        .iter()
        .map(|i| {
            [
                i.code.clone(),
                i.description.clone(),
                i.unit.clone(),
                i.quantity.to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| -> String {
        let mut out = String::new();
        for (idx, (cell, w)) in cells.iter().zip(widths).enumerate() {
            let pad = w - cell.chars().count();
            if idx == 3 {
                out.push_str(&" ".repeat(pad));
                out.push_str(cell);
            } else {
                out.push_str(cell);
                out.push_str(&" ".repeat(pad));
                out.push_str("  ");
            }
        }
        out.trim_end().to_string() + "\n"
    };

    let mut out = line(headers);
    out.push_str(&line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)));
    for row in &rows {
        out.push_str(&line(row.each_ref().map(String::as_str)));
    }
    out
}
