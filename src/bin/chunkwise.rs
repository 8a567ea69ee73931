//! CLI binary for chunkwise.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, picks the object store and inference provider, and
//! prints the synthesized JSON.

use anyhow::{bail, Context, Result};
use chunkwise::inference::LlmInference;
use chunkwise::storage::{GcsObjectStore, LocalObjectStore};
use chunkwise::{
    cancel_pair, AnalysisConfig, AnalysisContract, AnalysisProgressCallback, AnalysisRequest,
    Analyzer, Artifact, MediaKind, ObjectStore, ProgressCallback, SynthesisStrategy,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished segment. Segments
/// finish out of order, so start times are kept per ordinal.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Fetching and splitting artifact…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, ordinal: usize) -> f64 {
        self.start_times
            .lock()
            .map(|mut m| m.remove(&ordinal))
            .ok()
            .flatten()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_segments: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} segments  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_segments as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analyzing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analyzing {total_segments} segments…"))
        ));
    }

    fn on_segment_start(&self, ordinal: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(ordinal, Instant::now());
        }
        self.bar.set_message(format!("segment {}", ordinal + 1));
    }

    fn on_segment_complete(&self, ordinal: usize, total: usize, payload_len: usize) {
        let secs = self.elapsed_secs(ordinal);
        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            ordinal + 1,
            total,
            dim(&format!("{payload_len:>5} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_segment_error(&self, ordinal: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(ordinal);
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Segment {:>3}/{:<3}  {}  {}",
            red("✗"),
            ordinal + 1,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_synthesis_start(&self, partials: usize) {
        self.bar.set_prefix("Synthesizing");
        self.bar.set_message(format!("merging {partials} partial results"));
    }

    fn on_analysis_complete(&self, total_segments: usize, success_count: usize) {
        self.bar.finish_and_clear();
        if total_segments == 0 {
            return;
        }
        let failed = total_segments.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} segments analyzed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} segments analyzed  ({} dropped)",
                if failed == total_segments { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_segments,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local PDF, staged through a local directory (file-capable providers only)
  chunkwise deck.pdf --contract contract.txt

  # Slide deck in GCS, staged in another bucket, schema-constrained output
  chunkwise gs://inbox/acme.pptx --staging-bucket my-staging \
      --contract contract.txt --schema schema.json -o acme.json

  # One-hour recording in 10-minute slices, merged without a synthesis call
  chunkwise gs://inbox/pitch.mp4 --staging-bucket my-staging \
      --contract contract.txt --segment-secs 600 --synthesis local

  # Full run report (per-segment outcomes, tokens, timings)
  chunkwise deck.pdf --contract contract.txt --json-report > report.json

ENVIRONMENT VARIABLES:
  GCS_ACCESS_TOKEN         OAuth2 bearer token for the GCS JSON API
  OPENAI_API_KEY           OpenAI API key
  GEMINI_API_KEY           Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER   Provider (openai, anthropic, gemini, vertexai, ollama, …)
  EDGEQUAKE_MODEL          Model ID
  PDFIUM_LIB_PATH          Path to libpdfium (file or directory)
  RUST_LOG                 Log filter override (e.g. chunkwise=debug)

EXTERNAL TOOLS:
  soffice   converts docx/pptx/xlsx/… to PDF    (--soffice)
  ffmpeg    splits audio and video              (--ffmpeg)
  ffprobe   optional duration check             (--ffprobe)
"#;

/// Analyze large documents and recordings in chunks with a multimodal LLM.
#[derive(Parser, Debug)]
#[command(
    name = "chunkwise",
    version,
    about = "Analyze large documents and recordings in chunks with a multimodal LLM",
    long_about = "Split an artifact (PDF, office document, audio or video) into bounded segments, \
analyze each against the same contract with a multimodal LLM, and merge the partial JSON results \
into one document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Artifact location: gs://bucket/object, file:// URL or local path.
    artifact: String,

    /// File with the analysis instruction (what to extract).
    #[arg(long, env = "CHUNKWISE_CONTRACT")]
    contract: PathBuf,

    /// Optional JSON schema file the result must conform to.
    #[arg(long, env = "CHUNKWISE_SCHEMA")]
    schema: Option<PathBuf>,

    /// Media kind, when the extension is ambiguous or missing.
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// Format extension override (e.g. pptx, mp4).
    #[arg(long)]
    extension: Option<String>,

    /// Write the synthesized JSON to this file instead of stdout.
    #[arg(short, long, env = "CHUNKWISE_OUTPUT")]
    output: Option<PathBuf>,

    /// Emit the full run report (AnalysisOutput) instead of the result alone.
    #[arg(long, env = "CHUNKWISE_JSON_REPORT")]
    json_report: bool,

    /// GCS bucket used for staging segments. Required for gs:// artifacts.
    #[arg(long, env = "CHUNKWISE_STAGING_BUCKET")]
    staging_bucket: Option<String>,

    /// Directory used as the staging store when no bucket is given.
    #[arg(long, env = "CHUNKWISE_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Key prefix for staged segments.
    #[arg(long, env = "CHUNKWISE_STAGING_PREFIX", default_value = "tmp_chunks")]
    staging_prefix: String,

    /// LLM model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, vertexai, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature.
    #[arg(long, env = "CHUNKWISE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "CHUNKWISE_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Pages per document segment.
    #[arg(long, env = "CHUNKWISE_PAGES_PER_SEGMENT", default_value_t = 10)]
    pages_per_segment: usize,

    /// Seconds per audio/video segment.
    #[arg(long, env = "CHUNKWISE_SEGMENT_SECS", default_value_t = 300)]
    segment_secs: u64,

    /// Maximum segments in flight.
    #[arg(short, long, env = "CHUNKWISE_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Inference attempts per segment (first try included).
    #[arg(long, env = "CHUNKWISE_ATTEMPTS", default_value_t = 3)]
    attempts: u32,

    /// Base retry backoff in milliseconds (doubled per attempt).
    #[arg(long, env = "CHUNKWISE_RETRY_BASE_MS", default_value_t = 1500)]
    retry_base_ms: u64,

    /// Per-call inference timeout in seconds.
    #[arg(long, env = "CHUNKWISE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Overall deadline for the analysis in seconds.
    #[arg(long, env = "CHUNKWISE_DEADLINE")]
    deadline: Option<u64>,

    /// How partial results are merged.
    #[arg(long, env = "CHUNKWISE_SYNTHESIS", value_enum, default_value = "inference")]
    synthesis: SynthesisArg,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "CHUNKWISE_PASSWORD")]
    password: Option<String>,

    /// Parent directory for per-analysis workspaces.
    #[arg(long, env = "CHUNKWISE_TEMP_ROOT")]
    temp_root: Option<PathBuf>,

    /// Office converter executable.
    #[arg(long, env = "CHUNKWISE_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// Transcoder executable.
    #[arg(long, env = "CHUNKWISE_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Duration probe executable.
    #[arg(long, env = "CHUNKWISE_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Disable progress bar.
    #[arg(long, env = "CHUNKWISE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CHUNKWISE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CHUNKWISE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Document,
    Audio,
    Video,
}

impl From<KindArg> for MediaKind {
    fn from(v: KindArg) -> Self {
        match v {
            KindArg::Document => MediaKind::Document,
            KindArg::Audio => MediaKind::Audio,
            KindArg::Video => MediaKind::Video,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SynthesisArg {
    Inference,
    Local,
}

impl From<SynthesisArg> for SynthesisStrategy {
    fn from(v: SynthesisArg) -> Self {
        match v {
            SynthesisArg::Inference => SynthesisStrategy::Inference,
            SynthesisArg::Local => SynthesisStrategy::Local,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them all back.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Request ──────────────────────────────────────────────────────────
    let request = build_request(&cli).await?;

    // ── Collaborators ────────────────────────────────────────────────────
    let store = build_store(&cli)?;
    let mut inference = LlmInference::from_env(cli.provider.as_deref(), cli.model.as_deref())
        .context("No inference provider available")?
        .with_temperature(cli.temperature);
    if let Some(max) = cli.max_tokens {
        inference = inference.with_max_tokens(max);
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let analyzer = Analyzer::new(store, Arc::new(inference), config);

    // Ctrl-C cancels in-flight work; cleanup still runs before exit.
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let output = match analyzer.analyze_with_cancel(&request, signal).await {
        Ok(output) => output,
        Err(e) => {
            let tag = e.tag();
            return Err(anyhow::Error::new(e).context(format!("Analysis failed [{tag}]")));
        }
    };

    let body = if cli.json_report {
        serde_json::to_string_pretty(&output).context("Failed to serialise run report")?
    } else {
        serde_json::to_string_pretty(&output.value).context("Failed to serialise result")?
    };

    match &cli.output {
        Some(path) => {
            write_atomic(path, body.as_bytes())?;
            if !cli.quiet {
                eprintln!("   → {}", bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(body.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet {
        let s = &output.stats;
        eprintln!(
            "   {}/{} segments  {} tokens in  /  {} tokens out  ·  {}ms total",
            s.succeeded_segments,
            s.total_segments,
            dim(&s.total_input_tokens.to_string()),
            dim(&s.total_output_tokens.to_string()),
            s.total_duration_ms,
        );
        if s.leaked_staging_objects > 0 {
            eprintln!(
                "   {} {} staged objects could not be deleted (see log)",
                red("!"),
                s.leaked_staging_objects
            );
        }
    }
    Ok(())
}

async fn build_request(cli: &Cli) -> Result<AnalysisRequest> {
    let instruction = tokio::fs::read_to_string(&cli.contract)
        .await
        .with_context(|| format!("Failed to read contract from {:?}", cli.contract))?;
    let mut contract = AnalysisContract::new(instruction);
    if let Some(path) = &cli.schema {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read schema from {path:?}"))?;
        let schema = serde_json::from_str(&text).with_context(|| format!("Schema {path:?} is not valid JSON"))?;
        contract = contract.with_schema(schema);
    }

    let location = artifact_location(&cli.artifact)?;
    let artifact = match (cli.kind, cli.extension.as_deref()) {
        (Some(kind), Some(ext)) => Artifact::new(location, kind.into(), ext),
        (None, Some(ext)) => {
            let kind = MediaKind::from_extension(ext)
                .with_context(|| format!("Unknown format '{ext}'; pass --kind"))?;
            Artifact::new(location, kind, ext)
        }
        (kind, None) => {
            let mut artifact = Artifact::from_location(location.clone())
                .with_context(|| format!("Cannot infer the format of '{location}'; pass --extension"))?;
            if let Some(kind) = kind {
                artifact.kind = kind.into();
            }
            artifact
        }
    };
    Ok(AnalysisRequest::new(artifact, contract))
}

/// Local paths become absolute so the directory store can resolve them.
fn artifact_location(raw: &str) -> Result<String> {
    if raw.starts_with("gs://") || raw.starts_with("file://") {
        return Ok(raw.to_string());
    }
    let path = Path::new(raw);
    if !path.exists() {
        bail!("Artifact not found: {raw}");
    }
    let abs = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve {raw}"))?;
    Ok(abs.display().to_string())
}

fn build_store(cli: &Cli) -> Result<Arc<dyn ObjectStore>> {
    if let Some(bucket) = &cli.staging_bucket {
        let mut store = GcsObjectStore::new(bucket.clone(), Duration::from_secs(300))
            .context("Failed to build GCS client")?;
        if let Ok(token) = std::env::var("GCS_ACCESS_TOKEN") {
            store = store.with_bearer_token(token);
        }
        return Ok(Arc::new(store));
    }
    if cli.artifact.starts_with("gs://") {
        bail!("gs:// artifacts need --staging-bucket (or CHUNKWISE_STAGING_BUCKET)");
    }
    let dir = cli
        .staging_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("chunkwise-staging"));
    std::fs::create_dir_all(&dir).with_context(|| format!("Cannot create staging dir {dir:?}"))?;
    Ok(Arc::new(LocalObjectStore::new(dir)))
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .pages_per_segment(cli.pages_per_segment)
        .media_segment_secs(cli.segment_secs)
        .concurrency(cli.concurrency)
        .inference_attempts(cli.attempts)
        .retry_base_ms(cli.retry_base_ms)
        .api_timeout_secs(cli.api_timeout)
        .staging_prefix(cli.staging_prefix.clone())
        .converter_program(cli.soffice.clone())
        .ffmpeg_program(cli.ffmpeg.clone())
        .ffprobe_program(cli.ffprobe.clone())
        .synthesis(cli.synthesis.into());

    if let Some(secs) = cli.deadline {
        builder = builder.deadline_secs(secs);
    }
    if let Some(pwd) = &cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(root) = &cli.temp_root {
        builder = builder.temp_root(root.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Write via a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Cannot create temp file in {dir:?}"))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.write_all(b"\n"))
        .context("Failed to write output")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move output into {path:?}"))?;
    Ok(())
}
