//! # chunkwise
//!
//! Analyze documents and recordings that are too large for a single
//! multimodal LLM call, and get back one structured JSON result.
//!
//! ## Why this crate?
//!
//! A 200-page deck or a two-hour recording exceeds the size, duration or
//! context limits of one inference call. This crate splits the artifact into
//! bounded segments, analyzes them concurrently against the same caller
//! supplied contract, and merges the partial JSON results with fixed
//! conflict rules. Temporary files and staged objects are removed on every
//! exit path, so it runs on hosts with a small ephemeral disk.
//!
//! ## Pipeline Overview
//!
//! ```text
//! artifact (gs://…, file://…)
//!  │
//!  ├─ 1. Normalize   download; office formats → PDF via headless soffice
//!  ├─ 2. Segment     10-page PDFs (pdfium) or 300 s slices (ffmpeg)
//!  ├─ 3. Analyze     ≤ C segments in flight: stage → infer → validate → delete
//!  ├─ 4. Synthesize  one merge call over the partials, in segment order
//!  └─ 5. Clean up    sweep staged objects, remove the workspace
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chunkwise::{AnalysisConfig, AnalysisContract, AnalysisRequest, Analyzer, Artifact};
//! use chunkwise::inference::LlmInference;
//! use chunkwise::storage::GcsObjectStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = GcsObjectStore::new("my-staging-bucket", Duration::from_secs(300))?
//!         .with_bearer_token(std::env::var("GCS_ACCESS_TOKEN")?);
//!     // Provider auto-detected from EDGEQUAKE_LLM_PROVIDER / OPENAI_API_KEY / …
//!     let inference = LlmInference::from_env(None, None)?;
//!     let analyzer = Analyzer::new(Arc::new(store), Arc::new(inference), AnalysisConfig::default());
//!
//!     let artifact = Artifact::from_location("gs://decks/acme.pptx").ok_or("unknown format")?;
//!     let contract = AnalysisContract::new("Extract company_name, team_members and funding_ask.");
//!     let output = analyzer.analyze(&AnalysisRequest::new(artifact, contract)).await?;
//!     println!("{}", output.json);
//!     eprintln!(
//!         "{}/{} segments, tokens: {} in / {} out",
//!         output.stats.succeeded_segments,
//!         output.stats.total_segments,
//!         output.stats.total_input_tokens,
//!         output.stats.total_output_tokens
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `chunkwise` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## External tools
//!
//! | Artifact | Needs |
//! |----------|-------|
//! | PDF | pdfium shared library (`PDFIUM_LIB_PATH` or system path) |
//! | docx, pptx, xlsx, … | `soffice` (LibreOffice) + pdfium |
//! | audio, video | `ffmpeg` (`ffprobe` optional, for a segment-count check) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod artifact;
pub mod cancel;
pub mod config;
pub mod error;
pub mod inference;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::Analyzer;
pub use artifact::{AnalysisContract, AnalysisRequest, Artifact, MediaKind};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, SynthesisStrategy};
pub use error::{AnalysisError, InferenceError, SegmentError, StorageError};
pub use inference::{InferenceRequest, InferenceResponse, InferenceService};
pub use output::{AnalysisOutput, AnalysisStats, SegmentReport};
pub use pipeline::segment::{Segment, SegmentSet, SegmentSpan, Segmenter};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use retry::RetryPolicy;
pub use storage::ObjectStore;
