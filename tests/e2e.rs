//! End-to-end tests for chunkwise.
//!
//! These use real artifacts in `./test_cases/`, the real segmenters
//! (pdfium, soffice, ffmpeg) and live LLM API calls. They are gated behind
//! the `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested. Staging goes through a local directory, so the
//! provider must accept inline file data.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture

use chunkwise::inference::LlmInference;
use chunkwise::storage::LocalObjectStore;
use chunkwise::{
    AnalysisConfig, AnalysisContract, AnalysisError, AnalysisOutput, AnalysisRequest, Analyzer,
    Artifact, ObjectStore,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no artifact at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn live_analyzer(staging: &tempfile::TempDir, config: AnalysisConfig) -> Analyzer {
    let inference = LlmInference::from_env(None, None).expect("an LLM provider must be configured");
    Analyzer::new(
        Arc::new(LocalObjectStore::new(staging.path())),
        Arc::new(inference),
        config,
    )
}

fn request_for(path: &PathBuf, contract: AnalysisContract) -> AnalysisRequest {
    let artifact = Artifact::from_location(path.display().to_string()).expect("known extension");
    AnalysisRequest::new(artifact, contract)
}

/// Assert the output is a JSON object and the staging root is empty.
async fn assert_output_sane(out: &AnalysisOutput, staging: &tempfile::TempDir, context: &str) {
    assert!(out.value.is_object(), "[{context}] result must be a JSON object");
    assert!(!out.json.starts_with("```"), "[{context}] fence leaked into result");
    assert!(out.stats.succeeded_segments >= 1);
    let left = LocalObjectStore::new(staging.path())
        .list("tmp_chunks")
        .await
        .unwrap();
    assert!(left.is_empty(), "[{context}] staged objects left: {left:?}");
    println!(
        "[{context}] ✓  {}/{} segments, {} in / {} out tokens, {}ms",
        out.stats.succeeded_segments,
        out.stats.total_segments,
        out.stats.total_input_tokens,
        out.stats.total_output_tokens,
        out.stats.total_duration_ms
    );
}

// ── Documents ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_analyze_arxiv_paper() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));
    let staging = tempfile::tempdir().unwrap();
    let analyzer = live_analyzer(
        &staging,
        AnalysisConfig::builder().pages_per_segment(5).build().unwrap(),
    );
    let contract = AnalysisContract::new(
        "Extract the paper title, the author names, and every dataset used in experiments.",
    )
    .with_schema(json!({"title": "string", "authors": ["string"], "datasets": ["string"]}));

    let out = analyzer
        .analyze(&request_for(&path, contract))
        .await
        .expect("analysis should succeed");

    // 15 pages at 5 per segment
    assert_eq!(out.stats.total_segments, 3);
    assert!(out.json.to_lowercase().contains("attention"));
    assert_output_sane(&out, &staging, "arxiv").await;
}

#[tokio::test]
async fn test_analyze_slide_deck() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("pitch_deck.pptx"));
    let staging = tempfile::tempdir().unwrap();
    let analyzer = live_analyzer(&staging, AnalysisConfig::default());
    let contract = AnalysisContract::new(
        "Extract company_name, team_members (name and role) and funding_ask.",
    );

    let out = analyzer
        .analyze(&request_for(&path, contract))
        .await
        .expect("analysis should succeed");
    assert_output_sane(&out, &staging, "pptx").await;
}

#[tokio::test]
async fn test_analyze_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let staging = tempfile::tempdir().unwrap();
    let analyzer = live_analyzer(&staging, AnalysisConfig::default());
    let request = AnalysisRequest::new(
        Artifact::from_location("/definitely/not/a/real/file.pdf").unwrap(),
        AnalysisContract::new("Anything."),
    );
    let err = analyzer.analyze(&request).await.unwrap_err();
    assert!(matches!(err, AnalysisError::NormalizationFailed { .. }));
}

// ── Recordings ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_analyze_podcast() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("podcast_episode.mp3"));
    let staging = tempfile::tempdir().unwrap();
    let analyzer = live_analyzer(
        &staging,
        AnalysisConfig::builder().media_segment_secs(120).build().unwrap(),
    );
    let contract = AnalysisContract::new("List the speakers and the main topics discussed.");

    let out = analyzer
        .analyze(&request_for(&path, contract))
        .await
        .expect("analysis should succeed");
    assert!(out.segments.iter().all(|r| matches!(
        r.span,
        chunkwise::SegmentSpan::Time { .. }
    )));
    assert_output_sane(&out, &staging, "mp3").await;
}
