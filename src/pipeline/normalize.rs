//! Format normalisation: fetch the artifact and bring documents into the
//! canonical PDF form.
//!
//! Media and PDF artifacts are only downloaded. Other document formats
//! (Word, PowerPoint, spreadsheets, …) are converted by a headless office
//! suite. Every failure here is fatal and non-retryable: a missing
//! converter or a conversion that produces nothing points at the
//! environment, not at transient load.

use crate::artifact::{Artifact, CANONICAL_EXTENSION};
use crate::cancel::CancelSignal;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::tool::{run_tool, ToolError};
use crate::storage::ObjectStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Download `artifact` into `work_dir` and return the path of the file the
/// segmenter should read.
pub async fn normalize(
    artifact: &Artifact,
    store: &dyn ObjectStore,
    work_dir: &Path,
    config: &AnalysisConfig,
    cancel: &CancelSignal,
) -> Result<PathBuf, AnalysisError> {
    let failed = |reason: String| AnalysisError::NormalizationFailed {
        location: artifact.location.clone(),
        reason,
    };

    let download_dir = work_dir.join("input");
    tokio::fs::create_dir_all(&download_dir)
        .await
        .map_err(|e| failed(format!("cannot create {}: {e}", download_dir.display())))?;
    let local = download_dir.join(format!("artifact.{}", artifact.extension));

    tokio::select! {
        res = store.download(&artifact.location, &local) => {
            res.map_err(|e| failed(format!("download failed: {e}")))?
        }
        _ = cancel.cancelled() => return Err(AnalysisError::Cancelled { stage: "normalization" }),
    }
    debug!("Fetched {} → {}", artifact.location, local.display());

    if !artifact.needs_conversion() {
        return Ok(local);
    }

    info!("Converting .{} to {}", artifact.extension, CANONICAL_EXTENSION);
    let converted = convert_to_pdf(&local, &download_dir, work_dir, config, cancel)
        .await
        .map_err(|e| match e {
            ConvertError::Cancelled => AnalysisError::Cancelled {
                stage: "normalization",
            },
            ConvertError::Failed(reason) => failed(reason),
        })?;

    // the original is no longer needed once the canonical copy exists
    if let Err(e) = tokio::fs::remove_file(&local).await {
        debug!("Could not delete {}: {}", local.display(), e);
    }
    Ok(converted)
}

enum ConvertError {
    Cancelled,
    Failed(String),
}

/// Arguments for a headless office conversion of `input` into `out_dir`.
///
/// A private user profile under the workspace keeps concurrent conversions
/// from contending for the shared default profile lock.
pub fn converter_args(input: &Path, out_dir: &Path, work_dir: &Path) -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--norestore".into(),
        format!("-env:UserInstallation=file://{}", work_dir.join("lo_profile").display()),
        "--convert-to".into(),
        CANONICAL_EXTENSION.into(),
        "--outdir".into(),
        out_dir.display().to_string(),
        input.display().to_string(),
    ]
}

async fn convert_to_pdf(
    input: &Path,
    out_dir: &Path,
    work_dir: &Path,
    config: &AnalysisConfig,
    cancel: &CancelSignal,
) -> Result<PathBuf, ConvertError> {
    let args = converter_args(input, out_dir, work_dir);
    run_tool(
        &config.converter_program,
        &args,
        Duration::from_secs(config.conversion_timeout_secs),
        cancel,
    )
    .await
    .map_err(|e| match e {
        ToolError::Cancelled { .. } => ConvertError::Cancelled,
        other => ConvertError::Failed(other.to_string()),
    })?;

    find_output(input, out_dir)
        .await
        .ok_or_else(|| ConvertError::Failed("converter produced no output file".to_string()))
}

/// `<stem>.pdf` in `out_dir`, else any other PDF there.
async fn find_output(input: &Path, out_dir: &Path) -> Option<PathBuf> {
    let stem = input.file_stem()?;
    let expected = out_dir.join(stem).with_extension(CANONICAL_EXTENSION);
    if tokio::fs::metadata(&expected).await.is_ok() {
        return Some(expected);
    }

    let mut entries = tokio::fs::read_dir(out_dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(CANONICAL_EXTENSION));
        if is_pdf && path != input {
            return Some(path);
        }
    }
    None
}
