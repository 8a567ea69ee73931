//! Document splitting: copy page groups of the canonical PDF into
//! standalone files via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state. All calls for one
//! document happen on a single blocking-pool thread, with a pdfium binding
//! created for this call and dropped at its end; nothing is shared between
//! concurrent analyses.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::segment::{plan_page_ranges, Segment, SegmentSet, SegmentSpan};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const PDF_MIME: &str = "application/pdf";

/// Split `source` into `pages_per_segment`-page PDFs under `out_dir`, then
/// delete `source`.
pub async fn split_document(
    source: &Path,
    out_dir: &Path,
    config: &AnalysisConfig,
) -> Result<SegmentSet, AnalysisError> {
    let source = source.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    let per_segment = config.pages_per_segment;
    let password = config.password.clone();

    let segments = tokio::task::spawn_blocking(move || {
        split_blocking(&source, &out_dir, per_segment, password.as_deref())
    })
    .await
    .map_err(|e| AnalysisError::SegmentationFailed {
        reason: format!("split task panicked: {e}"),
    })??;

    Ok(SegmentSet {
        segments,
        mime_type: PDF_MIME.to_string(),
        extension: "pdf".to_string(),
    })
}

fn split_blocking(
    source: &Path,
    out_dir: &Path,
    per_segment: usize,
    password: Option<&str>,
) -> Result<Vec<Segment>, AnalysisError> {
    let pdfium = bind_pdfium()?;

    let segments = {
        let document = pdfium
            .load_pdf_from_file(source, password)
            .map_err(|e| load_error(source, password, e))?;
        let total = document.pages().len() as usize;
        info!("PDF loaded: {} pages", total);

        let mut segments = Vec::new();
        for (ordinal, (start, end)) in plan_page_ranges(total, per_segment).into_iter().enumerate() {
            let path = out_dir.join(format!("segment_{ordinal:04}.pdf"));
            write_page_range(&pdfium, &document, start, end, &path)?;
            debug!("Wrote pages {}-{} → {}", start + 1, end, path.display());
            segments.push(Segment {
                ordinal,
                path,
                span: SegmentSpan::Pages {
                    start: start + 1,
                    end,
                },
            });
        }
        segments
        // document closes here, before the source file is removed
    };

    if let Err(e) = std::fs::remove_file(source) {
        warn!("Could not delete canonical document {}: {}", source.display(), e);
    }
    Ok(segments)
}

fn write_page_range(
    pdfium: &Pdfium,
    document: &PdfDocument<'_>,
    start: usize,
    end: usize,
    path: &Path,
) -> Result<(), AnalysisError> {
    let fail = |what: &str, detail: String| AnalysisError::SegmentationFailed {
        reason: format!("{what} pages {}-{}: {detail}", start + 1, end),
    };
    let first = PdfPageIndex::try_from(start).map_err(|e| fail("index out of range for", e.to_string()))?;
    let last = PdfPageIndex::try_from(end - 1).map_err(|e| fail("index out of range for", e.to_string()))?;

    let mut chunk = pdfium
        .create_new_pdf()
        .map_err(|e| fail("could not create document for", format!("{e:?}")))?;
    chunk
        .pages_mut()
        .copy_page_range_from_document(document, first..=last, 0)
        .map_err(|e| fail("could not copy", format!("{e:?}")))?;
    chunk
        .save_to_file(path)
        .map_err(|e| fail("could not save", format!("{e:?}")))?;
    Ok(())
}

/// Bind to `PDFIUM_LIB_PATH` (a library file or the directory holding it)
/// when set, else to the system library.
fn bind_pdfium() -> Result<Pdfium, AnalysisError> {
    let unavailable = |e: PdfiumError| AnalysisError::SegmentationFailed {
        reason: format!("pdfium library unavailable: {e:?}"),
    };
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(p) if !p.is_empty() => {
            let p = PathBuf::from(p);
            let lib = if p.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&p)
            } else {
                p
            };
            Pdfium::bind_to_library(lib).or_else(|_| Pdfium::bind_to_system_library())
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(unavailable)?;
    Ok(Pdfium::new(bindings))
}

fn load_error(source: &Path, password: Option<&str>, e: PdfiumError) -> AnalysisError {
    let detail = format!("{e:?}");
    let reason = if detail.to_ascii_lowercase().contains("password") {
        if password.is_some() {
            format!("wrong password for {}", source.display())
        } else {
            format!("{} is encrypted and no password was given", source.display())
        }
    } else {
        format!("cannot open {} as PDF: {detail}", source.display())
    };
    AnalysisError::SegmentationFailed { reason }
}
