//! Pipeline stages for chunked artifact analysis.
//!
//! Each submodule implements one step, so each can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! normalize ──▶ segment ──▶ pool ──▶ adapter ──▶ synthesize
//! (download,   (pdf/media) (bounded  (stage, infer,  (merge partials)
//!  convert)                 fan-out)  validate, clean)
//! ```
//!
//! 1. [`normalize`]  fetch the artifact; convert office documents to PDF
//! 2. [`segment`]    split into page groups ([`pdf`]) or time slices ([`media`])
//! 3. [`pool`]       run the adapter over all segments, at most `C` at once
//! 4. [`adapter`]    stage one segment, call inference with retries,
//!    validate with [`payload`], delete the staged copy
//! 5. [`synthesize`] one more call (or [`merge`] locally) to combine partials
//!
//! [`janitor`] holds the workspace and staging bookkeeping that guarantee
//! cleanup on every exit path; [`tool`] runs the external utilities.

pub mod adapter;
pub mod janitor;
pub mod media;
pub mod merge;
pub mod normalize;
pub mod payload;
pub mod pdf;
pub mod pool;
pub mod segment;
pub mod synthesize;
pub mod tool;
