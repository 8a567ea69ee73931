//! Instructions sent to the inference service.
//!
//! The caller's [`AnalysisContract`] says *what* to extract. This module wraps
//! it with the fixed, kind-specific framing (document vs. recording) and the
//! synthesis rules, so both can be inspected in tests without a live model.

use crate::artifact::{AnalysisContract, MediaKind};

/// Framing for page-range segments of a document.
pub const DOCUMENT_PREAMBLE: &str = r#"You are a meticulous analyst with multimodal understanding.
You are given one contiguous excerpt (a range of pages) of a larger document.
Analyze ALL text and visual elements in it: images, graphs, charts, tables and diagrams.

CRITICAL INSTRUCTIONS:
- Stick STRICTLY to the information present in this excerpt. Do not infer or add anything that is not explicitly shown.
- If a piece of information is not in the excerpt, return `null` for that field. Do not write "not specified" or "N/A".
- Your output MUST be a single valid JSON object. Do not add any other text or Markdown formatting."#;

/// Framing for time-range segments of an audio or video recording.
pub const MEDIA_PREAMBLE: &str = r#"You are a meticulous analyst with multimodal understanding.
You are given one contiguous time slice of a longer recording.
Listen to everything that is said and, for video, look at everything shown on screen (slides, charts, demos).

CRITICAL INSTRUCTIONS:
- Stick STRICTLY to the information present in this slice. Do not infer or add anything that is not explicitly said or shown.
- If a piece of information is not in the slice, return `null` for that field. Do not write "not specified" or "N/A".
- Your output MUST be a single valid JSON object. Do not add any other text or Markdown formatting."#;

/// Merge rules for the synthesis call.
pub const SYNTHESIS_INSTRUCTION: &str = r#"You are an expert data synthesis agent. A large artifact was analyzed in chunks and each chunk produced one JSON object.
Merge these partial JSON objects into a single, coherent JSON object that represents the entire artifact.

CRITICAL INSTRUCTIONS:
- The final output MUST be a single, valid JSON object with the same shape as the inputs.
- For list fields, combine all items from all chunks and remove duplicates. Do not create nested lists.
- For string, number and object fields, use the first non-null value in input order. Chunks are given in artifact order; the earliest chunk wins.
- If a field is absent or null in every chunk, it MUST be `null` in the output.
- Output only the JSON object. Do not add any other text or Markdown formatting.

The JSON objects from the chunks follow, one per message, earliest first."#;

/// Full instruction for a single segment of an artifact of `kind`.
pub fn segment_instruction(kind: MediaKind, contract: &AnalysisContract) -> String {
    let preamble = match kind {
        MediaKind::Document => DOCUMENT_PREAMBLE,
        MediaKind::Audio | MediaKind::Video => MEDIA_PREAMBLE,
    };
    let mut prompt = format!("{preamble}\n\n{}", contract.instruction.trim());
    push_schema(&mut prompt, contract);
    prompt
}

/// Full instruction for the synthesis call.
pub fn synthesis_instruction(contract: &AnalysisContract) -> String {
    let mut prompt = SYNTHESIS_INSTRUCTION.to_string();
    push_schema(&mut prompt, contract);
    prompt
}

fn push_schema(prompt: &mut String, contract: &AnalysisContract) {
    if let Some(schema) = &contract.schema {
        prompt.push_str("\n\nThe JSON object MUST conform to this schema:\n");
        prompt.push_str(&schema.to_string());
    }
}
