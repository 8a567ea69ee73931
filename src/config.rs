//! Configuration types for chunked artifact analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. The defaults are tuned for a small container
//! (~512 MiB memory, tmpfs-backed `/tmp`): ten pages or five minutes per
//! segment and three segments in flight.

use crate::error::AnalysisError;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one or many analyses.
///
/// # Example
/// ```rust
/// use chunkwise::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .pages_per_segment(5)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.pages_per_segment, 5);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Pages per document segment. Default: 10.
    ///
    /// Lower this for image-heavy decks; each segment is uploaded whole.
    pub pages_per_segment: usize,

    /// Duration of each audio/video segment in seconds. Default: 300.
    pub media_segment_secs: u64,

    /// Maximum number of segments in flight at once. Default: 3.
    ///
    /// Every in-flight segment holds a local file and a staged copy, so this
    /// is bounded by the host's memory budget rather than by the API.
    pub concurrency: usize,

    /// Inference attempts per segment (first try included). Default: 3.
    pub inference_attempts: u32,

    /// Base delay before the first inference retry, doubled per attempt. Default: 1500.
    pub retry_base_ms: u64,

    /// Per-inference-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Upload attempts per staged segment. Default: 3.
    pub upload_attempts: u32,

    /// Base upload retry delay in milliseconds. Default: 1000.
    pub upload_retry_base_ms: u64,

    /// Delete attempts per staged object. Default: 2.
    pub delete_attempts: u32,

    /// Base delete retry delay in milliseconds. Default: 500.
    pub delete_retry_base_ms: u64,

    /// Timeout for the office-document converter in seconds. Default: 180.
    pub conversion_timeout_secs: u64,

    /// Timeout for the media transcoder in seconds. Default: 1800.
    pub transcode_timeout_secs: u64,

    /// Office converter executable. Default: `soffice`.
    pub converter_program: PathBuf,

    /// Transcoder executable. Default: `ffmpeg`.
    pub ffmpeg_program: PathBuf,

    /// Duration probe executable. Default: `ffprobe`.
    pub ffprobe_program: PathBuf,

    /// Audio bitrate for transcoded segments in kbit/s. Default: 64.
    pub audio_bitrate_kbps: u32,

    /// Audio sample rate for transcoded segments. Default: 16000.
    pub audio_sample_rate_hz: u32,

    /// Upper bound on video height after down-scaling. Default: 480.
    pub video_max_height: u32,

    /// Remote key prefix under which segments are staged. Default: `tmp_chunks`.
    pub staging_prefix: String,

    /// Parent directory for per-analysis workspaces. Default: system temp dir.
    pub temp_root: Option<PathBuf>,

    /// Overall deadline for one analysis in seconds. Default: none.
    pub deadline_secs: Option<u64>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// How partial results are combined. Default: [`SynthesisStrategy::Inference`].
    pub synthesis: SynthesisStrategy,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            pages_per_segment: 10,
            media_segment_secs: 300,
            concurrency: 3,
            inference_attempts: 3,
            retry_base_ms: 1500,
            api_timeout_secs: 120,
            upload_attempts: 3,
            upload_retry_base_ms: 1000,
            delete_attempts: 2,
            delete_retry_base_ms: 500,
            conversion_timeout_secs: 180,
            transcode_timeout_secs: 1800,
            converter_program: PathBuf::from("soffice"),
            ffmpeg_program: PathBuf::from("ffmpeg"),
            ffprobe_program: PathBuf::from("ffprobe"),
            audio_bitrate_kbps: 64,
            audio_sample_rate_hz: 16_000,
            video_max_height: 480,
            staging_prefix: "tmp_chunks".to_string(),
            temp_root: None,
            deadline_secs: None,
            password: None,
            synthesis: SynthesisStrategy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("pages_per_segment", &self.pages_per_segment)
            .field("media_segment_secs", &self.media_segment_secs)
            .field("concurrency", &self.concurrency)
            .field("inference_attempts", &self.inference_attempts)
            .field("retry_base_ms", &self.retry_base_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("staging_prefix", &self.staging_prefix)
            .field("temp_root", &self.temp_root)
            .field("deadline_secs", &self.deadline_secs)
            .field("synthesis", &self.synthesis)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Retry policy for inference calls (segments and synthesis).
    pub fn inference_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.inference_attempts, Duration::from_millis(self.retry_base_ms))
    }

    /// Retry policy for staging uploads.
    pub fn upload_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.upload_attempts, Duration::from_millis(self.upload_retry_base_ms))
    }

    /// Retry policy for staged-object deletes.
    pub fn delete_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.delete_attempts, Duration::from_millis(self.delete_retry_base_ms))
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn pages_per_segment(mut self, n: usize) -> Self {
        self.config.pages_per_segment = n;
        self
    }

    pub fn media_segment_secs(mut self, secs: u64) -> Self {
        self.config.media_segment_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn inference_attempts(mut self, n: u32) -> Self {
        self.config.inference_attempts = n;
        self
    }

    pub fn retry_base_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn upload_retry(mut self, attempts: u32, base_ms: u64) -> Self {
        self.config.upload_attempts = attempts;
        self.config.upload_retry_base_ms = base_ms;
        self
    }

    pub fn delete_retry(mut self, attempts: u32, base_ms: u64) -> Self {
        self.config.delete_attempts = attempts;
        self.config.delete_retry_base_ms = base_ms;
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn transcode_timeout_secs(mut self, secs: u64) -> Self {
        self.config.transcode_timeout_secs = secs;
        self
    }

    pub fn converter_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.converter_program = program.into();
        self
    }

    pub fn ffmpeg_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_program = program.into();
        self
    }

    pub fn ffprobe_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.ffprobe_program = program.into();
        self
    }

    pub fn audio_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.config.audio_bitrate_kbps = kbps.max(8);
        self
    }

    pub fn audio_sample_rate_hz(mut self, hz: u32) -> Self {
        self.config.audio_sample_rate_hz = hz.max(8_000);
        self
    }

    pub fn video_max_height(mut self, px: u32) -> Self {
        self.config.video_max_height = px.max(144);
        self
    }

    pub fn staging_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.staging_prefix = prefix.into();
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn deadline_secs(mut self, secs: u64) -> Self {
        self.config.deadline_secs = Some(secs);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn synthesis(mut self, strategy: SynthesisStrategy) -> Self {
        self.config.synthesis = strategy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &mut self.config;
        if c.pages_per_segment == 0 {
            return Err(AnalysisError::InvalidConfig(
                "pages_per_segment must be ≥ 1".into(),
            ));
        }
        if c.media_segment_secs == 0 {
            return Err(AnalysisError::InvalidConfig(
                "media_segment_secs must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(AnalysisError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.inference_attempts == 0 || c.upload_attempts == 0 || c.delete_attempts == 0 {
            return Err(AnalysisError::InvalidConfig(
                "retry attempt counts must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(AnalysisError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        let prefix = c.staging_prefix.trim_matches('/').to_string();
        if prefix.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "staging_prefix must not be empty".into(),
            ));
        }
        c.staging_prefix = prefix;
        Ok(self.config)
    }
}

/// How the per-segment partial results are combined into one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SynthesisStrategy {
    /// One extra inference call merges the partials (default). Also
    /// normalises formatting, so it runs even for a single partial.
    #[default]
    Inference,
    /// Merge in-process with the deterministic union / first-non-null rules.
    /// No inference spend, but no semantic de-duplication either.
    Local,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let c = AnalysisConfig::default();
        assert_eq!(c.pages_per_segment, 10);
        assert_eq!(c.media_segment_secs, 300);
        assert_eq!(c.concurrency, 3);
        assert_eq!(c.inference_attempts, 3);
        assert_eq!(c.retry_base_ms, 1500);
        assert_eq!(c.api_timeout_secs, 120);
        assert_eq!(c.synthesis, SynthesisStrategy::Inference);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = AnalysisConfig::builder().concurrency(0).build().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn zero_pages_rejected() {
        assert!(AnalysisConfig::builder().pages_per_segment(0).build().is_err());
    }

    #[test]
    fn staging_prefix_is_trimmed() {
        let c = AnalysisConfig::builder()
            .staging_prefix("/scratch/chunks/")
            .build()
            .unwrap();
        assert_eq!(c.staging_prefix, "scratch/chunks");
        assert!(AnalysisConfig::builder().staging_prefix("//").build().is_err());
    }

    #[test]
    fn retry_policies_follow_config() {
        let c = AnalysisConfig::builder()
            .inference_attempts(4)
            .retry_base_ms(10)
            .build()
            .unwrap();
        let p = c.inference_retry();
        assert_eq!(p.attempts, 4);
        assert_eq!(p.delay_for(2), Duration::from_millis(40));
    }
}
