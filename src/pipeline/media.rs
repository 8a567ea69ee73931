//! Media splitting: fixed-duration segments via ffmpeg's segment muxer.
//!
//! Audio is down-mixed to mono, resampled and re-encoded as MP3 at a low
//! bitrate. Video is scaled down to a bounded height, re-encoded as H.264
//! with a keyframe forced at every slice boundary (so the muxer can cut
//! exactly there) and muxed as MP4 with mono AAC audio. Either way, one
//! slice of the reference length stays a few MiB.

use crate::artifact::MediaKind;
use crate::cancel::CancelSignal;
use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::segment::{expected_media_segments, Segment, SegmentSet, SegmentSpan};
use crate::pipeline::tool::{run_tool, ToolError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Output container for one media kind.
struct Container {
    extension: &'static str,
    mime_type: &'static str,
}

fn container_for(kind: MediaKind) -> Container {
    match kind {
        MediaKind::Video => Container {
            extension: "mp4",
            mime_type: "video/mp4",
        },
        _ => Container {
            extension: "mp3",
            mime_type: "audio/mpeg",
        },
    }
}

/// ffmpeg arguments that split `source` into `out_dir/seg_%04d.<ext>`.
pub fn transcode_args(source: &Path, kind: MediaKind, out_dir: &Path, config: &AnalysisConfig) -> Vec<String> {
    let slice = config.media_segment_secs;
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(source.display().to_string());

    let bitrate = format!("{}k", config.audio_bitrate_kbps);
    match kind {
        MediaKind::Video => {
            args.extend([
                "-vf".to_string(),
                format!("scale=-2:'min({},ih)'", config.video_max_height),
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                "veryfast".into(),
                "-crf".into(),
                "30".into(),
                "-force_key_frames".into(),
                format!("expr:gte(t,n_forced*{slice})"),
                "-c:a".into(),
                "aac".into(),
                "-ac".into(),
                "1".into(),
                "-b:a".into(),
                bitrate,
                "-segment_format".into(),
                "mp4".into(),
            ]);
        }
        _ => {
            args.extend([
                "-vn".to_string(),
                "-ac".into(),
                "1".into(),
                "-ar".into(),
                config.audio_sample_rate_hz.to_string(),
                "-c:a".into(),
                "libmp3lame".into(),
                "-b:a".into(),
                bitrate,
            ]);
        }
    }

    args.extend([
        "-f".to_string(),
        "segment".into(),
        "-segment_time".into(),
        slice.to_string(),
        "-reset_timestamps".into(),
        "1".into(),
    ]);
    let ext = container_for(kind).extension;
    args.push(out_dir.join(format!("seg_%04d.{ext}")).display().to_string());
    args
}

/// Split `source` into fixed-duration segments under `out_dir`, then
/// delete `source`.
pub async fn split_media(
    source: &Path,
    kind: MediaKind,
    out_dir: &Path,
    config: &AnalysisConfig,
    cancel: &CancelSignal,
) -> Result<SegmentSet, AnalysisError> {
    let container = container_for(kind);
    let duration = probe_duration(source, config, cancel).await;

    let args = transcode_args(source, kind, out_dir, config);
    run_tool(
        &config.ffmpeg_program,
        &args,
        Duration::from_secs(config.transcode_timeout_secs),
        cancel,
    )
    .await
    .map_err(|e| match e {
        ToolError::Cancelled { .. } => AnalysisError::Cancelled {
            stage: "segmentation",
        },
        other => AnalysisError::SegmentationFailed {
            reason: format!("transcoding failed: {other}"),
        },
    })?;

    let files = collect_segments(out_dir, container.extension).await?;
    if let Err(e) = tokio::fs::remove_file(source).await {
        warn!("Could not delete source media {}: {}", source.display(), e);
    }

    if let Some(d) = duration {
        let expected = expected_media_segments(d, config.media_segment_secs);
        if expected != files.len() {
            warn!(
                "Transcoder produced {} segments, expected {} for {:.1}s",
                files.len(),
                expected,
                d
            );
        }
    }
    info!("Split {} into {} segments", kind, files.len());

    let slice = config.media_segment_secs;
    let segments = files
        .into_iter()
        .enumerate()
        .map(|(ordinal, path)| {
            let start_secs = ordinal as u64 * slice;
            let nominal_end = start_secs + slice;
            let end_secs = match duration {
                Some(d) => nominal_end.min(d.ceil() as u64).max(start_secs),
                None => nominal_end,
            };
            Segment {
                ordinal,
                path,
                span: SegmentSpan::Time { start_secs, end_secs },
            }
        })
        .collect();

    Ok(SegmentSet {
        segments,
        mime_type: container.mime_type.to_string(),
        extension: container.extension.to_string(),
    })
}

/// Produced segment files, in name (= time) order.
async fn collect_segments(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, AnalysisError> {
    let io = |e: std::io::Error| AnalysisError::SegmentationFailed {
        reason: format!("cannot list {}: {e}", dir.display()),
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io)? {
        let path = entry.path();
        let is_segment = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("seg_") && n.ends_with(&format!(".{extension}")));
        if is_segment {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Duration in seconds via ffprobe; `None` when the probe is unavailable or
/// unreadable.
async fn probe_duration(source: &Path, config: &AnalysisConfig, cancel: &CancelSignal) -> Option<f64> {
    let args = vec![
        "-v".to_string(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        source.display().to_string(),
    ];
    match run_tool(&config.ffprobe_program, &args, Duration::from_secs(60), cancel).await {
        Ok(out) => {
            let parsed = parse_duration(&out.stdout);
            debug!("Probed duration: {:?}", parsed);
            parsed
        }
        Err(e) => {
            debug!("Duration probe skipped: {}", e);
            None
        }
    }
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|l| l.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AnalysisConfig {
        AnalysisConfig::builder().media_segment_secs(300).build().unwrap()
    }

    #[test]
    fn audio_args_downmix_and_segment() {
        let args = transcode_args(Path::new("/w/in.wav"), MediaKind::Audio, Path::new("/w/out"), &config());
        let joined = args.join(" ");
        assert!(joined.contains("-ac 1 -ar 16000 -c:a libmp3lame -b:a 64k"));
        assert!(joined.contains("-f segment -segment_time 300 -reset_timestamps 1"));
        assert!(joined.contains("-vn"));
        assert_eq!(args.last().unwrap(), "/w/out/seg_%04d.mp3");
    }

    #[test]
    fn video_args_scale_and_key_frames() {
        let args = transcode_args(Path::new("/w/in.mov"), MediaKind::Video, Path::new("/w/out"), &config());
        let joined = args.join(" ");
        assert!(joined.contains("scale=-2:'min(480,ih)'"));
        assert!(joined.contains("expr:gte(t,n_forced*300)"));
        assert!(joined.contains("-segment_format mp4"));
        assert!(!joined.contains("-vn"));
        assert_eq!(args.last().unwrap(), "/w/out/seg_%04d.mp4");
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("901.250000\n"), Some(901.25));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[tokio::test]
    async fn collects_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["seg_0002.mp3", "seg_0000.mp3", "seg_0001.mp3", "other.mp3", "seg_0003.mp4"] {
            tokio::fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        let files = collect_segments(dir.path(), "mp3").await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["seg_0000.mp3", "seg_0001.mp3", "seg_0002.mp3"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fake_transcoder_produces_time_spans() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("segments");
        tokio::fs::create_dir(&out).await.unwrap();
        let source = dir.path().join("talk.mp3");
        tokio::fs::write(&source, b"ID3").await.unwrap();

        // stands in for ffmpeg: writes three slices next to the output pattern
        let script = dir.path().join("fake-ffmpeg");
        tokio::fs::write(
            &script,
            "#!/bin/sh\nfor a; do last=\"$a\"; done\nd=$(dirname \"$last\")\nfor i in 0000 0001 0002; do echo x > \"$d/seg_$i.mp3\"; done\n",
        )
        .await
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = AnalysisConfig::builder()
            .ffmpeg_program(&script)
            .ffprobe_program("/nonexistent/ffprobe")
            .build()
            .unwrap();
        let set = split_media(&source, MediaKind::Audio, &out, &config, &CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.mime_type, "audio/mpeg");
        assert_eq!(
            set.segments[1].span,
            SegmentSpan::Time { start_secs: 300, end_secs: 600 }
        );
        assert!(!source.exists());
    }
}
