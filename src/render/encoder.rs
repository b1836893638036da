// SYNOID Encoder Adapter
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// The only component that spawns processes. `Encoder` is the seam the export
// path talks to; `FfmpegEncoder` drives the ffmpeg/ffprobe binaries.
//
// Every child is spawned with kill_on_drop, so dropping an in-flight export
// future kills the encoder with it.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::render::overlay::{canvas_source, text_image_filter};
use crate::timeline::models::TextPosition;
use crate::timeline::time::format_seconds;

const STDERR_TAIL_LINES: usize = 20;

/// How an extra input is fed to the encoder
#[derive(Debug, Clone, PartialEq)]
pub enum InputMode {
    /// A single image repeated for `seconds`
    StillLoop { seconds: f64 },
    /// A media stream restarted until the output ends
    StreamLoop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtraInput {
    pub path: PathBuf,
    pub mode: InputMode,
}

/// Everything one encode needs: `(source, filter graph, extra inputs, output)`.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub source: PathBuf,
    pub filter_graph: String,
    pub extra_inputs: Vec<ExtraInput>,
    pub output_map: Vec<String>,
    pub duration_cap: Option<f64>,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TextImageJob {
    pub index: usize,
    pub text: String,
    pub position: TextPosition,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOutcome {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stderr_tail: String,
}

impl EncodeOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn probe_frame_size(&self, path: &Path) -> Result<(u32, u32), ExportError>;

    async fn probe_duration(&self, path: &Path) -> Result<f64, ExportError>;

    /// Write one transparent full-frame PNG for a text overlay.
    async fn render_text_image(&self, job: &TextImageJob, output: &Path) -> Result<(), ExportError>;

    /// Run the main encode. A non-zero exit is an `Ok` outcome; only failing
    /// to run the encoder at all is an error.
    async fn encode(&self, job: &EncodeJob) -> Result<EncodeOutcome, ExportError>;
}

/// Keep relative paths that start with `-` from being read as options.
pub fn safe_arg_path(path: &Path) -> PathBuf {
    if path.is_relative() && path.to_string_lossy().starts_with('-') {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let from = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[from..].join("\n")
}

pub struct FfmpegEncoder {
    config: ExportConfig,
}

impl FfmpegEncoder {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Full ffmpeg argument list for an encode job
    pub fn build_args(&self, job: &EncodeJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into(), "-hide_banner".into()];
        args.push("-i".into());
        args.push(safe_arg_path(&job.source).into());

        for input in &job.extra_inputs {
            match input.mode {
                InputMode::StillLoop { seconds } => {
                    args.extend(["-loop", "1", "-t"].map(OsString::from));
                    args.push(format_seconds(seconds).into());
                }
                InputMode::StreamLoop => {
                    args.extend(["-stream_loop", "-1"].map(OsString::from));
                }
            }
            args.push("-i".into());
            args.push(safe_arg_path(&input.path).into());
        }

        args.push("-filter_complex".into());
        args.push(job.filter_graph.clone().into());
        for label in &job.output_map {
            args.push("-map".into());
            args.push(label.into());
        }

        let config = &self.config;
        for (flag, value) in [
            ("-c:v", &config.video_codec),
            ("-b:v", &config.video_bitrate),
            ("-c:a", &config.audio_codec),
            ("-b:a", &config.audio_bitrate),
        ] {
            args.push(flag.into());
            args.push(value.into());
        }
        args.extend(["-pix_fmt", "yuv420p"].map(OsString::from));

        if let Some(cap) = job.duration_cap {
            args.push("-t".into());
            args.push(format_seconds(cap).into());
        }
        args.push(safe_arg_path(&job.output).into());
        args
    }

    async fn run(&self, bin: &str, args: &[OsString]) -> Result<Output, ExportError> {
        Command::new(bin)
            .kill_on_drop(true)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ExportError::EncoderNotFound(bin.to_string()),
                _ => ExportError::Io(e),
            })
    }

    async fn probe(&self, path: &Path, entries: &str, format: &str) -> Result<String, ExportError> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "v:0".into(),
            "-show_entries".into(),
            entries.into(),
            "-of".into(),
            format.into(),
            safe_arg_path(path).into(),
        ];
        let limit = Duration::from_secs(self.config.probe_timeout_secs.max(1));
        let output = timeout(limit, self.run(&self.config.ffprobe_bin, &args))
            .await
            .map_err(|_| ExportError::Probe {
                path: path.to_path_buf(),
                reason: format!("ffprobe timed out after {}s", limit.as_secs()),
            })??;

        if !output.status.success() {
            return Err(ExportError::Probe {
                path: path.to_path_buf(),
                reason: stderr_tail(&output.stderr),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Parse ffprobe's `WIDTHxHEIGHT` line
fn parse_frame_size(text: &str) -> Option<(u32, u32)> {
    let line = text.lines().next()?.trim();
    let (w, h) = line.split_once('x')?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().trim_end_matches('x').parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn probe_frame_size(&self, path: &Path) -> Result<(u32, u32), ExportError> {
        let text = self.probe(path, "stream=width,height", "csv=s=x:p=0").await?;
        parse_frame_size(&text).ok_or_else(|| ExportError::Probe {
            path: path.to_path_buf(),
            reason: format!("unreadable frame size {:?}", text),
        })
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, ExportError> {
        let text = self
            .probe(path, "format=duration", "default=noprint_wrappers=1:nokey=1")
            .await?;
        text.parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| ExportError::Probe {
                path: path.to_path_buf(),
                reason: format!("unreadable duration {:?}", text),
            })
    }

    async fn render_text_image(&self, job: &TextImageJob, output: &Path) -> Result<(), ExportError> {
        let filter = text_image_filter(
            &job.text,
            job.position,
            job.height,
            self.config.font_file.as_deref(),
        );
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            canvas_source(job.width, job.height).into(),
            "-vf".into(),
            filter.into(),
            "-frames:v".into(),
            "1".into(),
            safe_arg_path(output).into(),
        ];
        debug!("[ENCODER] Rendering text overlay {} to {:?}", job.index, output);

        let result = self.run(&self.config.ffmpeg_bin, &args).await?;
        if !result.status.success() {
            return Err(ExportError::OverlayFailed {
                index: job.index,
                reason: stderr_tail(&result.stderr),
            });
        }
        Ok(())
    }

    async fn encode(&self, job: &EncodeJob) -> Result<EncodeOutcome, ExportError> {
        let args = self.build_args(job);
        info!(
            "[ENCODER] {} {}",
            self.config.ffmpeg_bin,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = self.run(&self.config.ffmpeg_bin, &args).await?;
        let outcome = EncodeOutcome {
            exit_code: output.status.code(),
            stderr_tail: stderr_tail(&output.stderr),
        };
        if outcome.success() {
            info!("[ENCODER] ✅ Encode complete: {:?}", job.output);
        } else {
            warn!("[ENCODER] ❌ Encode failed ({:?}): {}", outcome.exit_code, outcome.stderr_tail);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> EncodeJob {
        EncodeJob {
            source: PathBuf::from("/tmp/in.mp4"),
            filter_graph: "[0:v]null[outv];[0:a]anull[outa]".to_string(),
            extra_inputs: vec![
                ExtraInput {
                    path: PathBuf::from("/tmp/text-0.png"),
                    mode: InputMode::StillLoop { seconds: 21.0 },
                },
                ExtraInput {
                    path: PathBuf::from("/tmp/bgm.mp3"),
                    mode: InputMode::StreamLoop,
                },
            ],
            output_map: vec!["[outv]".to_string(), "[outa]".to_string()],
            duration_cap: Some(20.5),
            output: PathBuf::from("/tmp/out.mp4"),
        }
    }

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_args_wire_inputs_in_order() {
        let encoder = FfmpegEncoder::new(ExportConfig::default());
        let args = as_strings(&encoder.build_args(&job()));
        let joined = args.join(" ");

        assert!(joined.starts_with("-y -hide_banner -i /tmp/in.mp4 -loop 1 -t 21 -i /tmp/text-0.png -stream_loop -1 -i /tmp/bgm.mp3 -filter_complex"));
        assert!(joined.contains("-map [outv] -map [outa] -c:v libx264 -b:v 4000k -c:a aac -b:a 128k"));
        assert!(joined.ends_with("-t 20.5 /tmp/out.mp4"));
    }

    #[test]
    fn test_no_cap_without_duration_hint() {
        let encoder = FfmpegEncoder::new(ExportConfig::default());
        let mut plain = job();
        plain.extra_inputs.clear();
        plain.duration_cap = None;
        let args = as_strings(&encoder.build_args(&plain));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[test]
    fn test_dash_paths_are_guarded() {
        assert_eq!(safe_arg_path(Path::new("-evil.mp4")), PathBuf::from("./-evil.mp4"));
        assert_eq!(safe_arg_path(Path::new("/abs/-x.mp4")), PathBuf::from("/abs/-x.mp4"));
    }

    #[test]
    fn test_parse_frame_size() {
        assert_eq!(parse_frame_size("1920x1080\n"), Some((1920, 1080)));
        assert_eq!(parse_frame_size("1280x720x\n"), Some((1280, 720)));
        assert_eq!(parse_frame_size("N/A"), None);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let noisy: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(noisy.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let encoder = FfmpegEncoder::new(ExportConfig {
            ffmpeg_bin: "synoid-no-such-ffmpeg".to_string(),
            ..Default::default()
        });
        let result = encoder.encode(&job()).await;
        assert!(matches!(result, Err(ExportError::EncoderNotFound(_))));
    }
}
