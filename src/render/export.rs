// SYNOID Export
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// One export request: stage the input, render overlay images, run one
// encode, move the result into place. Every temporary file lives in a
// per-request workspace directory that is removed when the request ends,
// whether it succeeded, failed or was dropped midway.

use rand::Rng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::render::bgm::{BgmSource, BgmTrack};
use crate::render::encoder::{EncodeJob, Encoder, ExtraInput, InputMode, TextImageJob};
use crate::render::plan::{build_render_plan, PlanInput, PlanOptions};
use crate::timeline::models::RenderTimeline;

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub source: PathBuf,
    pub timeline: RenderTimeline,
    pub destination: PathBuf,
    /// Generated when not supplied
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub request_id: String,
    pub output: PathBuf,
    pub clip_count: usize,
    pub total_duration: f64,
    pub text_overlays: usize,
    pub frame_size: (u32, u32),
    pub bgm: Option<PathBuf>,
}

/// `export-{millis}-{6 hex}`; unique enough that concurrent requests never
/// share a workspace.
pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("export-{}-{:06x}", millis, suffix)
}

/// Scratch directory owned by one request. Removed on drop.
#[derive(Debug)]
pub struct ExportWorkspace {
    dir: PathBuf,
}

impl ExportWorkspace {
    pub fn create(scratch_root: &Path, request_id: &str) -> Result<Self, ExportError> {
        let dir = scratch_root.join(format!("synoid-{}", request_id));
        fs::create_dir_all(scratch_root)?;
        // create_dir fails atomically when another request holds the name
        fs::create_dir(&dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ExportError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("workspace {:?} already in use", dir),
                ))
            } else {
                ExportError::Io(e)
            }
        })?;
        debug!("[EXPORT] Workspace {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for ExportWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!("[EXPORT] 🧹 Removed workspace {:?}", self.dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("[EXPORT] Failed to remove workspace {:?}: {}", self.dir, e),
        }
    }
}

fn extension_or(path: &Path, fallback: &str) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Link the source into the workspace, copying when a link is not possible.
async fn stage_input(source: &Path, staged: &Path) -> Result<(), ExportError> {
    if tokio::fs::hard_link(source, staged).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(source, staged).await?;
    Ok(())
}

/// Move the finished file to its destination, copying across filesystems.
async fn persist(temp_output: &Path, destination: &Path) -> Result<(), ExportError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(temp_output, destination).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(temp_output, destination).await?;
    Ok(())
}

async fn resolve_bgm(
    timeline: &RenderTimeline,
    source: Option<&dyn BgmSource>,
) -> Option<BgmTrack> {
    let edit = timeline.bgm_edits.first()?;
    if timeline.bgm_edits.len() > 1 {
        warn!("[EXPORT] {} bgm edits; only the first is mixed", timeline.bgm_edits.len());
    }
    let Some(source) = source else {
        warn!("[EXPORT] bgm '{}' requested but no music source configured", edit.keywords);
        return None;
    };
    match source.resolve(&edit.keywords).await {
        Ok(track) => Some(track),
        Err(e) => {
            warn!("[EXPORT] Skipping bgm '{}': {}", edit.keywords, e);
            None
        }
    }
}

/// Run one export request end to end.
pub async fn export_timeline(
    encoder: &dyn Encoder,
    bgm: Option<&dyn BgmSource>,
    config: &ExportConfig,
    request: ExportRequest,
) -> Result<ExportReport, ExportError> {
    let timeline = &request.timeline;
    if timeline.is_empty() {
        warn!("[EXPORT] Nothing to render: every clip was deleted");
        return Err(ExportError::NothingToRender);
    }

    let request_id = request.request_id.clone().unwrap_or_else(new_request_id);
    info!(
        "[EXPORT] 🚀 {} : {:?} -> {:?} ({} clips, {:.2}s)",
        request_id,
        request.source,
        request.destination,
        timeline.clips.len(),
        timeline.total_timeline_duration
    );

    let workspace = ExportWorkspace::create(&config.scratch_dir(), &request_id)?;

    let staged = workspace.path(&format!("input.{}", extension_or(&request.source, "mp4")));
    stage_input(&request.source, &staged).await?;

    let frame_size = match encoder.probe_frame_size(&staged).await {
        Ok(size) => size,
        Err(e) => {
            warn!(
                "[EXPORT] Frame size probe failed ({}), assuming {}x{}",
                e, config.fallback_width, config.fallback_height
            );
            (config.fallback_width, config.fallback_height)
        }
    };

    let bgm_track = resolve_bgm(timeline, bgm).await;
    let plan = build_render_plan(
        timeline,
        &PlanOptions {
            frame_width: frame_size.0,
            frame_height: frame_size.1,
            mix_bgm: bgm_track.is_some(),
        },
    )?;

    // Overlay images must all exist before the encoder starts.
    let mut extra_inputs = Vec::new();
    let mut text_overlays = 0;
    for (input_index, input) in plan.inputs.iter().enumerate() {
        match input {
            PlanInput::Source => {}
            PlanInput::TextImage {
                overlay,
                text,
                position,
                loop_seconds,
            } => {
                let image = workspace.path(&format!("text-{}.png", input_index));
                let job = TextImageJob {
                    index: *overlay,
                    text: text.clone(),
                    position: *position,
                    width: frame_size.0,
                    height: frame_size.1,
                };
                encoder.render_text_image(&job, &image).await?;
                extra_inputs.push(ExtraInput {
                    path: image,
                    mode: InputMode::StillLoop {
                        seconds: *loop_seconds,
                    },
                });
                text_overlays += 1;
            }
            PlanInput::Bgm { .. } => {
                if let Some(track) = &bgm_track {
                    extra_inputs.push(ExtraInput {
                        path: track.path.clone(),
                        mode: InputMode::StreamLoop,
                    });
                }
            }
        }
    }

    let temp_output = workspace.path(&format!(
        "output.{}",
        extension_or(&request.destination, "mp4")
    ));
    let job = EncodeJob {
        source: staged,
        filter_graph: plan.filter_graph.clone(),
        extra_inputs,
        output_map: plan.output_map.clone(),
        duration_cap: plan.duration_hint,
        output: temp_output.clone(),
    };

    let outcome = encoder.encode(&job).await?;
    if !outcome.success() {
        error!("[EXPORT] ❌ {} failed with {:?}", request_id, outcome.exit_code);
        return Err(ExportError::EncoderFailed {
            code: outcome.exit_code,
            stderr_tail: outcome.stderr_tail,
        });
    }

    persist(&temp_output, &request.destination).await?;
    drop(workspace);
    info!("[EXPORT] ✅ {} written to {:?}", request_id, request.destination);

    Ok(ExportReport {
        request_id,
        output: request.destination.clone(),
        clip_count: timeline.clips.len(),
        total_duration: plan.total_duration,
        text_overlays,
        frame_size,
        bgm: bgm_track.map(|t| t.path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_request_ids_are_unique() {
        let ids: HashSet<String> = (0..200).map(|_| new_request_id()).collect();
        assert_eq!(ids.len(), 200);
        assert!(ids.iter().all(|id| id.starts_with("export-")));
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let workspace = ExportWorkspace::create(root.path(), "export-1-abcdef").unwrap();
            fs::write(workspace.path("text-1.png"), b"png").unwrap();
            workspace.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn test_workspace_refuses_reuse() {
        let root = tempfile::tempdir().unwrap();
        let _first = ExportWorkspace::create(root.path(), "same").unwrap();
        assert!(ExportWorkspace::create(root.path(), "same").is_err());
    }

    #[test]
    fn test_racing_requests_claim_one_workspace() {
        let root = tempfile::tempdir().unwrap();
        let scratch = root.path().join("nested").join("scratch");
        let barrier = std::sync::Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scratch = scratch.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    ExportWorkspace::create(&scratch, "shared-id").ok()
                })
            })
            .collect();
        let claimed: Vec<ExportWorkspace> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(claimed.len(), 1);
        assert!(claimed[0].dir().exists());
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(extension_or(Path::new("a/b.mov"), "mp4"), "mov");
        assert_eq!(extension_or(Path::new("a/b"), "mp4"), "mp4");
    }
}
