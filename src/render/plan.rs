// SYNOID Render Plan Builder
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Turns a compiled RenderTimeline into an encoder filter graph plus the
// input and output wiring. Pure: never touches the filesystem.
//
// Input 0 is always the source. Text overlay images follow in overlay
// order, then the background music track if one is mixed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PlanError;
use crate::render::graph::{FilterGraph, FilterStage};
use crate::timeline::models::{
    Clip, OverlayContent, RenderTimeline, TextPosition, TimedOverlay, Transform,
};
use crate::timeline::time::{effective_rate, format_seconds, round_to};

/// atempo is only accurate inside this band.
const TEMPO_MIN: f64 = 0.5;
const TEMPO_MAX: f64 = 2.0;
const MIN_FADE_SECONDS: f64 = 0.1;

/// Output frame geometry and optional mixes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Mix the first bgm edit as an extra audio input
    pub mix_bgm: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            frame_width: 1920,
            frame_height: 1080,
            mix_bgm: true,
        }
    }
}

/// One encoder input, in `-i` order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanInput {
    Source,
    /// Still PNG looped for `loop_seconds`
    TextImage {
        overlay: usize,
        text: String,
        position: TextPosition,
        loop_seconds: f64,
    },
    /// Audio track looped for the whole output
    Bgm { keywords: String, volume: f64 },
}

impl PlanInput {
    pub fn is_looped(&self) -> bool {
        !matches!(self, PlanInput::Source)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub inputs: Vec<PlanInput>,
    pub filter_graph: String,
    pub output_map: Vec<String>,
    /// Output cap, set whenever a looped input could outlast the timeline
    pub duration_hint: Option<f64>,
    pub total_duration: f64,
}

impl RenderPlan {
    pub fn text_images(&self) -> impl Iterator<Item = (usize, &PlanInput)> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| matches!(input, PlanInput::TextImage { .. }))
    }

    pub fn bgm_input(&self) -> Option<(usize, &PlanInput)> {
        self.inputs
            .iter()
            .enumerate()
            .find(|(_, input)| matches!(input, PlanInput::Bgm { .. }))
    }
}

/// Decompose a playback rate into atempo steps that each stay in [0.5, 2.0].
///
/// 5.0 -> [2.0, 2.0, 1.25]; 0.2 -> [0.5, 0.5, 0.8].
pub fn tempo_chain(rate: f64) -> Vec<f64> {
    let mut remaining = effective_rate(rate);
    let mut steps = Vec::new();
    while remaining > TEMPO_MAX {
        steps.push(TEMPO_MAX);
        remaining /= TEMPO_MAX;
    }
    while remaining < TEMPO_MIN {
        steps.push(TEMPO_MIN);
        remaining /= TEMPO_MIN;
    }
    steps.push(round_to(remaining, 4));
    steps
}

/// Video filters for a clip transform. The output frame stays `width`x`height`
/// so every clip can still be concatenated.
pub fn transform_filters(transform: &Transform, width: u32, height: u32) -> Vec<String> {
    if transform.is_identity() {
        return Vec::new();
    }
    let mut filters = Vec::new();

    if let Some(crop) = transform.crop {
        let cw = crop.width.clamp(0.01, 1.0);
        let ch = crop.height.clamp(0.01, 1.0);
        let cx = crop.x.clamp(0.0, 1.0 - cw);
        let cy = crop.y.clamp(0.0, 1.0 - ch);
        filters.push(format!(
            "crop=iw*{:.4}:ih*{:.4}:iw*{:.4}:ih*{:.4}",
            cw, ch, cx, cy
        ));
        filters.push(format!("scale={}:{}", width, height));
    }

    let scale = transform.scale;
    if scale > 1.0 {
        filters.push(format!(
            "scale=trunc(iw*{:.4}/2)*2:trunc(ih*{:.4}/2)*2",
            scale, scale
        ));
        // crop clips its own x/y into the frame
        let dx = round_to(transform.x * width as f64, 0);
        let dy = round_to(transform.y * height as f64, 0);
        filters.push(format!(
            "crop={w}:{h}:(iw-{w})/2+({dx}):(ih-{h})/2+({dy})",
            w = width,
            h = height,
            dx = dx,
            dy = dy
        ));
    } else if scale < 1.0 {
        filters.push(format!(
            "scale=trunc(iw*{:.4}/2)*2:trunc(ih*{:.4}/2)*2",
            scale, scale
        ));
        filters.push(format!(
            "pad={}:{}:(ow-iw)/2:(oh-ih)/2:color=black",
            width, height
        ));
    }

    if transform.rotate != 0.0 {
        filters.push(format!(
            "rotate={:.4}*PI/180:ow=iw:oh=ih:c=black",
            transform.rotate
        ));
    }
    if transform.flip_x {
        filters.push("hflip".to_string());
    }
    if transform.flip_y {
        filters.push("vflip".to_string());
    }
    filters
}

fn video_stage(index: usize, clip: &Clip, options: &PlanOptions) -> FilterStage {
    let rate = effective_rate(clip.playback_rate);
    let mut filters = vec![
        format!(
            "trim=start={}:end={}",
            format_seconds(clip.start),
            format_seconds(clip.end)
        ),
        // Reset before rescaling or the rescaled clip stalls on its first frame.
        "setpts=PTS-STARTPTS".to_string(),
        format!("setpts={:.4}*PTS", 1.0 / rate),
    ];
    if let Some(transform) = &clip.transform {
        filters.extend(transform_filters(
            transform,
            options.frame_width,
            options.frame_height,
        ));
    }
    // concat needs matching SAR on every input
    filters.push("setsar=1".to_string());
    FilterStage::new(["0:v"], filters, [format!("v{}", index)])
}

fn audio_stage(index: usize, clip: &Clip) -> FilterStage {
    let mut filters = vec![
        format!(
            "atrim=start={}:end={}",
            format_seconds(clip.start),
            format_seconds(clip.end)
        ),
        "asetpts=PTS-STARTPTS".to_string(),
    ];
    filters.extend(
        tempo_chain(clip.playback_rate)
            .into_iter()
            .map(|step| format!("atempo={}", step)),
    );
    if (clip.volume - 1.0).abs() > f64::EPSILON {
        filters.push(format!("volume={:.3}", clip.volume.clamp(0.0, 1.0)));
    }
    FilterStage::new(["0:a"], filters, [format!("a{}", index)])
}

fn fade_window(overlay: &TimedOverlay) -> (f64, f64) {
    let start = overlay.timeline_start.max(0.0);
    let duration = (overlay.timeline_end - start).max(MIN_FADE_SECONDS);
    (start, duration)
}

/// Build the filter graph and input list for a compiled timeline.
pub fn build_render_plan(
    timeline: &RenderTimeline,
    options: &PlanOptions,
) -> Result<RenderPlan, PlanError> {
    if timeline.is_empty() {
        return Err(PlanError::NothingToRender);
    }

    let total = timeline.total_timeline_duration;
    let loop_seconds = total.ceil() + 1.0;
    let mut inputs = vec![PlanInput::Source];
    let mut graph = FilterGraph::new();

    for (i, clip) in timeline.clips.iter().enumerate() {
        debug!(
            "[PLAN] clip {} media {:.3}..{:.3} rate {} -> timeline {:.3}",
            i, clip.start, clip.end, clip.playback_rate, clip.timeline_start
        );
        graph.add_stage(video_stage(i, clip, options));
        graph.add_stage(audio_stage(i, clip));
    }

    let texts: Vec<(usize, &TimedOverlay, &str, TextPosition)> = timeline
        .text_edits
        .iter()
        .enumerate()
        .filter_map(|(i, overlay)| match &overlay.content {
            OverlayContent::Text { text, position } if !text.trim().is_empty() => {
                Some((i, overlay, text.as_str(), *position))
            }
            _ => None,
        })
        .collect();
    let fades: Vec<&TimedOverlay> = timeline
        .fade_edits
        .iter()
        .filter(|overlay| matches!(overlay.content, OverlayContent::Fade { .. }))
        .collect();
    let bgm = if options.mix_bgm {
        timeline.bgm_edits.first()
    } else {
        None
    };

    let post_process = !texts.is_empty() || !fades.is_empty() || bgm.is_some();
    let (concat_v, concat_a) = if post_process {
        ("concatv", "concata")
    } else {
        ("outv", "outa")
    };

    let pads: Vec<String> = (0..timeline.clips.len())
        .flat_map(|i| [format!("v{}", i), format!("a{}", i)])
        .collect();
    graph.add_stage(FilterStage::new(
        &pads,
        vec![format!("concat=n={}:v=1:a=1", timeline.clips.len())],
        [concat_v, concat_a],
    ));

    if post_process {
        let mut current_v = concat_v.to_string();
        let mut current_a = concat_a.to_string();

        for (i, overlay) in fades.iter().enumerate() {
            let OverlayContent::Fade { direction } = overlay.content else {
                continue;
            };
            let (start, duration) = fade_window(overlay);
            let next_v = format!("vfade{}", i);
            let next_a = format!("afade{}", i);
            graph.add_stage(FilterStage::single(
                &current_v,
                format!(
                    "fade=t={}:st={:.3}:d={:.3}",
                    direction.as_str(),
                    start,
                    duration
                ),
                &next_v,
            ));
            graph.add_stage(FilterStage::single(
                &current_a,
                format!(
                    "afade=t={}:st={:.3}:d={:.3}",
                    direction.as_str(),
                    start,
                    duration
                ),
                &next_a,
            ));
            current_v = next_v;
            current_a = next_a;
        }

        for (i, (overlay_index, overlay, text, position)) in texts.iter().enumerate() {
            let input_index = inputs.len();
            inputs.push(PlanInput::TextImage {
                overlay: *overlay_index,
                text: text.to_string(),
                position: *position,
                loop_seconds,
            });
            let image = format!("txt{}", i);
            let next_v = format!("vtxt{}", i);
            graph.add_stage(FilterStage::single(
                &format!("{}:v", input_index),
                "setpts=PTS-STARTPTS",
                &image,
            ));
            graph.add_stage(FilterStage::new(
                [current_v.as_str(), image.as_str()],
                vec![format!(
                    "overlay=0:0:enable='between(t,{:.3},{:.3})'",
                    overlay.timeline_start.max(0.0),
                    overlay.timeline_end.max(0.0)
                )],
                [next_v.as_str()],
            ));
            current_v = next_v;
        }

        if let Some(bgm) = bgm {
            let input_index = inputs.len();
            inputs.push(PlanInput::Bgm {
                keywords: bgm.keywords.clone(),
                volume: bgm.volume,
            });
            graph.add_stage(FilterStage::single(
                &format!("{}:a", input_index),
                format!("volume={:.3}", bgm.volume),
                "bgm",
            ));
            graph.add_stage(FilterStage::new(
                [current_a.as_str(), "bgm"],
                vec!["amix=inputs=2:duration=first:dropout_transition=0:normalize=0".to_string()],
                ["amix"],
            ));
            current_a = "amix".to_string();
        }

        graph.add_stage(FilterStage::single(&current_v, "null", "outv"));
        graph.add_stage(FilterStage::single(&current_a, "anull", "outa"));
    }

    let filter_graph = graph.to_filter_complex()?;
    let terminal = graph.terminal_pads();
    if terminal != ["outv", "outa"] {
        return Err(PlanError::DanglingPads(terminal));
    }
    let duration_hint = inputs.iter().any(PlanInput::is_looped).then_some(total);

    info!(
        "[PLAN] {} clips, {} fades, {} text overlays, bgm: {}, {} stages",
        timeline.clips.len(),
        fades.len(),
        texts.len(),
        bgm.is_some(),
        graph.stage_count()
    );

    Ok(RenderPlan {
        inputs,
        filter_graph,
        output_map: terminal.iter().map(|pad| format!("[{}]", pad)).collect(),
        duration_hint,
        total_duration: total,
    })
}
