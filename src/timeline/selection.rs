// SYNOID Segment Selection
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Scores analysed segments against a style/focus/template intent and picks
// enough of them to fill a target duration. The result is a candidate
// timeline: ordered clips with no edit semantics yet.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::timeline::models::{CandidateClip, CandidateTimeline, Segment};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Fast,
    Slow,
    #[default]
    Balanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    #[default]
    None,
    Face,
    Action,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    #[default]
    General,
    Vlog,
    Sport,
    Story,
}

/// Immutable selection request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Intent {
    pub target_duration: f64,
    pub style: Style,
    pub focus: Focus,
    pub template: Template,
    pub keep_start: bool,
    pub keep_end: bool,
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            target_duration: 30.0,
            style: Style::Balanced,
            focus: Focus::None,
            template: Template::General,
            keep_start: true,
            keep_end: false,
        }
    }
}

fn style_score(segment: &Segment, intent: &Intent) -> f64 {
    match intent.style {
        Style::Fast => segment.energy,
        Style::Slow => 1.0 - segment.energy,
        Style::Balanced => 0.5 + segment.energy * 0.5,
    }
}

fn template_score(segment: &Segment, intent: &Intent) -> f64 {
    let tags = &segment.tags;
    match intent.template {
        Template::Vlog => bonus(tags.has_face, 0.25) + tags.speech_density * 0.2,
        Template::Sport => bonus(tags.has_action, 0.3) + tags.motion_score * 0.25,
        Template::Story => bonus(tags.has_dialogue, 0.2) + (1.0 - segment.energy) * 0.2,
        Template::General => 0.1,
    }
}

fn focus_score(segment: &Segment, intent: &Intent) -> f64 {
    match intent.focus {
        Focus::Face => bonus(segment.tags.has_face, 0.3),
        Focus::Action => bonus(segment.tags.has_action, 0.3),
        Focus::None => 0.0,
    }
}

fn bonus(flag: bool, value: f64) -> f64 {
    if flag {
        value
    } else {
        0.0
    }
}

/// Weighted score used to rank segments
pub fn score_segment(segment: &Segment, intent: &Intent) -> f64 {
    style_score(segment, intent) + focus_score(segment, intent) + template_score(segment, intent)
}

/// Human-readable explanation of which rules fired.
pub fn build_reason(segment: &Segment, intent: &Intent) -> String {
    let tags = &segment.tags;
    let mut parts = Vec::new();

    if intent.style == Style::Fast && segment.energy > 0.7 {
        parts.push("high-energy segment");
    }
    if intent.style == Style::Slow && segment.energy < 0.45 {
        parts.push("low-energy segment");
    }
    if intent.focus == Focus::Face && tags.has_face {
        parts.push("contains people");
    }
    if intent.focus == Focus::Action && tags.has_action {
        parts.push("clear action");
    }
    if intent.template == Template::Vlog && tags.has_dialogue {
        parts.push("dense dialogue");
    }
    if intent.template == Template::Sport && tags.motion_score > 0.6 {
        parts.push("high motion intensity");
    }
    if intent.template == Template::Story && tags.has_dialogue {
        parts.push("narrative beat");
    }
    if intent.focus == Focus::None {
        parts.push("balanced coverage");
    }
    if parts.is_empty() {
        parts.push("best overall score");
    }

    parts.join(" · ")
}

/// Pick segments for a candidate timeline.
///
/// Anchors (first and, when asked and there are at least two segments, last)
/// are always kept. Remaining segments are added best-score first until the
/// target is met; equal scores keep their input order. The returned clips are
/// chronological regardless of selection order.
pub fn build_timeline(segments: &[Segment], intent: &Intent) -> CandidateTimeline {
    let media_duration = segments.iter().map(|s| s.end).fold(0.0_f64, f64::max);
    let target_duration = intent.target_duration.min(media_duration).max(0.0);

    let mut selected: Vec<CandidateClip> = Vec::new();
    fn reserve(segment: &Segment, reason: &str, selected: &mut Vec<CandidateClip>) {
        if !selected.iter().any(|c| c.id == segment.id) {
            selected.push(CandidateClip::from_segment(segment, reason));
        }
    }

    if intent.keep_start {
        if let Some(first) = segments.first() {
            reserve(first, "kept opening", &mut selected);
        }
    }
    if intent.keep_end && segments.len() > 1 {
        if let Some(last) = segments.last() {
            reserve(last, "kept ending", &mut selected);
        }
    }

    let mut ranked: Vec<(&Segment, f64)> = segments
        .iter()
        .map(|segment| (segment, score_segment(segment, intent)))
        .collect();
    // sort_by is stable: ties stay in input order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut accumulated: f64 = selected.iter().map(|c| c.duration).sum();
    for (segment, score) in ranked {
        if accumulated >= target_duration {
            break;
        }
        if selected.iter().any(|c| c.id == segment.id) {
            continue;
        }
        debug!("[SELECT] + {} (score {:.3})", segment.id, score);
        selected.push(CandidateClip::from_segment(segment, build_reason(segment, intent)));
        accumulated += segment.duration;
    }

    selected.sort_by(|a, b| a.start.total_cmp(&b.start));
    let total_duration = selected.iter().map(|c| c.duration).sum();

    info!(
        "[SELECT] Picked {}/{} segments ({:.2}s of {:.2}s target)",
        selected.len(),
        segments.len(),
        total_duration,
        target_duration
    );

    CandidateTimeline {
        clips: selected,
        total_duration,
        target_duration,
    }
}
