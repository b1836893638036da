// SYNOID Timeline Models
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Data types shared by segment selection, the edit compiler and the render
// plan. All times are seconds. `start`/`end` fields are media time (the
// untouched source clock) unless the field name says timeline.

use serde::{Deserialize, Serialize};

use crate::timeline::time;

/// Analysis tags attached to a segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentTags {
    pub has_face: bool,
    pub has_action: bool,
    pub has_dialogue: bool,
    /// 0.0 = static, 1.0 = constant motion
    pub motion_score: f64,
    /// 0.0 = silent, 1.0 = wall-to-wall speech
    pub speech_density: f64,
}

/// One scored slice of the source media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub energy: f64,
    #[serde(default)]
    pub tags: SegmentTags,
}

impl Segment {
    pub fn new(start: f64, end: f64, energy: f64, tags: SegmentTags) -> Self {
        let tags = SegmentTags {
            motion_score: time::clamp_unit(tags.motion_score),
            speech_density: time::clamp_unit(tags.speech_density),
            ..tags
        };
        Self {
            id: segment_id(start, end),
            start,
            end,
            duration: (end - start).max(0.0),
            energy: time::clamp_unit(energy),
            tags,
        }
    }
}

/// Ids are derived from the range, so they change whenever analysis re-cuts.
pub fn segment_id(start: f64, end: f64) -> String {
    format!("{:.2}-{:.2}", start, end)
}

/// Vertical anchor of a text overlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

impl TextPosition {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "top" => Some(Self::Top),
            "center" | "centre" | "middle" => Some(Self::Center),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    In,
    Out,
}

impl FadeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Crop window expressed as fractions of the source frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Per-clip visual transform.
///
/// `x`/`y` shift the zoomed frame by a fraction of the output size and only
/// take effect when zooming in (`scale > 1`). `rotate` is in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transform {
    pub scale: f64,
    pub x: f64,
    pub y: f64,
    pub rotate: f64,
    pub flip_x: bool,
    pub flip_y: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRect>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            x: 0.0,
            y: 0.0,
            rotate: 0.0,
            flip_x: false,
            flip_y: false,
            crop: None,
        }
    }
}

impl Transform {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

pub const DEFAULT_BGM_VOLUME: f64 = 0.3;

fn default_bgm_volume() -> f64 {
    DEFAULT_BGM_VOLUME
}

/// One structured instruction produced by the upstream agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EditOperation {
    /// Cut boundary. Usually a point (`start == end`) but may carry a range.
    Split { start: f64, end: f64 },
    /// Multiply playback speed over `[start, end]`.
    Speed { start: f64, end: f64, rate: f64 },
    Delete { start: f64, end: f64 },
    Text {
        start: f64,
        end: f64,
        text: String,
        #[serde(default)]
        position: TextPosition,
    },
    Fade {
        start: f64,
        end: f64,
        direction: FadeDirection,
    },
    Volume { start: f64, end: f64, volume: f64 },
    Transform {
        start: f64,
        end: f64,
        transform: Transform,
    },
    /// Global background music, not tied to a media range.
    Bgm {
        keywords: String,
        #[serde(default = "default_bgm_volume")]
        volume: f64,
    },
}

impl EditOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Split { .. } => "split",
            Self::Speed { .. } => "speed",
            Self::Delete { .. } => "delete",
            Self::Text { .. } => "text",
            Self::Fade { .. } => "fade",
            Self::Volume { .. } => "volume",
            Self::Transform { .. } => "transform",
            Self::Bgm { .. } => "bgm",
        }
    }

    /// Media-time window, `None` for global edits.
    pub fn range(&self) -> Option<(f64, f64)> {
        match *self {
            Self::Split { start, end }
            | Self::Speed { start, end, .. }
            | Self::Delete { start, end }
            | Self::Text { start, end, .. }
            | Self::Fade { start, end, .. }
            | Self::Volume { start, end, .. }
            | Self::Transform { start, end, .. } => Some((start, end)),
            Self::Bgm { .. } => None,
        }
    }

    /// Time-anchored overlays never cut clips.
    pub fn is_time_anchored(&self) -> bool {
        matches!(self, Self::Text { .. } | Self::Fade { .. })
    }

    pub(crate) fn with_range(mut self, new_start: f64, new_end: f64) -> Self {
        match &mut self {
            Self::Split { start, end }
            | Self::Speed { start, end, .. }
            | Self::Delete { start, end }
            | Self::Text { start, end, .. }
            | Self::Fade { start, end, .. }
            | Self::Volume { start, end, .. }
            | Self::Transform { start, end, .. } => {
                *start = new_start;
                *end = new_end;
            }
            Self::Bgm { .. } => {}
        }
        self
    }
}

/// A clip picked by the selection engine, before any edit semantics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateClip {
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub energy: f64,
    #[serde(default)]
    pub tags: SegmentTags,
    /// Diagnostic only
    #[serde(default)]
    pub reason: String,
}

impl CandidateClip {
    pub fn from_segment(segment: &Segment, reason: impl Into<String>) -> Self {
        Self {
            id: segment.id.clone(),
            start: segment.start,
            end: segment.end,
            duration: segment.duration,
            energy: segment.energy,
            tags: segment.tags.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTimeline {
    pub clips: Vec<CandidateClip>,
    pub total_duration: f64,
    pub target_duration: f64,
}

/// A retained span of source media as placed on the output timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    pub playback_rate: f64,
    pub timeline_start: f64,
    pub display_duration: f64,
    #[serde(default = "unit_volume")]
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<EditOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn unit_volume() -> f64 {
    1.0
}

impl Clip {
    /// Untouched source span at normal speed; timeline fields are filled in
    /// by the compiler.
    pub fn source(id: impl Into<String>, start: f64, end: f64) -> Self {
        let duration = (end - start).max(0.0);
        Self {
            id: id.into(),
            start,
            end,
            duration,
            playback_rate: 1.0,
            timeline_start: 0.0,
            display_duration: duration,
            volume: 1.0,
            transform: None,
            edit: None,
            reason: None,
        }
    }

    pub fn timeline_end(&self) -> f64 {
        self.timeline_start + self.display_duration
    }
}

impl From<&CandidateClip> for Clip {
    fn from(candidate: &CandidateClip) -> Self {
        let mut clip = Clip::source(candidate.id.clone(), candidate.start, candidate.end);
        if !candidate.reason.is_empty() {
            clip.reason = Some(candidate.reason.clone());
        }
        clip
    }
}

/// What a timed overlay draws
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverlayContent {
    Text {
        text: String,
        #[serde(default)]
        position: TextPosition,
    },
    Fade { direction: FadeDirection },
}

/// A text or fade edit with both its media window and its projected
/// timeline window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedOverlay {
    pub start: f64,
    pub end: f64,
    pub timeline_start: f64,
    pub timeline_end: f64,
    #[serde(flatten)]
    pub content: OverlayContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgmEdit {
    pub keywords: String,
    pub volume: f64,
}

/// Fully compiled, ready-to-preview and ready-to-export timeline.
///
/// Rebuilt from scratch whenever the edits or the base clips change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTimeline {
    pub clips: Vec<Clip>,
    pub total_timeline_duration: f64,
    pub text_edits: Vec<TimedOverlay>,
    pub fade_edits: Vec<TimedOverlay>,
    pub bgm_edits: Vec<BgmEdit>,
}

impl RenderTimeline {
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Scrubbing helper: source clock → displayed clock.
    pub fn media_to_timeline(&self, media_time: f64) -> f64 {
        time::media_to_timeline(media_time, &self.clips)
    }

    /// Scrubbing helper: displayed clock → source clock.
    pub fn timeline_to_media(&self, timeline_time: f64) -> f64 {
        time::timeline_to_media(timeline_time, &self.clips)
    }

    /// Sum of source material consumed by the surviving clips
    pub fn media_duration(&self) -> f64 {
        self.clips.iter().map(|c| c.duration).sum()
    }
}
