// SYNOID Timeline Module
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Segment model, selection engine and the edit compiler.

pub mod analysis;
pub mod compiler;
pub mod models;
pub mod selection;
pub mod time;

pub use compiler::apply_edits_to_timeline;
pub use models::{
    BgmEdit, CandidateClip, CandidateTimeline, Clip, EditOperation, FadeDirection,
    OverlayContent, RenderTimeline, Segment, SegmentTags, TextPosition, TimedOverlay, Transform,
};
pub use selection::{build_timeline, Intent};
