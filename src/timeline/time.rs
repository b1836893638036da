// SYNOID Time Utilities
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Tolerances and the media-time <-> timeline-time mapping shared by the
// compiler, the preview scrubber and the render plan.

use crate::timeline::models::Clip;

/// Overlay/scrub lookup slack around a clip's edges
pub const PROJECTION_TOLERANCE: f64 = 0.05;
/// A delete must cover a clip to within this on both ends
pub const DELETE_COVER_TOLERANCE: f64 = 0.02;
/// Speed/split/volume/transform attach to clips they cover within this
pub const ATTRIBUTE_COVER_TOLERANCE: f64 = 0.2;
/// Split margin when the edit list contains a delete
pub const SPLIT_EPSILON_PRECISE: f64 = 0.02;
/// Split margin otherwise, keeps op noise from shredding clips
pub const SPLIT_EPSILON_COARSE: f64 = 0.1;

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// True when `[range_start, range_end]` covers `[start, end]` with `tolerance`
/// of slack on both ends.
pub fn covers(range_start: f64, range_end: f64, start: f64, end: f64, tolerance: f64) -> bool {
    range_start <= start + tolerance && range_end >= end - tolerance
}

/// Clip whose `[start, end)` window holds `point`, else the first whose
/// window widened by `PROJECTION_TOLERANCE` does.
fn locate<F>(point: f64, clips: &[Clip], window: F) -> Option<&Clip>
where
    F: Fn(&Clip) -> (f64, f64),
{
    clips
        .iter()
        .find(|clip| {
            let (start, end) = window(clip);
            point >= start && point < end
        })
        .or_else(|| {
            clips.iter().find(|clip| {
                let (start, end) = window(clip);
                point >= start - PROJECTION_TOLERANCE && point <= end + PROJECTION_TOLERANCE
            })
        })
}

/// Map a source-clock instant onto the displayed timeline.
///
/// A clip that strictly holds the point wins over one that only reaches it
/// through the edge tolerance. Points inside no clip (deleted material, or
/// past the end) pass through unchanged.
pub fn media_to_timeline(media_time: f64, clips: &[Clip]) -> f64 {
    match locate(media_time, clips, |clip| (clip.start, clip.end)) {
        Some(clip) => {
            let offset = (media_time - clip.start).max(0.0);
            clip.timeline_start + offset / effective_rate(clip.playback_rate)
        }
        None => media_time,
    }
}

/// Inverse of [`media_to_timeline`] using the same lookup rule on the
/// timeline window of each clip.
pub fn timeline_to_media(timeline_time: f64, clips: &[Clip]) -> f64 {
    match locate(timeline_time, clips, |clip| (clip.timeline_start, clip.timeline_end())) {
        Some(clip) => {
            let offset = (timeline_time - clip.timeline_start).max(0.0);
            clip.start + offset * effective_rate(clip.playback_rate)
        }
        None => timeline_time,
    }
}

/// Playback rates that cannot be divided by fall back to normal speed.
pub fn effective_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        1.0
    }
}

/// Seconds formatted for filter arguments: up to 6 decimals, no trailing zeros.
pub fn format_seconds(value: f64) -> String {
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" || text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
