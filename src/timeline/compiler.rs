// SYNOID Timeline Edit Compiler
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Turns a base clip list plus an ordered list of edit operations into a
// render timeline with two clocks: media time (what source is consumed) and
// timeline time (what the viewer sees).
//
// The pass order is fixed: normalize -> collect boundaries -> split ->
// delete -> attach attributes -> place on timeline -> project overlays.
// Reordering changes the result for overlapping edits.
//
// The compiler never fails. Bad edits are clamped or dropped one at a time.

use tracing::{debug, info, warn};

use crate::timeline::models::{
    BgmEdit, CandidateTimeline, Clip, EditOperation, OverlayContent, RenderTimeline,
    TimedOverlay, Transform,
};
use crate::timeline::time::{
    covers, effective_rate, media_to_timeline, round_to, ATTRIBUTE_COVER_TOLERANCE,
    DELETE_COVER_TOLERANCE, SPLIT_EPSILON_COARSE, SPLIT_EPSILON_PRECISE,
};

/// Clamp every edit into `[0, media_limit]` and drop the ones that end up
/// empty or unusable. `media_limit <= 0` means the media length is unknown
/// and only the lower bound is enforced.
pub fn normalize_edits(edits: &[EditOperation], media_limit: f64) -> Vec<EditOperation> {
    edits
        .iter()
        .filter_map(|edit| normalize_edit(edit, media_limit))
        .collect()
}

fn normalize_edit(edit: &EditOperation, media_limit: f64) -> Option<EditOperation> {
    let edit = match edit.clone() {
        EditOperation::Speed { start, end, rate } => {
            let fixed = if rate.is_finite() && rate > 0.0 {
                rate
            } else {
                warn!("[COMPILER] speed edit with rate {} falls back to 1.0", rate);
                1.0
            };
            EditOperation::Speed { start, end, rate: fixed }
        }
        EditOperation::Volume { start, end, volume } => EditOperation::Volume {
            start,
            end,
            volume: if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 },
        },
        EditOperation::Transform { start, end, transform } => EditOperation::Transform {
            start,
            end,
            transform: sanitize_transform(transform),
        },
        EditOperation::Bgm { keywords, volume } => {
            let volume = if volume.is_finite() {
                volume.clamp(0.0, 1.0)
            } else {
                crate::timeline::models::DEFAULT_BGM_VOLUME
            };
            return Some(EditOperation::Bgm { keywords, volume });
        }
        other => other,
    };

    let (start, end) = edit.range()?;
    if !start.is_finite() || !end.is_finite() {
        warn!("[COMPILER] Dropping {} edit with non-finite range", edit.kind());
        return None;
    }

    let mut start = start.max(0.0);
    let mut end = end.max(0.0);
    if media_limit > 0.0 {
        start = start.min(media_limit);
        end = end.min(media_limit);
    }

    // A split is a boundary marker; a zero-width one is still meaningful.
    let empty = match edit {
        EditOperation::Split { .. } => start > end,
        _ => start >= end,
    };
    if empty {
        warn!(
            "[COMPILER] Dropping {} edit: empty range after clamping ({:.3}..{:.3})",
            edit.kind(),
            start,
            end
        );
        return None;
    }

    Some(edit.with_range(start, end))
}

fn sanitize_transform(mut transform: Transform) -> Transform {
    if !(transform.scale.is_finite() && transform.scale > 0.0) {
        transform.scale = 1.0;
    }
    for value in [&mut transform.x, &mut transform.y, &mut transform.rotate] {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    transform
}

/// Distinct split points from every structural edit, rounded to 2 decimals
/// to absorb float noise, ascending.
pub fn collect_boundaries(edits: &[EditOperation]) -> Vec<f64> {
    let mut points: Vec<f64> = edits
        .iter()
        .filter(|edit| !edit.is_time_anchored())
        .filter_map(|edit| edit.range())
        .flat_map(|(start, end)| [start, end])
        .filter(|point| *point > 0.0)
        .map(|point| round_to(point, 2))
        .collect();
    points.sort_by(f64::total_cmp);
    points.dedup();
    points
}

fn split_clip(clip: Clip, point: f64, epsilon: f64) -> Vec<Clip> {
    if point > clip.start + epsilon && point < clip.end - epsilon {
        let left = Clip {
            id: format!("split-{:.2}-{:.2}", clip.start, point),
            end: point,
            duration: point - clip.start,
            ..clip.clone()
        };
        let right = Clip {
            id: format!("split-{:.2}-{:.2}", point, clip.end),
            start: point,
            duration: clip.end - point,
            ..clip
        };
        vec![left, right]
    } else {
        vec![clip]
    }
}

/// Split every clip at every boundary it strictly contains.
///
/// Each point is applied against the current clip list, so the result does
/// not depend on the order edits were written in.
pub fn split_at_boundaries(clips: Vec<Clip>, points: &[f64], epsilon: f64) -> Vec<Clip> {
    points.iter().fold(clips, |current, &point| {
        current
            .into_iter()
            .flat_map(|clip| split_clip(clip, point, epsilon))
            .collect()
    })
}

fn first_covering<'a>(
    edits: &'a [EditOperation],
    clip: &Clip,
    wanted: fn(&EditOperation) -> bool,
) -> Option<&'a EditOperation> {
    edits.iter().filter(|edit| wanted(edit)).find(|edit| match edit.range() {
        Some((start, end)) => covers(start, end, clip.start, clip.end, ATTRIBUTE_COVER_TOLERANCE),
        None => false,
    })
}

fn attach_attributes(mut clip: Clip, edits: &[EditOperation]) -> Clip {
    let speed = first_covering(edits, &clip, |e| matches!(e, EditOperation::Speed { .. }));
    let split = first_covering(edits, &clip, |e| matches!(e, EditOperation::Split { .. }));

    match speed.or(split) {
        Some(edit) => {
            clip.playback_rate = match edit {
                EditOperation::Speed { rate, .. } => effective_rate(*rate),
                _ => 1.0,
            };
            clip.edit = Some(edit.clone());
        }
        None => {
            clip.playback_rate = 1.0;
            clip.edit = None;
        }
    }

    clip.volume = match first_covering(edits, &clip, |e| matches!(e, EditOperation::Volume { .. })) {
        Some(EditOperation::Volume { volume, .. }) => *volume,
        _ => 1.0,
    };
    clip.transform =
        match first_covering(edits, &clip, |e| matches!(e, EditOperation::Transform { .. })) {
            Some(EditOperation::Transform { transform, .. }) if !transform.is_identity() => {
                Some(transform.clone())
            }
            _ => None,
        };

    clip
}

/// Lay clips end to end on the output clock, in media order.
fn place_on_timeline(mut clips: Vec<Clip>) -> (Vec<Clip>, f64) {
    clips.sort_by(|a, b| a.start.total_cmp(&b.start));
    let mut cursor = 0.0;
    for clip in clips.iter_mut() {
        clip.display_duration = clip.duration / effective_rate(clip.playback_rate);
        clip.timeline_start = cursor;
        cursor += clip.display_duration;
        debug!(
            "[COMPILER] {} media {:.3}..{:.3} x{} -> timeline {:.3}..{:.3}",
            clip.id,
            clip.start,
            clip.end,
            clip.playback_rate,
            clip.timeline_start,
            cursor
        );
    }
    (clips, cursor)
}

fn project_overlays(edits: &[EditOperation], clips: &[Clip]) -> (Vec<TimedOverlay>, Vec<TimedOverlay>) {
    let mut text_edits = Vec::new();
    let mut fade_edits = Vec::new();

    for edit in edits {
        let (start, end, content) = match edit {
            EditOperation::Text { start, end, text, position } => (
                *start,
                *end,
                OverlayContent::Text { text: text.clone(), position: *position },
            ),
            EditOperation::Fade { start, end, direction } => {
                (*start, *end, OverlayContent::Fade { direction: *direction })
            }
            _ => continue,
        };
        let overlay = TimedOverlay {
            start,
            end,
            timeline_start: media_to_timeline(start, clips),
            timeline_end: media_to_timeline(end, clips),
            content,
        };
        match overlay.content {
            OverlayContent::Text { .. } => text_edits.push(overlay),
            OverlayContent::Fade { .. } => fade_edits.push(overlay),
        }
    }

    (text_edits, fade_edits)
}

/// Compile `edits` over `base` into a render timeline.
///
/// With no base clips, a single clip spanning `[0, total_media_duration]`
/// stands in for the whole source.
pub fn apply_edits_to_timeline(
    base: &CandidateTimeline,
    edits: &[EditOperation],
    total_media_duration: f64,
) -> RenderTimeline {
    let base_end = base.clips.iter().map(|c| c.end).fold(0.0_f64, f64::max);
    let media_limit = if total_media_duration.is_finite() && total_media_duration > 0.0 {
        total_media_duration
    } else {
        base_end
    };

    let edits = normalize_edits(edits, media_limit);

    let clips: Vec<Clip> = if base.clips.is_empty() {
        if media_limit > 0.0 {
            vec![Clip::source("base-clip", 0.0, media_limit)]
        } else {
            Vec::new()
        }
    } else {
        base.clips
            .iter()
            .map(Clip::from)
            .filter(|clip| clip.duration > 0.0)
            .collect()
    };

    let has_delete = edits.iter().any(|e| matches!(e, EditOperation::Delete { .. }));
    let epsilon = if has_delete { SPLIT_EPSILON_PRECISE } else { SPLIT_EPSILON_COARSE };
    let points = collect_boundaries(&edits);
    let clips = split_at_boundaries(clips, &points, epsilon);

    let deletes: Vec<(f64, f64)> = edits
        .iter()
        .filter_map(|e| match e {
            EditOperation::Delete { start, end } => Some((*start, *end)),
            _ => None,
        })
        .collect();
    let before_delete = clips.len();
    let clips: Vec<Clip> = clips
        .into_iter()
        .filter(|clip| {
            !deletes
                .iter()
                .any(|&(start, end)| covers(start, end, clip.start, clip.end, DELETE_COVER_TOLERANCE))
        })
        .collect();

    let clips: Vec<Clip> = clips.into_iter().map(|clip| attach_attributes(clip, &edits)).collect();
    let (clips, total_timeline_duration) = place_on_timeline(clips);
    let (text_edits, fade_edits) = project_overlays(&edits, &clips);

    let bgm_edits = edits
        .iter()
        .filter_map(|e| match e {
            EditOperation::Bgm { keywords, volume } => Some(BgmEdit {
                keywords: keywords.clone(),
                volume: *volume,
            }),
            _ => None,
        })
        .collect();

    info!(
        "[COMPILER] {} edits, {} split points, {} clips removed -> {} clips, {:.3}s on timeline",
        edits.len(),
        points.len(),
        before_delete - clips.len(),
        clips.len(),
        total_timeline_duration
    );

    RenderTimeline {
        clips,
        total_timeline_duration,
        text_edits,
        fade_edits,
        bgm_edits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::models::{CandidateClip, FadeDirection, SegmentTags, TextPosition};

    fn base(ranges: &[(f64, f64)]) -> CandidateTimeline {
        let clips: Vec<CandidateClip> = ranges
            .iter()
            .map(|&(start, end)| CandidateClip {
                id: format!("{:.2}-{:.2}", start, end),
                start,
                end,
                duration: end - start,
                energy: 0.5,
                tags: SegmentTags::default(),
                reason: String::new(),
            })
            .collect();
        CandidateTimeline {
            total_duration: clips.iter().map(|c| c.duration).sum(),
            target_duration: 0.0,
            clips,
        }
    }

    #[test]
    fn test_delete_middle() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 30.0)]),
            &[EditOperation::Delete { start: 10.0, end: 20.0 }],
            30.0,
        );
        assert_eq!(result.clips.len(), 2);
        assert_eq!((result.clips[0].start, result.clips[0].end), (0.0, 10.0));
        assert_eq!((result.clips[1].start, result.clips[1].end), (20.0, 30.0));
        assert_eq!(result.clips[1].timeline_start, 10.0);
        assert!((result.total_timeline_duration - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_split_then_speed() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 8.75)]),
            &[
                EditOperation::Split { start: 3.0, end: 8.75 },
                EditOperation::Speed { start: 3.0, end: 8.75, rate: 2.0 },
            ],
            8.75,
        );
        assert_eq!(result.clips.len(), 2);
        assert_eq!(result.clips[0].playback_rate, 1.0);
        assert_eq!(result.clips[0].display_duration, 3.0);
        assert_eq!(result.clips[1].playback_rate, 2.0);
        assert!((result.clips[1].display_duration - 2.875).abs() < 1e-9);
        assert!((result.total_timeline_duration - 5.875).abs() < 1e-9);
        assert!(result.clips[0].edit.is_none());
        assert!(matches!(result.clips[1].edit, Some(EditOperation::Speed { .. })));
    }

    #[test]
    fn test_empty_base_synthesizes_full_clip() {
        let result = apply_edits_to_timeline(&CandidateTimeline::default(), &[], 12.0);
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].id, "base-clip");
        assert_eq!(result.total_timeline_duration, 12.0);
    }

    #[test]
    fn test_zero_length_speed_is_dropped() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 10.0)]),
            &[EditOperation::Speed { start: 5.0, end: 5.0, rate: 3.0 }],
            10.0,
        );
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].playback_rate, 1.0);
    }

    #[test]
    fn test_bad_rate_defaults_to_normal_speed() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 10.0)]),
            &[EditOperation::Speed { start: 0.0, end: 10.0, rate: f64::NAN }],
            10.0,
        );
        assert_eq!(result.clips[0].playback_rate, 1.0);
        assert_eq!(result.total_timeline_duration, 10.0);
    }

    #[test]
    fn test_small_edit_noise_does_not_fragment() {
        // 0.05s away from the clip edge: inside the coarse split margin
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 10.0)]),
            &[EditOperation::Speed { start: 0.05, end: 10.0, rate: 2.0 }],
            10.0,
        );
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].playback_rate, 2.0);
    }

    #[test]
    fn test_delete_uses_precise_margin() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 10.0)]),
            &[EditOperation::Delete { start: 0.0, end: 0.05 }],
            10.0,
        );
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].start, 0.05);
    }

    #[test]
    fn test_edits_clamped_to_media() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 10.0)]),
            &[
                EditOperation::Delete { start: 8.0, end: 99.0 },
                EditOperation::Delete { start: 40.0, end: 50.0 },
            ],
            10.0,
        );
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].end, 8.0);
    }

    #[test]
    fn test_text_projection_on_sped_clip() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 2.0), (5.0, 20.0)]),
            &[
                EditOperation::Speed { start: 5.0, end: 20.0, rate: 2.0 },
                EditOperation::Text {
                    start: 8.0,
                    end: 15.0,
                    text: "X".into(),
                    position: TextPosition::Top,
                },
            ],
            20.0,
        );
        assert_eq!(result.clips[1].timeline_start, 2.0);
        let text = &result.text_edits[0];
        assert!((text.timeline_start - 3.5).abs() < 1e-9);
        assert!((text.timeline_end - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_fade_does_not_split() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 30.0)]),
            &[EditOperation::Fade { start: 28.5, end: 30.0, direction: FadeDirection::Out }],
            30.0,
        );
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.fade_edits.len(), 1);
        assert_eq!(result.fade_edits[0].timeline_start, 28.5);
    }

    #[test]
    fn test_volume_and_transform_attach() {
        let transform = Transform { scale: 1.5, ..Transform::default() };
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 10.0)]),
            &[
                EditOperation::Volume { start: 0.0, end: 4.0, volume: 0.25 },
                EditOperation::Transform { start: 4.0, end: 10.0, transform: transform.clone() },
            ],
            10.0,
        );
        assert_eq!(result.clips.len(), 2);
        assert_eq!(result.clips[0].volume, 0.25);
        assert!(result.clips[0].transform.is_none());
        assert_eq!(result.clips[1].volume, 1.0);
        assert_eq!(result.clips[1].transform, Some(transform));
        // Neither edit sets a rate
        assert!(result.clips.iter().all(|c| c.playback_rate == 1.0 && c.edit.is_none()));
    }

    #[test]
    fn test_bgm_collected() {
        let result = apply_edits_to_timeline(
            &base(&[(0.0, 10.0)]),
            &[EditOperation::Bgm { keywords: "happy".into(), volume: 4.0 }],
            10.0,
        );
        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.bgm_edits, vec![BgmEdit { keywords: "happy".into(), volume: 1.0 }]);
    }

    #[test]
    fn test_boundaries_skip_overlays_and_zero() {
        let points = collect_boundaries(&[
            EditOperation::Split { start: 0.0, end: 3.004 },
            EditOperation::Text { start: 5.0, end: 6.0, text: "t".into(), position: TextPosition::Bottom },
            EditOperation::Delete { start: 3.0, end: 9.0 },
        ]);
        assert_eq!(points, vec![3.0, 9.0]);
    }
}
