// SYNOID Placeholder Analysis
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Deterministic stand-in for real content analysis. Cuts the media into
// equal segments and draws plausible attributes from a generator seeded by
// the file identity, so the same file always yields the same segments.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::timeline::models::{Segment, SegmentTags};
use crate::timeline::time::round_to;

/// Energy sample at a segment midpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f64,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFeatures {
    pub duration: f64,
    pub segment_count: usize,
    pub segments: Vec<Segment>,
    pub keyframes: Vec<Keyframe>,
    pub rhythm_score: f64,
}

impl MediaFeatures {
    pub fn from_segments(duration: f64, segments: Vec<Segment>) -> Self {
        Self {
            duration,
            segment_count: segments.len(),
            keyframes: keyframes(&segments),
            rhythm_score: rhythm_score(&segments),
            segments,
        }
    }
}

fn identity_seed(identity: &str) -> u64 {
    let mut hash: i32 = 0;
    for unit in identity.encode_utf16() {
        hash = hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    hash.unsigned_abs() as u64
}

/// Number of placeholder segments for a given duration
pub fn placeholder_segment_count(duration: f64) -> usize {
    ((duration / 6.0).round() as i64).clamp(6, 12) as usize
}

/// Equal-length segments covering `[0, duration]` with seeded attributes.
pub fn placeholder_segments(name: &str, size_bytes: u64, duration: f64) -> Vec<Segment> {
    if !(duration.is_finite() && duration > 0.0) {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(identity_seed(&format!("{}-{}-{}", name, size_bytes, duration)));
    let count = placeholder_segment_count(duration);
    let length = duration / count as f64;

    (0..count)
        .map(|index| {
            let start = index as f64 * length;
            // Last segment ends exactly on the media end, no float gap
            let end = if index == count - 1 { duration } else { (index + 1) as f64 * length };
            let energy = round_to(0.3 + rng.gen::<f64>() * 0.7, 2);
            let motion_score = round_to(0.2 + rng.gen::<f64>() * 0.8, 2);
            let speech_density = round_to(0.2 + rng.gen::<f64>() * 0.8, 2);
            let tags = SegmentTags {
                has_face: rng.gen::<f64>() > 0.6,
                has_action: rng.gen::<f64>() > 0.55,
                has_dialogue: rng.gen::<f64>() > 0.5,
                motion_score,
                speech_density,
            };
            Segment::new(start, end, energy, tags)
        })
        .collect()
}

pub fn keyframes(segments: &[Segment]) -> Vec<Keyframe> {
    segments
        .iter()
        .map(|s| Keyframe {
            time: round_to(s.start + s.duration / 2.0, 2),
            energy: s.energy,
        })
        .collect()
}

/// Mean segment energy
pub fn rhythm_score(segments: &[Segment]) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    let total: f64 = segments.iter().map(|s| s.energy).sum();
    round_to(total / segments.len() as f64, 2)
}
