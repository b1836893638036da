// SYNOID Text Overlay Images
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Layout and drawtext filter for the transparent PNGs that text overlays
// are composited from. The image is always full-frame so it can be laid
// over the video at 0:0.

use std::path::Path;

use crate::timeline::models::TextPosition;

/// Share of the frame height used as the margin from the top/bottom edge
const EDGE_MARGIN: f64 = 0.08;
const FONT_SCALE: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLayout {
    pub font_size: u32,
    pub padding: u32,
    pub box_height: u32,
    pub box_top: u32,
    pub border_width: u32,
}

impl TextLayout {
    pub fn compute(position: TextPosition, height: u32) -> Self {
        let h = height as f64;
        let font_size = (h * FONT_SCALE).round().max(1.0) as u32;
        let padding = (font_size as f64 * 0.25).round() as u32;
        let box_height = font_size + 2 * padding;
        let margin = (h * EDGE_MARGIN).round() as u32;

        let box_top = match position {
            TextPosition::Top => margin,
            TextPosition::Center => height.saturating_sub(box_height) / 2,
            TextPosition::Bottom => height.saturating_sub(box_height + margin),
        };

        Self {
            font_size,
            padding,
            box_height,
            box_top,
            border_width: ((font_size as f64 * 0.08).round() as u32).max(2),
        }
    }

    /// Baseline-independent top of the glyph box
    pub fn text_y(&self) -> u32 {
        self.box_top + self.padding
    }
}

/// Escape a value for use inside a filter option (`key=value`).
pub fn escape_option_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape an already option-escaped value for the filtergraph parser.
pub fn escape_graph_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_text(value: &str) -> String {
    escape_graph_value(&escape_option_value(value))
}

/// Transparent full-frame canvas for the lavfi input
pub fn canvas_source(width: u32, height: u32) -> String {
    format!("color=c=black@0.0:s={}x{},format=rgba", width, height)
}

/// drawtext filter producing one centred white caption with a dark outline.
pub fn text_image_filter(
    text: &str,
    position: TextPosition,
    height: u32,
    font_file: Option<&Path>,
) -> String {
    let layout = TextLayout::compute(position, height);
    let mut options = vec![
        format!("text={}", escape_text(text)),
        "expansion=none".to_string(),
    ];
    if let Some(font) = font_file {
        options.push(format!("fontfile={}", escape_text(&font.to_string_lossy())));
    }
    options.extend([
        format!("fontsize={}", layout.font_size),
        "fontcolor=white".to_string(),
        format!("borderw={}", layout.border_width),
        "bordercolor=black@0.9".to_string(),
        "x=(w-text_w)/2".to_string(),
        format!("y={}", layout.text_y()),
    ]);
    format!("drawtext={}", options.join(":"))
}
