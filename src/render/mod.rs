// SYNOID Render Module
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Filter graph planning and the encoder side of export.

pub mod bgm;
pub mod encoder;
pub mod export;
pub mod graph;
pub mod overlay;
pub mod plan;

pub use bgm::{BgmSource, BgmTrack, LocalBgm};
pub use encoder::{EncodeJob, EncodeOutcome, Encoder, ExtraInput, FfmpegEncoder, InputMode, TextImageJob};
pub use export::{export_timeline, new_request_id, ExportReport, ExportRequest};
pub use plan::{build_render_plan, tempo_chain, PlanInput, PlanOptions, RenderPlan};
