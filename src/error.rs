// SYNOID Error Types
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use std::path::PathBuf;

/// Failures while turning a render timeline into a filter graph
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Every clip was deleted (or there was never any media). Not an
    /// encoder problem: there is simply nothing to encode.
    #[error("nothing to render: the timeline has no clips")]
    NothingToRender,

    #[error("filter graph contains a cycle at stage {0}")]
    GraphCycle(String),

    #[error("filter graph leaves pads {0:?} unmapped")]
    DanglingPads(Vec<String>),
}

/// Failures of one export request. Temporary files are already cleaned up
/// by the time the caller sees any of these.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing to render: the timeline has no clips")]
    NothingToRender,

    #[error("encoder binary not found: {0}")]
    EncoderNotFound(String),

    #[error("encoder exited with {}: {stderr_tail}", describe_exit(.code))]
    EncoderFailed {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("failed to render text overlay {index}: {reason}")]
    OverlayFailed { index: usize, reason: String },

    #[error("probe failed for {path:?}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("background music unavailable: {0}")]
    Bgm(String),

    #[error("invalid plan: {0}")]
    Plan(PlanError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (killed by signal)".to_string(),
    }
}

impl From<PlanError> for ExportError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::NothingToRender => ExportError::NothingToRender,
            other => ExportError::Plan(other),
        }
    }
}

impl ExportError {
    /// Exit code of a failed encode, if that is what this is
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExportError::EncoderFailed { code, .. } => *code,
            _ => None,
        }
    }
}
