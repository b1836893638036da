// SYNOID Export Configuration
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Encoder and workspace settings. Loaded from `synoid_export.json` when
// present, then overridden from the environment.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ExportError;
use crate::timeline::models::DEFAULT_BGM_VOLUME;

pub const CONFIG_FILE: &str = "synoid_export.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub video_codec: String,
    pub video_bitrate: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Scratch directory for per-request files (defaults to the OS temp dir)
    pub temp_dir: Option<PathBuf>,
    pub probe_timeout_secs: u64,
    /// Frame size assumed when the source cannot be probed
    pub fallback_width: u32,
    pub fallback_height: u32,
    /// Font for text overlays; the encoder's default font when unset
    pub font_file: Option<PathBuf>,
    /// Mix level for background music added without a bgm edit
    pub default_bgm_volume: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            video_codec: "libx264".to_string(),
            video_bitrate: "4000k".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            temp_dir: None,
            probe_timeout_secs: 10,
            fallback_width: 1920,
            fallback_height: 1080,
            font_file: None,
            default_bgm_volume: DEFAULT_BGM_VOLUME,
        }
    }
}

impl ExportConfig {
    /// Config file from the working directory (if any) plus env overrides.
    pub fn load() -> Self {
        let mut config = match Self::from_file(Path::new(CONFIG_FILE)) {
            Ok(Some(config)) => {
                info!("[CONFIG] Loaded export settings from {}", CONFIG_FILE);
                config
            }
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("[CONFIG] Ignoring {}: {}", CONFIG_FILE, e);
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    pub fn from_file(path: &Path) -> Result<Option<Self>, ExportError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ExportError::Config(format!("{}: {}", path.display(), e)))
    }

    fn apply_env(&mut self) {
        if let Ok(bin) = env::var("SYNOID_FFMPEG") {
            self.ffmpeg_bin = bin;
        }
        if let Ok(bin) = env::var("SYNOID_FFPROBE") {
            self.ffprobe_bin = bin;
        }
        if let Ok(codec) = env::var("SYNOID_VIDEO_CODEC") {
            self.video_codec = codec;
        }
        if let Ok(dir) = env::var("SYNOID_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(dir));
        }
        if let Ok(font) = env::var("SYNOID_FONT_FILE") {
            self.font_file = Some(PathBuf::from(font));
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(env::temp_dir)
    }
}
