// SYNOID Background Music
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Resolves a bgm edit's keywords to a playable audio file. Fetching music
// from the network is somebody else's job; this only looks on disk.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ExportError;
use crate::render::encoder::Encoder;

const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "m4a", "aac", "ogg", "flac"];

#[derive(Debug, Clone, PartialEq)]
pub struct BgmTrack {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

#[async_trait]
pub trait BgmSource: Send + Sync {
    async fn resolve(&self, keywords: &str) -> Result<BgmTrack, ExportError>;
}

/// A single audio file, or a directory whose file names are matched
/// against the keywords.
pub struct LocalBgm<'a> {
    root: PathBuf,
    prober: &'a dyn Encoder,
}

impl<'a> LocalBgm<'a> {
    pub fn new(root: impl Into<PathBuf>, prober: &'a dyn Encoder) -> Self {
        Self {
            root: root.into(),
            prober,
        }
    }
}

/// Audio files in `dir`, sorted by name
pub async fn scan_audio_files(dir: &Path) -> Vec<PathBuf> {
    let mut tracks = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(_) => return tracks,
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_file() && is_audio(&path) {
            tracks.push(path);
        }
    }
    tracks.sort();
    tracks
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Best keyword match by number of shared words; first file on a tie or
/// when nothing matches.
pub fn pick_track<'p>(tracks: &'p [PathBuf], keywords: &str) -> Option<&'p PathBuf> {
    let words: Vec<String> = keywords
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let hits = |path: &PathBuf| {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        words.iter().filter(|w| name.contains(w.as_str())).count()
    };

    let mut best: Option<(&PathBuf, usize)> = None;
    for track in tracks {
        let score = hits(track);
        match best {
            Some((_, top)) if top >= score => {}
            _ => best = Some((track, score)),
        }
    }
    best.map(|(track, _)| track)
}

#[async_trait]
impl<'a> BgmSource for LocalBgm<'a> {
    async fn resolve(&self, keywords: &str) -> Result<BgmTrack, ExportError> {
        let path = if self.root.is_dir() {
            let tracks = scan_audio_files(&self.root).await;
            debug!("[EXPORT] {} bgm candidates in {:?}", tracks.len(), self.root);
            pick_track(&tracks, keywords)
                .cloned()
                .ok_or_else(|| ExportError::Bgm(format!("no audio files in {:?}", self.root)))?
        } else if self.root.is_file() {
            self.root.clone()
        } else {
            return Err(ExportError::Bgm(format!("{:?} does not exist", self.root)));
        };

        let duration_seconds = self
            .prober
            .probe_duration(&path)
            .await
            .map_err(|e| ExportError::Bgm(e.to_string()))?;
        info!("[EXPORT] 🎵 bgm '{}' -> {:?} ({:.1}s)", keywords, path, duration_seconds);
        Ok(BgmTrack {
            path,
            duration_seconds,
        })
    }
}
