use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use synoid_timeline::config::ExportConfig;
use synoid_timeline::error::ExportError;
use synoid_timeline::render::{
    export_timeline, BgmSource, BgmTrack, EncodeJob, EncodeOutcome, Encoder, ExportRequest,
    InputMode, TextImageJob,
};
use synoid_timeline::timeline::models::{FadeDirection, TextPosition};
use synoid_timeline::timeline::{apply_edits_to_timeline, CandidateTimeline, EditOperation, RenderTimeline};

/// Stands in for ffmpeg: writes placeholder files and records what it saw.
struct FakeEncoder {
    exit_code: Option<i32>,
    frame_size: Option<(u32, u32)>,
    fail_overlays: bool,
    /// Never finish encoding, like a stuck ffmpeg
    hang: bool,
    text_jobs: Mutex<Vec<TextImageJob>>,
    encode_jobs: Mutex<Vec<EncodeJob>>,
    /// Whether every extra input existed when the encode started
    inputs_present: Mutex<Vec<bool>>,
}

impl FakeEncoder {
    fn new(exit_code: Option<i32>) -> Self {
        Self {
            exit_code,
            frame_size: Some((640, 360)),
            fail_overlays: false,
            hang: false,
            text_jobs: Mutex::new(Vec::new()),
            encode_jobs: Mutex::new(Vec::new()),
            inputs_present: Mutex::new(Vec::new()),
        }
    }

    fn encode_count(&self) -> usize {
        self.encode_jobs.lock().unwrap().len()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn probe_frame_size(&self, path: &Path) -> Result<(u32, u32), ExportError> {
        self.frame_size.ok_or_else(|| ExportError::Probe {
            path: path.to_path_buf(),
            reason: "no video stream".into(),
        })
    }

    async fn probe_duration(&self, _path: &Path) -> Result<f64, ExportError> {
        Ok(30.0)
    }

    async fn render_text_image(&self, job: &TextImageJob, output: &Path) -> Result<(), ExportError> {
        self.text_jobs.lock().unwrap().push(job.clone());
        if self.fail_overlays {
            return Err(ExportError::OverlayFailed {
                index: job.index,
                reason: "no font".into(),
            });
        }
        std::fs::write(output, b"png")?;
        Ok(())
    }

    async fn encode(&self, job: &EncodeJob) -> Result<EncodeOutcome, ExportError> {
        let present = job.source.exists() && job.extra_inputs.iter().all(|i| i.path.exists());
        self.inputs_present.lock().unwrap().push(present);
        self.encode_jobs.lock().unwrap().push(job.clone());
        // Partial output exists even when the encode fails
        std::fs::write(&job.output, b"video")?;
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(EncodeOutcome {
            exit_code: self.exit_code,
            stderr_tail: if self.exit_code == Some(0) {
                String::new()
            } else {
                "Invalid argument".into()
            },
        })
    }
}

struct FixedBgm(Option<PathBuf>);

#[async_trait]
impl BgmSource for FixedBgm {
    async fn resolve(&self, keywords: &str) -> Result<BgmTrack, ExportError> {
        match &self.0 {
            Some(path) => Ok(BgmTrack {
                path: path.clone(),
                duration_seconds: 12.0,
            }),
            None => Err(ExportError::Bgm(format!("nothing for '{}'", keywords))),
        }
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    config: ExportConfig,
    source: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let source = dir.path().join("source.mp4");
        std::fs::write(&source, b"source").unwrap();
        let config = ExportConfig {
            temp_dir: Some(scratch),
            fallback_width: 1280,
            fallback_height: 720,
            ..Default::default()
        };
        Self { dir, config, source }
    }

    fn destination(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    fn scratch_is_empty(&self) -> bool {
        let scratch = self.config.temp_dir.as_ref().unwrap();
        std::fs::read_dir(scratch).unwrap().count() == 0
    }

    fn request(&self, timeline: RenderTimeline, name: &str) -> ExportRequest {
        ExportRequest {
            source: self.source.clone(),
            timeline,
            destination: self.destination(name),
            request_id: None,
        }
    }
}

fn compiled(edits: &[EditOperation]) -> RenderTimeline {
    apply_edits_to_timeline(&CandidateTimeline::default(), edits, 30.0)
}

fn titled() -> RenderTimeline {
    compiled(&[
        EditOperation::Delete { start: 10.0, end: 20.0 },
        EditOperation::Text {
            start: 2.0,
            end: 6.0,
            text: "Hello".into(),
            position: TextPosition::Center,
        },
        EditOperation::Fade { start: 28.5, end: 30.0, direction: FadeDirection::Out },
    ])
}

#[tokio::test]
async fn test_success_moves_output_and_cleans_up() {
    let fx = Fixture::new();
    let encoder = FakeEncoder::new(Some(0));

    let report = export_timeline(&encoder, None, &fx.config, fx.request(titled(), "final.mp4"))
        .await
        .unwrap();

    assert!(fx.destination("final.mp4").exists());
    assert!(fx.scratch_is_empty());
    assert_eq!(report.text_overlays, 1);
    assert_eq!(report.frame_size, (640, 360));
    assert!((report.total_duration - 20.0).abs() < 1e-6);

    assert_eq!(encoder.inputs_present.lock().unwrap().as_slice(), &[true]);
    let jobs = encoder.encode_jobs.lock().unwrap();
    let job = &jobs[0];
    assert_eq!(job.duration_cap, Some(report.total_duration));
    assert_eq!(job.extra_inputs.len(), 1);
    assert_eq!(job.extra_inputs[0].mode, InputMode::StillLoop { seconds: 21.0 });
    assert!(job.filter_graph.contains("[1:v]setpts=PTS-STARTPTS[txt0]"));
    assert_eq!(job.output_map, vec!["[outv]", "[outa]"]);
}

#[tokio::test]
async fn test_encoder_failure_reports_code_and_cleans_up() {
    let fx = Fixture::new();
    let encoder = FakeEncoder::new(Some(1));

    let err = export_timeline(&encoder, None, &fx.config, fx.request(titled(), "final.mp4"))
        .await
        .unwrap_err();

    match &err {
        ExportError::EncoderFailed { code, stderr_tail } => {
            assert_eq!(*code, Some(1));
            assert_eq!(stderr_tail, "Invalid argument");
        }
        other => panic!("expected encoder failure, got {:?}", other),
    }
    assert_eq!(err.exit_code(), Some(1));
    assert!(!fx.destination("final.mp4").exists());
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_nothing_to_render_is_not_an_encoder_failure() {
    let fx = Fixture::new();
    let encoder = FakeEncoder::new(Some(0));
    let empty = compiled(&[EditOperation::Delete { start: 0.0, end: 30.0 }]);
    assert!(empty.is_empty());

    let err = export_timeline(&encoder, None, &fx.config, fx.request(empty, "final.mp4"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::NothingToRender));
    assert_eq!(err.exit_code(), None);
    assert_eq!(encoder.encode_count(), 0);
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_overlay_failure_aborts_before_encoding() {
    let fx = Fixture::new();
    let mut encoder = FakeEncoder::new(Some(0));
    encoder.fail_overlays = true;

    let err = export_timeline(&encoder, None, &fx.config, fx.request(titled(), "final.mp4"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::OverlayFailed { index: 0, .. }));
    assert_eq!(encoder.encode_count(), 0);
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_probe_failure_uses_fallback_frame() {
    let fx = Fixture::new();
    let mut encoder = FakeEncoder::new(Some(0));
    encoder.frame_size = None;

    let report = export_timeline(&encoder, None, &fx.config, fx.request(titled(), "final.mp4"))
        .await
        .unwrap();

    assert_eq!(report.frame_size, (1280, 720));
    let text_jobs = encoder.text_jobs.lock().unwrap();
    assert_eq!((text_jobs[0].width, text_jobs[0].height), (1280, 720));
    assert_eq!(text_jobs[0].position, TextPosition::Center);
}

#[tokio::test]
async fn test_bgm_is_mixed_when_resolved() {
    let fx = Fixture::new();
    let track = fx.dir.path().join("calm.mp3");
    std::fs::write(&track, b"mp3").unwrap();
    let encoder = FakeEncoder::new(Some(0));
    let timeline = compiled(&[EditOperation::Bgm { keywords: "calm".into(), volume: 0.4 }]);
    let source = FixedBgm(Some(track.clone()));

    let report = export_timeline(&encoder, Some(&source), &fx.config, fx.request(timeline, "bgm.mp4"))
        .await
        .unwrap();

    assert_eq!(report.bgm, Some(track.clone()));
    let jobs = encoder.encode_jobs.lock().unwrap();
    assert_eq!(jobs[0].extra_inputs[0].path, track);
    assert_eq!(jobs[0].extra_inputs[0].mode, InputMode::StreamLoop);
    assert!(jobs[0].filter_graph.contains("[1:a]volume=0.400[bgm]"));
    assert_eq!(jobs[0].duration_cap, Some(30.0));
}

#[tokio::test]
async fn test_unresolved_bgm_is_skipped() {
    let fx = Fixture::new();
    let encoder = FakeEncoder::new(Some(0));
    let timeline = compiled(&[EditOperation::Bgm { keywords: "epic".into(), volume: 0.3 }]);
    let source = FixedBgm(None);

    let report = export_timeline(&encoder, Some(&source), &fx.config, fx.request(timeline, "plain.mp4"))
        .await
        .unwrap();

    assert_eq!(report.bgm, None);
    let jobs = encoder.encode_jobs.lock().unwrap();
    assert!(jobs[0].extra_inputs.is_empty());
    assert!(!jobs[0].filter_graph.contains("amix"));
    assert_eq!(jobs[0].duration_cap, None);
}

#[tokio::test]
async fn test_concurrent_exports_do_not_share_files() {
    let fx = Fixture::new();
    let encoder = FakeEncoder::new(Some(0));

    let (a, b) = tokio::join!(
        export_timeline(&encoder, None, &fx.config, fx.request(titled(), "a.mp4")),
        export_timeline(&encoder, None, &fx.config, fx.request(titled(), "b.mp4")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.request_id, b.request_id);
    assert!(fx.destination("a.mp4").exists());
    assert!(fx.destination("b.mp4").exists());
    let jobs = encoder.encode_jobs.lock().unwrap();
    assert_ne!(jobs[0].output, jobs[1].output);
    assert!(fx.scratch_is_empty());
}

#[tokio::test]
async fn test_abandoned_export_cleans_up() {
    let fx = Fixture::new();
    let mut encoder = FakeEncoder::new(Some(0));
    encoder.hang = true;

    let result = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        export_timeline(&encoder, None, &fx.config, fx.request(titled(), "final.mp4")),
    )
    .await;

    assert!(result.is_err(), "export should still be encoding");
    // The workspace was populated and the encode had started
    assert_eq!(encoder.inputs_present.lock().unwrap().as_slice(), &[true]);
    assert_eq!(encoder.text_jobs.lock().unwrap().len(), 1);
    assert!(!fx.destination("final.mp4").exists());
    assert!(fx.scratch_is_empty());
}
