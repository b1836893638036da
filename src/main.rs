// SYNOID Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use synoid_timeline::agent::protocol::{edit_from_value, RequestContext};
use synoid_timeline::config::ExportConfig;
use synoid_timeline::render::{
    build_render_plan, export_timeline, BgmSource, Encoder, ExportRequest, FfmpegEncoder,
    LocalBgm, PlanOptions,
};
use synoid_timeline::timeline::analysis::{placeholder_segments, MediaFeatures};
use synoid_timeline::timeline::models::EditOperation;
use synoid_timeline::timeline::{
    apply_edits_to_timeline, build_timeline, BgmEdit, CandidateTimeline, Intent, RenderTimeline,
    Segment,
};

#[derive(Parser)]
#[command(name = "synoid-timeline")]
#[command(about = "SYNOID timeline compiler and exporter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the base clips and the edits come from
#[derive(Args)]
struct TimelineArgs {
    /// Edit list (JSON array, or an object with an `edits` array)
    #[arg(short, long)]
    edits: PathBuf,

    /// Analysed segments to select from; the whole media is one clip otherwise
    #[arg(long)]
    segments: Option<PathBuf>,

    /// Selection intent (JSON)
    #[arg(long)]
    intent: Option<PathBuf>,

    /// Media duration in seconds
    #[arg(short, long)]
    duration: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick segments for a target duration
    Select {
        #[arg(long)]
        segments: PathBuf,

        #[arg(long)]
        intent: Option<PathBuf>,
    },

    /// Apply edits and print the render timeline
    Compile {
        #[command(flatten)]
        timeline: TimelineArgs,
    },

    /// Print the encoder filter graph for a compiled timeline
    Plan {
        #[command(flatten)]
        timeline: TimelineArgs,

        #[arg(long, default_value_t = 1920)]
        width: u32,

        #[arg(long, default_value_t = 1080)]
        height: u32,
    },

    /// Parse a raw agent response into segments and edits
    Parse {
        #[arg(short, long)]
        response: PathBuf,

        #[arg(short, long, default_value_t = 0.0)]
        duration: f64,

        /// Segments the agent was given, kept when it returns none
        #[arg(short, long)]
        segments: Option<PathBuf>,
    },

    /// Placeholder analysis for a media file
    Analyze {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Map a time between the media clock and the timeline clock
    Scrub {
        #[command(flatten)]
        timeline: TimelineArgs,

        /// Media time to project onto the timeline
        #[arg(long = "media", conflicts_with = "at_timeline", required_unless_present = "at_timeline")]
        at_media: Option<f64>,

        /// Timeline time to map back to media
        #[arg(long = "timeline")]
        at_timeline: Option<f64>,
    },

    /// Render the edited video
    Export {
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        timeline: TimelineArgs,

        #[arg(short, long)]
        output: PathBuf,

        /// Background music file or directory of tracks
        #[arg(long)]
        bgm: Option<PathBuf>,

        #[arg(long)]
        bgm_volume: Option<f64>,
    },
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Array at the top level, or under `key`
fn json_list(value: Value, key: &str) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn load_edits(path: &Path) -> Result<Vec<EditOperation>> {
    let items = json_list(read_json(path)?, "edits");
    let total = items.len();
    let edits: Vec<EditOperation> = items.iter().filter_map(edit_from_value).collect();
    if edits.len() < total {
        warn!("[CLI] {} of {} edits could not be read", total - edits.len(), total);
    }
    Ok(edits)
}

fn load_segments(path: &Path) -> Result<Vec<Segment>> {
    json_list(read_json(path)?, "segments")
        .into_iter()
        .map(|v| serde_json::from_value::<Segment>(v).context("invalid segment"))
        .collect()
}

fn load_intent(path: Option<&Path>) -> Result<Intent> {
    match path {
        Some(path) => serde_json::from_value(read_json(path)?).context("invalid intent"),
        None => Ok(Intent::default()),
    }
}

fn base_timeline(args: &TimelineArgs) -> Result<CandidateTimeline> {
    match &args.segments {
        Some(path) => {
            let segments = load_segments(path)?;
            Ok(build_timeline(&segments, &load_intent(args.intent.as_deref())?))
        }
        None => Ok(CandidateTimeline::default()),
    }
}

fn compile(args: &TimelineArgs, duration: Option<f64>) -> Result<RenderTimeline> {
    let edits = load_edits(&args.edits)?;
    let base = base_timeline(args)?;
    let duration = duration.or(args.duration).unwrap_or(0.0);
    if base.clips.is_empty() && duration <= 0.0 {
        bail!("without --segments the media --duration is required");
    }
    Ok(apply_edits_to_timeline(&base, &edits, duration))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct ScrubResult {
    media: f64,
    timeline: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    // JSON goes to stdout, logs to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Select { segments, intent } => {
            let segments = load_segments(&segments)?;
            let intent = load_intent(intent.as_deref())?;
            print_json(&build_timeline(&segments, &intent))?;
        }
        Commands::Compile { timeline } => {
            print_json(&compile(&timeline, None)?)?;
        }
        Commands::Plan {
            timeline,
            width,
            height,
        } => {
            let compiled = compile(&timeline, None)?;
            let plan = build_render_plan(
                &compiled,
                &PlanOptions {
                    frame_width: width,
                    frame_height: height,
                    mix_bgm: true,
                },
            )?;
            print_json(&plan)?;
        }
        Commands::Parse {
            response,
            duration,
            segments,
        } => {
            let text = std::fs::read_to_string(&response)
                .with_context(|| format!("reading {}", response.display()))?;
            let existing = match segments {
                Some(path) => load_segments(&path)?,
                None => Vec::new(),
            };
            match RequestContext::new(duration, existing).parse_response(&text) {
                Some(analysis) => print_json(&analysis)?,
                None => bail!("no usable segments or edits in {}", response.display()),
            }
        }
        Commands::Analyze { input } => {
            let encoder = FfmpegEncoder::new(ExportConfig::load());
            let duration = encoder
                .probe_duration(&input)
                .await
                .with_context(|| format!("probing {}", input.display()))?;
            let size = std::fs::metadata(&input)
                .with_context(|| format!("reading {}", input.display()))?
                .len();
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let segments = placeholder_segments(&name, size, duration);
            info!("📊 {} placeholder segments for {:.2}s", segments.len(), duration);
            print_json(&MediaFeatures::from_segments(duration, segments))?;
        }
        Commands::Scrub {
            timeline,
            at_media,
            at_timeline,
        } => {
            let compiled = compile(&timeline, None)?;
            let result = match (at_media, at_timeline) {
                (Some(media), _) => ScrubResult {
                    media,
                    timeline: compiled.media_to_timeline(media),
                },
                (None, Some(t)) => ScrubResult {
                    media: compiled.timeline_to_media(t),
                    timeline: t,
                },
                (None, None) => bail!("one of --media or --timeline is required"),
            };
            print_json(&result)?;
        }
        Commands::Export {
            input,
            timeline,
            output,
            bgm,
            bgm_volume,
        } => {
            let config = ExportConfig::load();
            let encoder = FfmpegEncoder::new(config.clone());

            let duration = match timeline.duration {
                Some(d) => d,
                None => encoder
                    .probe_duration(&input)
                    .await
                    .with_context(|| format!("probing {}", input.display()))?,
            };
            let mut compiled = compile(&timeline, Some(duration))?;

            if let Some(path) = &bgm {
                if compiled.bgm_edits.is_empty() {
                    let keywords = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    compiled.bgm_edits.push(BgmEdit {
                        keywords,
                        volume: config.default_bgm_volume.clamp(0.0, 1.0),
                    });
                }
            }
            if let Some(volume) = bgm_volume {
                for edit in &mut compiled.bgm_edits {
                    edit.volume = volume.clamp(0.0, 1.0);
                }
            }

            let local_bgm = bgm.as_ref().map(|path| LocalBgm::new(path.clone(), &encoder));
            let bgm_source = local_bgm.as_ref().map(|b| b as &dyn BgmSource);

            let report = export_timeline(
                &encoder,
                bgm_source,
                &config,
                ExportRequest {
                    source: input,
                    timeline: compiled,
                    destination: output,
                    request_id: None,
                },
            )
            .await?;
            print_json(&report)?;
        }
    }

    Ok(())
}
