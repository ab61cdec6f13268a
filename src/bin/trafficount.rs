use std::fs;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trafficount::{Config, Detection, Pipeline};

/// Replay pre-decoded per-frame detections through the counting pipeline
/// and print one JSON summary per frame.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON config file; defaults apply for missing fields.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input file: a JSON array of frame records, each
    /// `{"frame_id": n, "detections": [{"bbox": [x1,y1,x2,y2],
    /// "confidence": c, "class_id": k}, ...]}`.
    #[arg(short, long)]
    input: PathBuf,
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    frame_id: u64,
    #[serde(default)]
    detections: Vec<Detection>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let mut pipeline = Pipeline::new(&config)?;

    let data = fs::read_to_string(&args.input)?;
    let frames: Vec<FrameRecord> = serde_json::from_str(&data)?;
    info!(frames = frames.len(), "replaying detections");

    for frame in frames {
        let summary = pipeline.process_detections(frame.detections);
        info!(
            source_frame = frame.frame_id,
            tracks = summary.tracks.len(),
            events = summary.events.len(),
            total = summary.total_count,
            stable = summary.stability.stable,
            "frame"
        );
        println!("{}", serde_json::to_string(&summary)?);
    }

    info!(total = pipeline.total_count(), "replay finished");
    Ok(())
}
