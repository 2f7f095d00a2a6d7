use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use speedo_rs::engine::generate_device_id;
use speedo_rs::units::format_duration;
use speedo_rs::{
    DisplayReading, EngineConfig, FixOutcome, JsonLinesSink, PositionFix, RecordingSink,
    RejectReason, SessionRecord, SessionSink, SpeedSessionEngine,
};

#[derive(Parser, Debug)]
#[command(name = "speedo_replay")]
#[command(
    about = "Replay a recorded GPS fix log through the speedometer engine",
    long_about = None
)]
struct Args {
    /// Path to a fix log (.json or .json.gz)
    #[arg(long)]
    log: PathBuf,

    /// JSON file overriding engine thresholds
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device id stamped on saved sessions (generated when omitted)
    #[arg(long)]
    device_id: Option<String>,

    /// Directory for speed_log.jsonl and sessions.jsonl
    #[arg(long, default_value = "speedo_sessions")]
    output_dir: PathBuf,

    /// Keep results in memory instead of writing files
    #[arg(long)]
    dry_run: bool,
}

#[derive(Deserialize)]
struct FixLog {
    fixes: Vec<PositionFix>,
}

fn load_log(path: &Path) -> Result<FixLog> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let log: serde_json::Result<FixLog> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
    } else {
        serde_json::from_reader(BufReader::new(file))
    };
    log.with_context(|| format!("parsing {}", path.display()))
}

#[derive(Default)]
struct ReplayStats {
    unlocked: u64,
    accepted: u64,
    jitter: u64,
    implausible: u64,
    ticks: u64,
    peak_display_kmh: f64,
}

fn replay<S: SessionSink>(
    engine: &mut SpeedSessionEngine<S>,
    fixes: &[PositionFix],
) -> (ReplayStats, Option<SessionRecord>) {
    let mut stats = ReplayStats::default();
    let tick = engine.config().tick_interval().as_secs_f64();
    let mut last_ts: Option<f64> = None;

    for fix in fixes {
        // Simulated display ticks between the previous fix and this one
        if let Some(prev) = last_ts {
            let mut now = prev + tick;
            while now < fix.timestamp {
                if let DisplayReading::Live { speed_kmh, .. } = engine.tick(now) {
                    stats.peak_display_kmh = stats.peak_display_kmh.max(speed_kmh);
                }
                stats.ticks += 1;
                now += tick;
            }
        }
        last_ts = Some(fix.timestamp);

        match engine.handle_fix(fix) {
            FixOutcome::Unlocked => stats.unlocked += 1,
            FixOutcome::FirstFix => {}
            FixOutcome::Rejected(RejectReason::Jitter) => stats.jitter += 1,
            FixOutcome::Rejected(RejectReason::Implausible) => stats.implausible += 1,
            FixOutcome::Accepted { recorded, .. } => {
                stats.accepted += 1;
                for name in recorded {
                    if let Some(entry) = engine.timers().get(&name) {
                        log::info!("{}: {}", name, entry.display_time());
                    }
                }
            }
        }
    }

    let end = last_ts.unwrap_or(0.0);
    let record = engine.reset(end);
    (stats, record)
}

fn summarize(
    path: &Path,
    stats: &ReplayStats,
    record: Option<&SessionRecord>,
) -> serde_json::Value {
    let session = record.map(|r| {
        let timers: serde_json::Map<String, serde_json::Value> = r
            .timers
            .iter()
            .map(|(name, entry)| {
                let value = json!({ "time": entry.display_time(), "invalid": entry.invalid });
                (name.clone(), value)
            })
            .collect();
        json!({
            "vmax_kmh": r.v_max,
            "distance_km": r.distance,
            "duration": format_duration(r.duration),
            "on_incline": r.on_incline,
            "timers": timers,
        })
    });

    json!({
        "log": path.display().to_string(),
        "accepted": stats.accepted,
        "unlocked": stats.unlocked,
        "jitter": stats.jitter,
        "implausible": stats.implausible,
        "display_ticks": stats.ticks,
        "peak_display_kmh": stats.peak_display_kmh,
        "session": session,
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let device_id = args.device_id.clone().unwrap_or_else(generate_device_id);

    let log = load_log(&args.log)?;
    if log.fixes.is_empty() {
        anyhow::bail!("{} contains no fixes", args.log.display());
    }
    log::info!("replaying {} fixes from {}", log.fixes.len(), args.log.display());

    let summary = if args.dry_run {
        let mut engine = SpeedSessionEngine::new(config, device_id, RecordingSink::new());
        let (stats, record) = replay(&mut engine, &log.fixes);
        summarize(&args.log, &stats, record.as_ref())
    } else {
        let sink = JsonLinesSink::new(&args.output_dir)?;
        let mut engine = SpeedSessionEngine::new(config, device_id, sink);
        let (stats, record) = replay(&mut engine, &log.fixes);
        if record.is_some() {
            log::info!("session written to {}", args.output_dir.display());
        }
        summarize(&args.log, &stats, record.as_ref())
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
