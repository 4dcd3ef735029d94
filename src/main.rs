use std::env;
use std::fs;
use std::path::Path;
use std::process;

use hyplayer::config::{load_config, PlayerConfig};
use hyplayer::TimeCodeStore;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: hyplayer [--config <player.toml>] <timecode.yaml> [score.svg] [--at <seconds>]";

struct Args {
    config: Option<String>,
    timecode: String,
    svg: Option<String>,
    at: Option<f64>,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut config = None;
    let mut at = None;
    let mut positional = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(iter.next().ok_or("--config needs a path")?.clone());
            }
            "--at" => {
                let value = iter.next().ok_or("--at needs a time in seconds")?;
                let seconds = value
                    .parse::<f64>()
                    .map_err(|_| format!("invalid time '{value}'"))?;
                at = Some(seconds);
            }
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let timecode = positional.next().ok_or("missing time-code document")?;
    Ok(Args {
        config,
        timecode,
        svg: positional.next(),
        at,
    })
}

fn init_tracing(config: &PlayerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &str) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading file '{}': {}", path, e);
            process::exit(1);
        }
    }
}

/// Bar and sounding notes at `time`, as the synchronizer would see them.
fn describe_instant(store: &TimeCodeStore, time: f64, config: &PlayerConfig) -> serde_json::Value {
    let query = time + store.meta().lead_time_seconds;
    let bar = store.measure_at(query);
    let margin = config.highlight_margin_seconds;
    let notes = store.active_notes_in_window(query - margin, query + margin);
    json!({
        "time": time,
        "queryTime": query,
        "bar": bar,
        "barElements": store.elements_for_measure(bar).len(),
        "activeNotes": notes,
    })
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let args = match parse_args(&args) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            process::exit(1);
        }
    };

    let config = match &args.config {
        Some(path) => load_config(Path::new(path)),
        None => PlayerConfig::default(),
    };
    init_tracing(&config);

    let timecode = read(&args.timecode);
    let svg = args.svg.as_deref().map(read);

    let store = match hyplayer::load_store(&timecode, svg.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut report = json!({
        "totalNotes": store.notes().len(),
        "totalBars": store.total_bars(),
        "firstBar": store.first_bar(),
        "channels": store.channels(),
        "endTime": store.end_time(),
        "skippedNotes": store.skipped_notes(),
        "missingRefs": store.missing_refs(),
    });
    if let Some(time) = args.at {
        report["at"] = describe_instant(&store, time, &config);
    }

    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
