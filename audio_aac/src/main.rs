use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::info;

use audio_aac::{
    probe_codec, route_for_codec, run_task, Route, StandardiseOptions, Task, TaskOptions,
    TaskOutcome, MAX_RETRY_ATTEMPTS,
};
use shared_utils::{
    collect_pending, init_logging, mirrored_output, progress_channel, remaining_logs,
    require_tools, worker_budget, BatchResult, TaskLog, OVERALL_KEY,
};

/// External tools every run depends on.
const REQUIRED_TOOLS: &[&str] = &["ffprobe", "ffmpeg", "qaac"];

#[derive(Parser)]
#[command(name = "audio-aac")]
#[command(version, about = "Music library normaliser - AAC compression with standardised metadata", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every pending file under SOURCE into a mirrored tree under DEST
    Run {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[arg(value_name = "DEST")]
        dest: PathBuf,

        /// Where retained failure logs go (default: DEST/.logs)
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Fraction of CPU cores to keep busy
        #[arg(long, default_value_t = 0.75)]
        saturation: f64,

        /// Swap artist and album-artist (and their sort tags) on the way out
        #[arg(long)]
        swap_artist_album_artist: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Probe one file and report its codec and conversion route
    Probe {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            dest,
            log_dir,
            saturation,
            swap_artist_album_artist,
            verbose,
        } => {
            init_logging("audio_aac", verbose)?;
            run_batch(
                source,
                dest,
                log_dir,
                saturation,
                swap_artist_album_artist,
            )
        }

        Commands::Probe { input, output } => {
            init_logging("audio_aac", false)?;
            probe_one(&input, output)
        }
    }
}

fn probe_one(input: &PathBuf, output: OutputFormat) -> anyhow::Result<()> {
    if !input.is_file() {
        eprintln!("❌ Error: Input path does not exist: {}", input.display());
        std::process::exit(1);
    }

    let (codec, route) = match probe_codec(input) {
        Ok(codec) => {
            let route = route_for_codec(&codec);
            (Some(codec), route)
        }
        Err(e) => {
            eprintln!("⚠️  Probe failed ({e}), treating as generic input");
            (None, Route::FullReencode)
        }
    };

    match output {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "path": input.display().to_string(),
                    "codec": codec,
                    "route": route.describe(),
                })
            );
        }
        OutputFormat::Human => {
            println!("\n🎯 Conversion Route");
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("📁 File: {}", input.display());
            println!("🎵 Codec: {}", codec.as_deref().unwrap_or("unknown"));
            println!("💡 Route: {}", route.describe());
            println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        }
    }

    Ok(())
}

fn run_batch(
    source: PathBuf,
    dest: PathBuf,
    log_dir: Option<PathBuf>,
    saturation: f64,
    swap_artist_album_artist: bool,
) -> anyhow::Result<()> {
    if !source.is_dir() {
        eprintln!("❌ Error: Source is not a directory: {}", source.display());
        std::process::exit(1);
    }
    require_tools(REQUIRED_TOOLS)?;

    let log_dir = log_dir.unwrap_or_else(|| dest.join(".logs"));

    info!("🎧 Library Conversion (AAC)");
    info!("   Source: {}", source.display());
    info!("   Destination: {}", dest.display());
    if swap_artist_album_artist {
        info!("   🔀 Artist/album-artist swap: ENABLED");
    }

    let discovery = collect_pending(&source, &dest);
    info!(
        "   📂 {} audio files found, {} pending",
        discovery.encountered,
        discovery.pending.len()
    );
    if discovery.pending.is_empty() {
        info!("✅ Nothing to do, library is already converted");
        return Ok(());
    }

    let workers = worker_budget(saturation);
    info!("   ⚙️  Workers: {}", workers);
    info!("");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;

    let (channel, aggregator) = progress_channel();
    let display = std::thread::spawn(move || aggregator.run());

    let overall = channel.sender(OVERALL_KEY);
    overall.set_total(discovery.pending.len() as u64);
    overall.describe("Converting");

    let options = TaskOptions {
        max_attempts: MAX_RETRY_ATTEMPTS,
        standardise: StandardiseOptions {
            swap_artist_album_artist,
        },
    };

    let worker_channel = channel.clone();
    let outcomes: Vec<(PathBuf, TaskOutcome)> = pool.install(|| {
        discovery
            .pending
            .par_iter()
            .enumerate()
            .map_with(worker_channel, |chan, (index, input)| {
                let relative = input
                    .strip_prefix(&source)
                    .unwrap_or(input)
                    .to_path_buf();
                let task = Task {
                    source: input.clone(),
                    relative: relative.clone(),
                    output: mirrored_output(input, &source, &dest),
                };
                let log = TaskLog::new(&log_dir, &relative);
                let sender = chan.sender(index + 1);

                let outcome = run_task(&task, &options, &log, &sender);
                chan.sender(OVERALL_KEY).advance(1);
                (relative, outcome)
            })
            .collect()
    });

    overall.remove();
    drop(overall);
    drop(channel);
    let _ = display.join();

    let mut result = BatchResult::new();
    for (relative, outcome) in outcomes {
        match outcome {
            TaskOutcome::Succeeded => result.success(),
            TaskOutcome::Skipped => result.skip(),
            TaskOutcome::Failed => result.fail(relative),
        }
    }

    info!("");
    info!(
        "📊 {} converted, {} skipped, {} failed",
        result.succeeded, result.skipped, result.failed
    );

    // the retained logs are the authoritative failure record; report them
    // even if they disagree with this run's counters
    let retained = remaining_logs(&log_dir);
    if result.failed > 0 || !retained.is_empty() {
        for relative in &result.failures {
            eprintln!("   ❌ {}", relative.display());
        }
        eprintln!(
            "📝 {} failure log(s) retained in {}",
            retained.len(),
            log_dir.display()
        );
        std::process::exit(1);
    }

    info!("✅ Complete!");
    Ok(())
}
