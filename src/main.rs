//! Handover CLI
//!
//! Usage:
//!   handover                                  # Dry run, default settings
//!   handover --mode no-anticipation --trials 3
//!   handover --config session.json            # Settings from a JSON file
//!   handover --serve --addr 127.0.0.1:3000    # With the status monitor
//!
//! The bundled binary drives the loop against the scripted scene. Simulator
//! clients plug in through the library's `SignalChannel` trait.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use handover::config::{ExperimentConfig, HandSource};
use handover::core::{
    run_server, EventSink, Experiment, ExperimentSummary, Fanout, InputPeakField, MemoryChannel,
    MemoryJournal, MonitorState, ScriptedScene, SessionJournal, StopHandle,
};
use handover::error::ExperimentError;
use handover::types::{ArchitectureMode, LoopStatus, Phase};
use handover::{MONITOR_JOURNAL_CAPACITY, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "handover",
    version = VERSION,
    about = "Handover - signal synchronization loop for human-robot joint action",
    long_about = "Keeps a simulator and an intention field in step so the robot can\n\
                  anticipate which object its human partner is about to take.\n\n\
                  Architectures:\n  \
                  hand-motion        - Hand height and proximity drive the field\n  \
                  action-likelihood  - Per-object reach likelihoods drive the field\n  \
                  no-anticipation    - The field only sees which objects are present\n  \
                  baseline           - No field, lowest-numbered present object"
)]
struct Args {
    /// Decision architecture
    #[arg(short, long, value_enum)]
    mode: Option<ArchitectureMode>,

    /// JSON settings file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of trials
    #[arg(short, long)]
    trials: Option<u32>,

    /// Loop period in milliseconds
    #[arg(long)]
    comms_period: Option<u64>,

    /// Keep-alive after the last trial, in milliseconds
    #[arg(long)]
    linger: Option<u64>,

    /// Source of the hand stimulus in hand-motion mode
    #[arg(long, value_enum)]
    hand_source: Option<HandSource>,

    /// Poll the hand pose on a second connection
    #[arg(long)]
    separate_pose_channel: bool,

    /// Directory for session logs (default: ./output)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Run the HTTP status monitor
    #[arg(short, long)]
    serve: bool,

    /// Monitor address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }
    init_tracing(!args.no_color);

    match run(args).await {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            error!(error = %e, "session ended with an error");
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(ansi: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).with_ansi(ansi);
    Registry::default().with(filter).with(fmt_layer).init();
}

/// Defaults, then the config file, then flags
fn load_config(args: &Args) -> Result<ExperimentConfig, ExperimentError> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(trials) = args.trials {
        config.trials = trials;
    }
    if let Some(period) = args.comms_period {
        config.comms_period_ms = period;
    }
    if let Some(linger) = args.linger {
        config.linger_ms = linger;
    }
    if let Some(source) = args.hand_source {
        config.hand_source = source;
    }
    if args.separate_pose_channel {
        config.separate_pose_channel = true;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<ExperimentSummary, ExperimentError> {
    let config = load_config(&args)?;
    print_header(&config);

    let journal = SessionJournal::create(&config.output_dir)?;
    info!(dir = %journal.dir().display(), "session journal opened");
    let (event_tx, _) = broadcast::channel(256);
    let live = MemoryJournal::with_broadcast(event_tx).with_capacity(MONITOR_JOURNAL_CAPACITY);
    let sink: Arc<dyn EventSink> = Arc::new(Fanout::new().with(Arc::new(journal)).with(Arc::new(live.clone())));

    let (status_tx, status_rx) = watch::channel(LoopStatus::new(config.mode, config.trials));

    // Simulator side
    let channel = MemoryChannel::new();
    let scene_stop = StopHandle::default();
    let scene = ScriptedScene::new(channel.clone(), config.field.anchors).spawn(scene_stop.clone(), config.comms_period())?;

    let mut experiment = Experiment::new(
        config.clone(),
        Box::new(channel.clone()),
        Box::new(InputPeakField::new(config.field.size)),
        sink,
    )
    .with_status(status_tx);
    if config.separate_pose_channel {
        experiment = experiment.with_pose_channel(Box::new(channel.clone()));
    }
    let handle = experiment.start()?;

    if args.serve {
        let state = MonitorState::new(status_rx.clone(), live);
        let addr = args.addr.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, state).await {
                warn!(error = %e, "status monitor stopped");
            }
        });
    }

    let stop = handle.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current cycle");
            stop.stop();
        }
    });

    tokio::spawn(watch_phases(status_rx, args.no_color));

    let summary = tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|_| ExperimentError::LoopPanicked)??;

    scene_stop.stop();
    if scene.join().is_err() {
        warn!("scripted scene thread panicked");
    }
    Ok(summary)
}

/// Print one console line per phase or trial change
async fn watch_phases(mut status: watch::Receiver<LoopStatus>, no_color: bool) {
    let mut last: Option<(Phase, u32)> = None;
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        if last == Some((current.phase, current.trial)) {
            continue;
        }
        last = Some((current.phase, current.trial));
        if no_color {
            println!("{}", current.to_parseable_string());
        } else {
            println!("{} {}", phase_label(current.phase), current.to_parseable_string().dimmed());
        }
    }
}

fn phase_label(phase: Phase) -> colored::ColoredString {
    let label = format!("[{}]", phase);
    match phase {
        Phase::AwaitingConnection | Phase::AwaitingSimStart | Phase::AwaitingObjects => label.yellow(),
        Phase::Running => label.green().bold(),
        Phase::Finished => label.cyan().bold(),
    }
}

fn print_header(config: &ExperimentConfig) {
    println!("{}", "========================================".bold());
    println!("  {} v{} - {}", "Handover".bold(), VERSION, config.mode.to_string().green());
    println!(
        "  trials: {} | period: {} ms | output: {}",
        config.trials,
        config.comms_period_ms,
        config.output_dir.display()
    );
    println!("{}", "========================================".bold());
    println!();
}

fn print_summary(summary: &ExperimentSummary) {
    let outcome = if summary.stopped {
        "stopped".yellow()
    } else {
        "completed".green()
    };
    println!();
    println!(
        "Session {}: {} trials, {} cycles",
        outcome, summary.trials_completed, summary.cycles
    );
}
