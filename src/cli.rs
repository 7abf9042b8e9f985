use crate::engine::keys::{DryRunSink, EnigoSink, KeySink, NamedKey};
use crate::model::{parse_series, RunConfig, RunEvent, RunOutcome, RunReport};
use crate::orchestrator::{
    parse_cancel_key, run_session, spawn_cancel_listener, CancelSource, InjectionController,
    UiCommand,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "autocopier",
    version,
    about = "Type a series of values into the focused window, each followed by a companion value"
)]
pub struct Cli {
    /// Series to type, separated by whitespace
    #[arg(long, conflicts_with_all = ["series_file", "from_clipboard"])]
    pub series: Option<String>,

    /// Read the series from a file ("-" for stdin)
    #[arg(long, conflicts_with = "from_clipboard")]
    pub series_file: Option<PathBuf>,

    /// Read the series from the clipboard
    #[arg(long)]
    pub from_clipboard: bool,

    /// Value typed after each series item, e.g. a date like 15052025
    #[arg(long)]
    pub companion: String,

    /// Pause after each typed field and key press
    #[arg(long, default_value = "90ms")]
    pub delay: humantime::Duration,

    /// Countdown length in seconds once the warm-up is over
    #[arg(long, default_value_t = 5)]
    pub countdown: u32,

    /// Time to focus the target window before the countdown starts
    #[arg(long, default_value = "3s")]
    pub warmup: humantime::Duration,

    /// Pause between typed characters
    #[arg(long, default_value = "2ms")]
    pub char_delay: humantime::Duration,

    /// Pause after the confirm key before the next item
    #[arg(long, default_value = "60ms")]
    pub settle_delay: humantime::Duration,

    /// Key pressed between an item and the companion value
    #[arg(long, default_value = "tab")]
    pub advance_key: NamedKey,

    /// Key pressed after the companion value
    #[arg(long, default_value = "down")]
    pub confirm_key: NamedKey,

    /// Global key that cancels the run
    #[arg(long, default_value = "esc")]
    pub cancel_key: String,

    /// Do not install the global cancel key listener
    #[arg(long)]
    pub no_cancel_key: bool,

    /// Log keystrokes instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Print events and the final report as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors
    #[arg(long)]
    pub silent: bool,

    /// Export the run report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG is honoured when set)
    #[arg(long, short)]
    pub verbose: bool,
}

/// Build a `RunConfig` from CLI arguments and the loaded series.
pub fn build_config(args: &Cli, series: Vec<String>) -> RunConfig {
    RunConfig {
        warmup: Duration::from(args.warmup),
        char_delay: Duration::from(args.char_delay),
        settle_delay: Duration::from(args.settle_delay),
        advance_key: args.advance_key,
        confirm_key: args.confirm_key,
        ..RunConfig::new(
            series,
            args.companion.trim(),
            Duration::from(args.delay),
            args.countdown,
        )
    }
}

/// Load the raw series block from whichever source was selected.
fn load_series_text(args: &Cli) -> Result<String> {
    if let Some(inline) = args.series.as_deref() {
        return Ok(inline.to_string());
    }
    if let Some(path) = args.series_file.as_deref() {
        if path.as_os_str() == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read series from stdin")?;
            return Ok(buf);
        }
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read series file {}", path.display()));
    }
    if args.from_clipboard {
        return read_clipboard();
    }
    Err(anyhow::anyhow!(
        "no series given: use --series, --series-file or --from-clipboard"
    ))
}

#[cfg(feature = "clipboard")]
fn read_clipboard() -> Result<String> {
    let mut clipboard = arboard::Clipboard::new().context("failed to open clipboard")?;
    clipboard
        .get_text()
        .context("clipboard does not contain text")
}

#[cfg(not(feature = "clipboard"))]
fn read_clipboard() -> Result<String> {
    Err(anyhow::anyhow!("built without clipboard support"))
}

pub async fn run(args: Cli) -> Result<RunReport> {
    if args.silent && args.json {
        return Err(anyhow::anyhow!("--silent and --json cannot be combined"));
    }

    let series = parse_series(&load_series_text(&args)?);
    let cfg = build_config(&args, series);
    // Surface validation problems before touching the input system.
    cfg.validate().context("invalid run configuration")?;

    if args.dry_run {
        tracing::info!("dry run: keystrokes will be logged, not sent");
        run_with_sink(args, cfg, DryRunSink).await
    } else {
        let sink = EnigoSink::connect().context("failed to initialise keystroke injection")?;
        run_with_sink(args, cfg, sink).await
    }
}

async fn run_with_sink<K: KeySink + Clone>(args: Cli, cfg: RunConfig, sink: K) -> Result<RunReport> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    if !args.no_cancel_key {
        let key = parse_cancel_key(&args.cancel_key).map_err(anyhow::Error::msg)?;
        spawn_cancel_listener(key, cmd_tx.clone()).context("failed to start cancel key listener")?;
    }

    let interrupt_tx = cmd_tx.clone();
    let interrupt = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx
                .send(UiCommand::Cancel(CancelSource::Interrupt))
                .is_err()
            {
                break;
            }
        }
    });
    drop(cmd_tx);

    let total = cfg.series.len();
    let mode = OutputMode::from_args(&args);
    if mode == OutputMode::Text {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "{total} item(s) queued; focus the target window now"
        )));
    }

    let render_tx = out_tx.clone();
    let renderer = tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            if let Some(line) = render_event(mode, &ev) {
                let _ = render_tx.send(line);
            }
        }
    });

    let controller = InjectionController::new(sink, evt_tx.clone());
    let result = run_session(&controller, cfg, evt_tx, cmd_rx).await;
    interrupt.abort();
    drop(controller);

    let report = match result {
        Ok(report) => {
            // The controller held the last event sender; the renderer drains and ends.
            let _ = renderer.await;
            report
        }
        Err(e) => {
            // An abandoned run may still hold an event sender.
            renderer.abort();
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    let export = handle_exports(&args, &report);
    match mode {
        OutputMode::Json => {
            let out = serde_json::to_string(&report)?;
            let _ = out_tx.send(OutputLine::Stdout(out));
        }
        OutputMode::Text => {
            for line in crate::text_summary::build_text_summary(&report).lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
        OutputMode::Silent => {}
    }

    drop(out_tx);
    let _ = out_handle.await;
    export?;
    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Text,
    Json,
    Silent,
}

impl OutputMode {
    fn from_args(args: &Cli) -> Self {
        if args.silent {
            OutputMode::Silent
        } else if args.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }
}

fn render_event(mode: OutputMode, ev: &RunEvent) -> Option<OutputLine> {
    match mode {
        OutputMode::Silent => None,
        OutputMode::Json => serde_json::to_string(ev).ok().map(OutputLine::Stdout),
        OutputMode::Text => Some(OutputLine::Stderr(match ev {
            RunEvent::Status(status) => format!("status: {}", status.to_message()),
            RunEvent::Progress(p) => format!("copied: {} / {}", p.completed, p.total),
            RunEvent::Info(msg) => msg.clone(),
        })),
    }
}

/// Write the report to `--export-json` when requested.
fn handle_exports(args: &Cli, report: &RunReport) -> Result<()> {
    if let Some(p) = args.export_json.as_deref() {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(p, json).with_context(|| format!("failed to export {}", p.display()))?;
        tracing::info!(path = %p.display(), "exported run report");
    }
    Ok(())
}

/// Process exit code for a finished run.
pub fn exit_code(report: &RunReport) -> i32 {
    match report.outcome {
        RunOutcome::Finished => 0,
        RunOutcome::Cancelled | RunOutcome::Failed { .. } => 1,
    }
}
