//! Command loop for a single front-end run.
//!
//! Starts the run, forwards cancel commands from the key listener and Ctrl-C,
//! and reports back once the run task completes.

use super::controller::InjectionController;
use crate::engine::keys::KeySink;
use crate::model::{RunConfig, RunEvent, RunReport};
use anyhow::{bail, Context, Result};
use std::fmt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::Duration;

/// Where a cancel request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelSource {
    Key,
    Interrupt,
}

impl fmt::Display for CancelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelSource::Key => f.write_str("cancel key"),
            CancelSource::Interrupt => f.write_str("Ctrl-C"),
        }
    }
}

/// Commands emitted by input sources to control the running session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Cancel(CancelSource),
}

/// Run `cfg` to completion, applying commands from `cmd_rx` along the way.
pub(crate) async fn run_session<K: KeySink + Clone>(
    controller: &InjectionController<K>,
    cfg: RunConfig,
    event_tx: UnboundedSender<RunEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<RunReport> {
    let handle = controller.start(cfg).context("could not start run")?;
    let mut state = handle.watch_state();
    let join = handle.join();
    tokio::pin!(join);

    let mut commands_open = true;
    let mut interrupts = 0u32;
    // Cancel watchdog: the warm-up and an item in progress are not interruptible.
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(UiCommand::Cancel(source)) => {
                        if source == CancelSource::Interrupt {
                            interrupts += 1;
                            // A second Ctrl-C abandons a run stuck in an emission.
                            if interrupts > 1 {
                                controller.cancel();
                                tracing::warn!("interrupted again, abandoning the run");
                                bail!("interrupted twice; run abandoned");
                            }
                        }
                        if controller.cancel() {
                            tracing::debug!(%source, "cancel forwarded");
                            let _ = event_tx.send(RunEvent::Info(format!(
                                "Cancelling ({source})…"
                            )));
                            cancel_deadline = Some(tokio::time::Instant::now() + Duration::from_secs(2));
                        }
                    }
                    None => commands_open = false,
                }
            }
            res = &mut join => {
                return res.context("run task did not complete");
            }
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline && !state.borrow_and_update().is_terminal() {
                        let _ = event_tx.send(RunEvent::Info("Still cancelling…".into()));
                        cancel_deadline = None;
                    }
                }
            }
        }
    }
}
