//! Run lifecycle controller.
//!
//! Owns the single active run, its cancellation signal and its state channel.

use crate::engine::cancel::CancelSignal;
use crate::engine::keys::KeySink;
use crate::engine::InjectionEngine;
use crate::model::{RunConfig, RunEvent, RunReport, RunState, ValidationError};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("a run is already in progress")]
    Busy,
    #[error("run task failed: {0}")]
    Join(String),
}

/// What the controller remembers about the most recent run.
struct ActiveRun {
    cancel: CancelSignal,
    state: watch::Receiver<RunState>,
    task: AbortHandle,
}

/// Caller-side handle for a started run.
pub struct RunHandle {
    cancel: CancelSignal,
    state: watch::Receiver<RunState>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Close this run's cancellation signal. Returns `true` if this call closed it.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Subscribe to state transitions of this run.
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    pub async fn join(self) -> Result<RunReport, ControllerError> {
        self.task
            .await
            .map_err(|e| ControllerError::Join(e.to_string()))
    }
}

/// Starts injection runs one at a time against a keystroke sink.
pub struct InjectionController<K> {
    sink: K,
    event_tx: mpsc::UnboundedSender<RunEvent>,
    active: Mutex<Option<ActiveRun>>,
}

impl<K: KeySink + Clone> InjectionController<K> {
    pub fn new(sink: K, event_tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            sink,
            event_tx,
            active: Mutex::new(None),
        }
    }

    /// Validate `cfg` and spawn a run. Fails without side effects if the config
    /// is invalid or another run is still going.
    pub fn start(&self, cfg: RunConfig) -> Result<RunHandle, ControllerError> {
        cfg.validate()?;

        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if active.as_ref().is_some_and(|run| !run.task.is_finished()) {
            return Err(ControllerError::Busy);
        }

        tracing::info!(
            items = cfg.series.len(),
            countdown = cfg.countdown_secs,
            delay = ?cfg.per_step_delay,
            "starting run"
        );

        let cancel = CancelSignal::new();
        let (state_tx, state_rx) = watch::channel(RunState::WarmingUp);
        let engine = InjectionEngine::new(cfg, self.sink.clone(), cancel.clone());
        let task = tokio::spawn(engine.run(self.event_tx.clone(), state_tx));

        *active = Some(ActiveRun {
            cancel: cancel.clone(),
            state: state_rx.clone(),
            task: task.abort_handle(),
        });

        Ok(RunHandle {
            cancel,
            state: state_rx,
            task,
        })
    }

    /// Request cancellation of the active run. Safe to call from any thread,
    /// any number of times. Returns `true` only when this call closed the signal.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        match active.as_ref() {
            Some(run) if !run.task.is_finished() => {
                let closed = run.cancel.cancel();
                if closed {
                    tracing::info!("cancel requested");
                }
                closed
            }
            _ => false,
        }
    }

    /// State of the most recent run, or `Idle` if none was started.
    pub fn state(&self) -> RunState {
        let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        active
            .as_ref()
            .map(|run| *run.state.borrow())
            .unwrap_or(RunState::Idle)
    }
}
