//! Keystroke emission.
//!
//! The run loop talks to a [`KeySink`]. The real sink owns an `enigo::Enigo` on a
//! dedicated thread since the handle is not guaranteed to be `Send`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedKey {
    Tab,
    Down,
    Up,
    Enter,
    Escape,
    Space,
}

impl NamedKey {
    pub fn name(self) -> &'static str {
        match self {
            NamedKey::Tab => "tab",
            NamedKey::Down => "down",
            NamedKey::Up => "up",
            NamedKey::Enter => "enter",
            NamedKey::Escape => "esc",
            NamedKey::Space => "space",
        }
    }

    fn to_enigo(self) -> enigo::Key {
        match self {
            NamedKey::Tab => enigo::Key::Tab,
            NamedKey::Down => enigo::Key::DownArrow,
            NamedKey::Up => enigo::Key::UpArrow,
            NamedKey::Enter => enigo::Key::Return,
            NamedKey::Escape => enigo::Key::Escape,
            NamedKey::Space => enigo::Key::Space,
        }
    }
}

impl fmt::Display for NamedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NamedKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tab" => Ok(NamedKey::Tab),
            "down" | "arrowdown" | "downarrow" => Ok(NamedKey::Down),
            "up" | "arrowup" | "uparrow" => Ok(NamedKey::Up),
            "enter" | "return" => Ok(NamedKey::Enter),
            "esc" | "escape" => Ok(NamedKey::Escape),
            "space" => Ok(NamedKey::Space),
            other => Err(format!("unknown key name '{other}'")),
        }
    }
}

/// A single emission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keystroke {
    Text(String),
    Key(NamedKey),
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("failed to connect to the input system: {0}")]
    Connect(String),
    #[error("failed to emit {stroke}: {reason}")]
    Emit { stroke: String, reason: String },
    #[error("keystroke worker stopped")]
    WorkerGone,
}

/// Destination for simulated keyboard input.
pub trait KeySink: Send + Sync + 'static {
    fn send(&mut self, stroke: Keystroke) -> impl Future<Output = Result<(), InjectError>> + Send;
}

type Request = (Keystroke, oneshot::Sender<Result<(), InjectError>>);

/// Emits keystrokes to the OS input focus through `enigo`.
#[derive(Clone)]
pub struct EnigoSink {
    tx: mpsc::UnboundedSender<Request>,
}

impl EnigoSink {
    /// Start the emission thread and wait until it has an input connection.
    pub fn connect() -> Result<Self, InjectError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Request>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), InjectError>>();

        std::thread::Builder::new()
            .name("keystroke-worker".into())
            .spawn(move || {
                use enigo::{Direction, Enigo, Keyboard, Settings};

                let mut enigo = match Enigo::new(&Settings::default()) {
                    Ok(e) => {
                        let _ = ready_tx.send(Ok(()));
                        e
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(InjectError::Connect(e.to_string())));
                        return;
                    }
                };

                while let Some((stroke, reply)) = rx.blocking_recv() {
                    let res = match &stroke {
                        Keystroke::Text(text) => enigo.text(text),
                        Keystroke::Key(key) => enigo.key(key.to_enigo(), Direction::Click),
                    };
                    let _ = reply.send(res.map_err(|e| InjectError::Emit {
                        stroke: describe(&stroke),
                        reason: e.to_string(),
                    }));
                }
                tracing::debug!("keystroke worker exiting");
            })
            .map_err(|e| InjectError::Connect(e.to_string()))?;

        ready_rx.recv().map_err(|_| InjectError::WorkerGone)??;
        Ok(Self { tx })
    }
}

impl KeySink for EnigoSink {
    fn send(&mut self, stroke: Keystroke) -> impl Future<Output = Result<(), InjectError>> + Send {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self.tx.send((stroke, reply_tx));
        async move {
            queued.map_err(|_| InjectError::WorkerGone)?;
            reply_rx.await.map_err(|_| InjectError::WorkerGone)?
        }
    }
}

/// Logs keystrokes instead of emitting them.
#[derive(Debug, Clone, Default)]
pub struct DryRunSink;

impl KeySink for DryRunSink {
    fn send(&mut self, stroke: Keystroke) -> impl Future<Output = Result<(), InjectError>> + Send {
        tracing::info!(target: "autocopier::dry_run", "{}", describe(&stroke));
        std::future::ready(Ok(()))
    }
}

fn describe(stroke: &Keystroke) -> String {
    match stroke {
        Keystroke::Text(t) => format!("text {t:?}"),
        Keystroke::Key(k) => format!("key <{k}>"),
    }
}
