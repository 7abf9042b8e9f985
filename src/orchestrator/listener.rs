//! Global cancel key.
//!
//! `rdev::listen` blocks its thread for the life of the process, so the listener
//! gets its own OS thread and forwards presses as [`UiCommand::Cancel`].

use super::session::{CancelSource, UiCommand};
use rdev::{listen, EventType, Key};
use tokio::sync::mpsc::UnboundedSender;

/// Parse a key name like "esc" or "F9" into an `rdev` key.
pub(crate) fn parse_cancel_key(s: &str) -> Result<Key, String> {
    let lower = s.trim().to_ascii_lowercase();
    let key = match lower.as_str() {
        "esc" | "escape" => Key::Escape,
        "pause" => Key::Pause,
        "scrolllock" => Key::ScrollLock,
        "end" => Key::End,
        "home" => Key::Home,
        "insert" => Key::Insert,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => return Err(format!("unsupported cancel key '{s}'")),
    };
    Ok(key)
}

/// Spawn the listener thread. Each press of `watch` sends a cancel command.
pub(crate) fn spawn_cancel_listener(
    watch: Key,
    cmd_tx: UnboundedSender<UiCommand>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("cancel-key-listener".into())
        .spawn(move || {
            tracing::info!("global cancel key listener active ({watch:?})");
            let result = listen(move |event| {
                if let EventType::KeyPress(k) = event.event_type {
                    tracing::debug!("key pressed: {:?}", k);
                    if k == watch {
                        let _ = cmd_tx.send(UiCommand::Cancel(CancelSource::Key));
                    }
                }
            });
            if let Err(e) = result {
                tracing::warn!("cancel key listener stopped: {:?}", e);
            }
        })?;
    Ok(())
}
