use crate::engine::keys::NamedKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Fixed pause before the countdown so the user can focus the target window.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(3);
/// Pause between typed characters.
pub const DEFAULT_CHAR_DELAY: Duration = Duration::from_millis(2);
/// Pause after the confirm key before the next item.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub series: Vec<String>,
    pub companion: String,
    #[serde(with = "humantime_serde")]
    pub per_step_delay: Duration,
    pub countdown_secs: u32,
    #[serde(with = "humantime_serde", default = "default_warmup")]
    pub warmup: Duration,
    #[serde(with = "humantime_serde", default = "default_char_delay")]
    pub char_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_settle_delay")]
    pub settle_delay: Duration,
    #[serde(default = "default_advance_key")]
    pub advance_key: NamedKey,
    #[serde(default = "default_confirm_key")]
    pub confirm_key: NamedKey,
}

fn default_warmup() -> Duration {
    DEFAULT_WARMUP
}

fn default_char_delay() -> Duration {
    DEFAULT_CHAR_DELAY
}

fn default_settle_delay() -> Duration {
    DEFAULT_SETTLE_DELAY
}

fn default_advance_key() -> NamedKey {
    NamedKey::Tab
}

fn default_confirm_key() -> NamedKey {
    NamedKey::Down
}

impl RunConfig {
    /// Build a config with the stock pacing used by the desktop tool.
    pub fn new(
        series: Vec<String>,
        companion: impl Into<String>,
        per_step_delay: Duration,
        countdown_secs: u32,
    ) -> Self {
        Self {
            series,
            companion: companion.into(),
            per_step_delay,
            countdown_secs,
            warmup: DEFAULT_WARMUP,
            char_delay: DEFAULT_CHAR_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            advance_key: default_advance_key(),
            confirm_key: default_confirm_key(),
        }
    }

    /// Reject configurations that must never start a run.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.series.is_empty() {
            return Err(ValidationError::EmptySeries);
        }
        if self.companion.trim().is_empty() {
            return Err(ValidationError::MissingCompanion);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("empty series list")]
    EmptySeries,
    #[error("missing companion value")]
    MissingCompanion,
}

/// Split a raw block of text into the ordered series to inject.
pub fn parse_series(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    WarmingUp,
    CountingDown { remaining: u32 },
    Injecting,
    Finished,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Finished | RunState::Cancelled | RunState::Failed
        )
    }
}

/// Human-facing phase updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    StartingIn(u32),
    Injecting,
    Cancelled,
    Finished,
    Failed(String),
}

impl Status {
    /// Render the status line shown to the user.
    pub fn to_message(&self) -> String {
        match self {
            Status::StartingIn(secs) => format!("starting in {secs}..."),
            Status::Injecting => "injecting".to_string(),
            Status::Cancelled => "cancelled".to_string(),
            Status::Finished => "finished successfully".to_string(),
            Status::Failed(reason) => format!("failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    Status(Status),
    Progress(Progress),
    /// Front-end notices that are not part of the run itself.
    Info(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Finished,
    Cancelled,
    Failed { reason: String },
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        match self {
            RunOutcome::Finished => RunState::Finished,
            RunOutcome::Cancelled => RunState::Cancelled,
            RunOutcome::Failed { .. } => RunState::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub progress: Progress,
    pub started_at: String,
    pub ended_at: String,
}

/// Current UTC time as RFC 3339, used to stamp reports.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_series_splits_on_any_whitespace_and_keeps_order() {
        let got = parse_series("  111 222\n333\t\t111 \r\n");
        assert_eq!(got, vec!["111", "222", "333", "111"]);
    }

    #[test]
    fn parse_series_of_blank_text_is_empty() {
        assert!(parse_series(" \n\t ").is_empty());
    }

    #[test]
    fn validate_rejects_empty_series_before_companion() {
        let cfg = RunConfig::new(Vec::new(), "", Duration::from_millis(10), 1);
        assert_eq!(cfg.validate(), Err(ValidationError::EmptySeries));
    }

    #[test]
    fn validate_rejects_blank_companion() {
        let cfg = RunConfig::new(vec!["1".into()], "   ", Duration::from_millis(10), 1);
        assert_eq!(cfg.validate(), Err(ValidationError::MissingCompanion));
    }

    #[test]
    fn status_messages_match_user_facing_text() {
        assert_eq!(Status::StartingIn(3).to_message(), "starting in 3...");
        assert_eq!(Status::Injecting.to_message(), "injecting");
        assert_eq!(Status::Cancelled.to_message(), "cancelled");
        assert_eq!(Status::Finished.to_message(), "finished successfully");
    }

    #[test]
    fn config_deserializes_with_default_pacing() {
        let cfg: RunConfig = serde_json::from_str(
            r#"{"series":["a"],"companion":"15052025","per_step_delay":"90ms","countdown_secs":5}"#,
        )
        .unwrap();
        assert_eq!(cfg.per_step_delay, Duration::from_millis(90));
        assert_eq!(cfg.warmup, DEFAULT_WARMUP);
        assert_eq!(cfg.confirm_key, NamedKey::Down);
    }

    #[test]
    fn report_json_carries_outcome_not_state() {
        let report = RunReport {
            outcome: RunOutcome::Cancelled,
            progress: Progress { completed: 1, total: 2 },
            started_at: "2025-05-15T10:00:00Z".into(),
            ended_at: "2025-05-15T10:00:05Z".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "Cancelled");
        assert_eq!(json["progress"]["completed"], 1);
        assert!(json.get("state").is_none());
        assert_eq!(report.outcome.state(), RunState::Cancelled);
    }
}
