pub mod cancel;
pub mod keys;

use crate::model::{
    now_rfc3339, Progress, RunConfig, RunEvent, RunOutcome, RunReport, RunState, Status,
};
use cancel::CancelSignal;
use keys::{InjectError, KeySink, Keystroke, NamedKey};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Why the item loop stopped early.
enum Interrupt {
    Cancelled,
    Failed(InjectError),
}

impl From<InjectError> for Interrupt {
    fn from(e: InjectError) -> Self {
        Interrupt::Failed(e)
    }
}

/// One run of warm-up, countdown and injection over a fixed config.
pub struct InjectionEngine<K> {
    cfg: RunConfig,
    sink: K,
    cancel: CancelSignal,
}

impl<K: KeySink> InjectionEngine<K> {
    pub fn new(cfg: RunConfig, sink: K, cancel: CancelSignal) -> Self {
        Self { cfg, sink, cancel }
    }

    pub async fn run(
        mut self,
        event_tx: mpsc::UnboundedSender<RunEvent>,
        state_tx: watch::Sender<RunState>,
    ) -> RunReport {
        let started_at = now_rfc3339();
        let mut progress = Progress::new(self.cfg.series.len());

        let outcome = match self.drive(&event_tx, &state_tx, &mut progress).await {
            Ok(()) => {
                let _ = event_tx.send(RunEvent::Status(Status::Finished));
                RunOutcome::Finished
            }
            Err(Interrupt::Cancelled) => {
                tracing::info!(completed = progress.completed, "run cancelled");
                let _ = event_tx.send(RunEvent::Status(Status::Cancelled));
                RunOutcome::Cancelled
            }
            Err(Interrupt::Failed(e)) => {
                tracing::error!(completed = progress.completed, "injection failed: {e}");
                let reason = e.to_string();
                let _ = event_tx.send(RunEvent::Status(Status::Failed(reason.clone())));
                RunOutcome::Failed { reason }
            }
        };
        state_tx.send_replace(outcome.state());

        RunReport {
            outcome,
            progress,
            started_at,
            ended_at: now_rfc3339(),
        }
    }

    async fn drive(
        &mut self,
        event_tx: &mpsc::UnboundedSender<RunEvent>,
        state_tx: &watch::Sender<RunState>,
        progress: &mut Progress,
    ) -> Result<(), Interrupt> {
        state_tx.send_replace(RunState::WarmingUp);
        // The warm-up is not interruptible; the first countdown tick observes any cancel.
        tokio::time::sleep(self.cfg.warmup).await;

        for remaining in (1..=self.cfg.countdown_secs).rev() {
            state_tx.send_replace(RunState::CountingDown { remaining });
            let _ = event_tx.send(RunEvent::Status(Status::StartingIn(remaining)));
            if self.cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            self.pause(Duration::from_secs(1)).await?;
        }

        state_tx.send_replace(RunState::Injecting);
        let _ = event_tx.send(RunEvent::Status(Status::Injecting));

        let series = std::mem::take(&mut self.cfg.series);
        for item in &series {
            if self.cancel.is_cancelled() {
                return Err(Interrupt::Cancelled);
            }
            tracing::debug!(item = %item, index = progress.completed + 1, "injecting item");
            self.inject_item(item).await?;

            progress.completed += 1;
            let _ = event_tx.send(RunEvent::Progress(*progress));
        }
        Ok(())
    }

    /// Type one item and its companion. The sequence runs as a unit so the
    /// target never sees a half-filled row; cancellation is checked between items.
    async fn inject_item(&mut self, item: &str) -> Result<(), InjectError> {
        let step = self.cfg.per_step_delay;

        self.type_text(item).await?;
        tokio::time::sleep(step).await;

        self.press(self.cfg.advance_key).await?;
        tokio::time::sleep(step).await;

        let companion = self.cfg.companion.clone();
        self.type_text(&companion).await?;
        tokio::time::sleep(step).await;

        self.press(self.cfg.confirm_key).await?;
        tokio::time::sleep(self.cfg.settle_delay).await;
        Ok(())
    }

    /// Type `text` one character at a time with the configured gap.
    async fn type_text(&mut self, text: &str) -> Result<(), InjectError> {
        let mut buf = [0u8; 4];
        for (i, ch) in text.chars().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.cfg.char_delay).await;
            }
            let chunk = ch.encode_utf8(&mut buf).to_owned();
            self.sink.send(Keystroke::Text(chunk)).await?;
        }
        Ok(())
    }

    async fn press(&mut self, key: NamedKey) -> Result<(), InjectError> {
        self.sink.send(Keystroke::Key(key)).await
    }

    async fn pause(&self, dur: Duration) -> Result<(), Interrupt> {
        if self.cancel.sleep(dur).await {
            Ok(())
        } else {
            Err(Interrupt::Cancelled)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use pretty_assertions::assert_eq;

    fn cfg(series: &[&str]) -> RunConfig {
        RunConfig::new(
            series.iter().map(|s| s.to_string()).collect(),
            "15052025",
            Duration::from_millis(10),
            1,
        )
    }

    struct Harness {
        events: mpsc::UnboundedReceiver<RunEvent>,
        state: watch::Receiver<RunState>,
        run: tokio::task::JoinHandle<RunReport>,
    }

    fn spawn(cfg: RunConfig, sink: RecordingSink, cancel: CancelSignal) -> Harness {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(RunState::Idle);
        let engine = InjectionEngine::new(cfg, sink, cancel);
        let run = tokio::spawn(engine.run(event_tx, state_tx));
        Harness { events, state, run }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn text(s: &str) -> Keystroke {
        Keystroke::Text(s.into())
    }

    #[tokio::test(start_paused = true)]
    async fn uninterrupted_run_types_items_in_order() {
        let sink = RecordingSink::default();
        let mut h = spawn(cfg(&["111", "222"]), sink.clone(), CancelSignal::new());
        let report = h.run.await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Finished);
        assert_eq!(report.progress, Progress { completed: 2, total: 2 });
        assert_eq!(*h.state.borrow(), RunState::Finished);

        assert_eq!(
            sink.strokes(),
            vec![
                text("111"),
                Keystroke::Key(NamedKey::Tab),
                text("15052025"),
                Keystroke::Key(NamedKey::Down),
                text("222"),
                Keystroke::Key(NamedKey::Tab),
                text("15052025"),
                Keystroke::Key(NamedKey::Down),
            ]
        );
        assert_eq!(
            drain(&mut h.events),
            vec![
                RunEvent::Status(Status::StartingIn(1)),
                RunEvent::Status(Status::Injecting),
                RunEvent::Progress(Progress { completed: 1, total: 2 }),
                RunEvent::Progress(Progress { completed: 2, total: 2 }),
                RunEvent::Status(Status::Finished),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn progress_updates_increase_by_one() {
        let series: Vec<String> = (0..7).map(|i| format!("S{i}")).collect();
        let refs: Vec<&str> = series.iter().map(String::as_str).collect();
        let mut h = spawn(cfg(&refs), RecordingSink::default(), CancelSignal::new());
        h.run.await.unwrap();

        let completed: Vec<usize> = drain(&mut h.events)
            .into_iter()
            .filter_map(|ev| match ev {
                RunEvent::Progress(p) => Some(p.completed),
                _ => None,
            })
            .collect();
        assert_eq!(completed, (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_from_configured_seconds() {
        let mut config = cfg(&["1"]);
        config.countdown_secs = 3;
        let mut h = spawn(config, RecordingSink::default(), CancelSignal::new());
        h.run.await.unwrap();

        let ticks: Vec<u32> = drain(&mut h.events)
            .into_iter()
            .filter_map(|ev| match ev {
                RunEvent::Status(Status::StartingIn(n)) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_countdown_injects_nothing() {
        let sink = RecordingSink::default();
        let cancel = CancelSignal::new();
        let mut h = spawn(cfg(&["111", "222"]), sink.clone(), cancel.clone());
        cancel.cancel();
        let report = h.run.await.unwrap();

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.progress.completed, 0);
        assert!(sink.strokes().is_empty());
        assert_eq!(
            drain(&mut h.events),
            vec![
                RunEvent::Status(Status::StartingIn(1)),
                RunEvent::Status(Status::Cancelled),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_countdown_sleep_stops_the_run() {
        let sink = RecordingSink::default();
        let cancel = CancelSignal::new();
        let mut config = cfg(&["111"]);
        config.countdown_secs = 5;
        let h = spawn(config, sink.clone(), cancel.clone());

        // Past the warm-up, inside the countdown.
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert!(matches!(*h.state.borrow(), RunState::CountingDown { .. }));
        cancel.cancel();

        let report = h.run.await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.progress.completed, 0);
        assert!(sink.strokes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_item_finishes_the_row_then_stops() {
        let sink = RecordingSink::default();
        let cancel = CancelSignal::new();
        let h = spawn(cfg(&["111", "222", "333"]), sink.clone(), cancel.clone());

        // Cancel right after the second item's text, before its companion.
        loop {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if sink.strokes().contains(&text("222")) {
                break;
            }
        }
        cancel.cancel();

        let report = h.run.await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.progress, Progress { completed: 2, total: 3 });
        let strokes = sink.strokes();
        assert_eq!(
            &strokes[4..],
            &[
                text("222"),
                Keystroke::Key(NamedKey::Tab),
                text("15052025"),
                Keystroke::Key(NamedKey::Down),
            ]
        );
        assert!(!strokes.contains(&text("333")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_settle_delay_counts_the_typed_item() {
        let sink = RecordingSink::default();
        let cancel = CancelSignal::new();
        let mut h = spawn(cfg(&["111", "222"]), sink.clone(), cancel.clone());

        loop {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if sink.strokes().contains(&Keystroke::Key(NamedKey::Down)) {
                break;
            }
        }
        cancel.cancel();

        let report = h.run.await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.progress, Progress { completed: 1, total: 2 });
        assert_eq!(
            sink.strokes(),
            vec![
                text("111"),
                Keystroke::Key(NamedKey::Tab),
                text("15052025"),
                Keystroke::Key(NamedKey::Down),
            ]
        );
        let events = drain(&mut h.events);
        assert!(events.contains(&RunEvent::Progress(Progress { completed: 1, total: 2 })));
        assert_eq!(events.last(), Some(&RunEvent::Status(Status::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn text_is_sent_per_character_with_char_delay() {
        let sink = RecordingSink::per_chunk();
        let mut config = cfg(&["111"]);
        config.companion = "15".into();
        config.warmup = Duration::ZERO;
        config.countdown_secs = 0;
        config.char_delay = Duration::from_millis(5);
        config.settle_delay = Duration::from_millis(60);

        let start = tokio::time::Instant::now();
        let h = spawn(config, sink.clone(), CancelSignal::new());
        h.run.await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(
            sink.strokes(),
            vec![
                text("1"),
                text("1"),
                text("1"),
                Keystroke::Key(NamedKey::Tab),
                text("1"),
                text("5"),
                Keystroke::Key(NamedKey::Down),
            ]
        );
        // (3 - 1) + (2 - 1) character gaps, three step delays, one settle delay.
        let expected = Duration::from_millis(3 * 5 + 3 * 10 + 60);
        assert!(elapsed >= expected, "elapsed {elapsed:?} < {expected:?}");
        assert!(elapsed < expected + Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn emission_failure_aborts_with_partial_progress() {
        // Item "ab" emits a, b, tab, 8 companion chars, down: 12 strokes.
        let sink = RecordingSink::failing_at(13);
        let mut h = spawn(cfg(&["ab", "cd"]), sink.clone(), CancelSignal::new());
        let report = h.run.await.unwrap();

        assert!(matches!(report.outcome, RunOutcome::Failed { .. }));
        assert_eq!(report.progress.completed, 1);
        assert_eq!(*h.state.borrow(), RunState::Failed);
        let last = drain(&mut h.events).pop();
        assert!(matches!(last, Some(RunEvent::Status(Status::Failed(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_keys_are_used_between_fields() {
        let sink = RecordingSink::default();
        let mut config = cfg(&["x"]);
        config.advance_key = NamedKey::Enter;
        config.confirm_key = NamedKey::Up;
        let h = spawn(config, sink.clone(), CancelSignal::new());
        h.run.await.unwrap();

        assert_eq!(
            sink.strokes(),
            vec![
                text("x"),
                Keystroke::Key(NamedKey::Enter),
                text("15052025"),
                Keystroke::Key(NamedKey::Up),
            ]
        );
    }
}
