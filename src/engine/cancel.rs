use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Single-use cancellation flag shared between a run and whoever may stop it.
///
/// Closing is idempotent and happens at most once; every reader observes the
/// closed state afterwards, including readers that start waiting later.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Close the signal. Returns `true` only for the call that closed it.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is closed.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once closed.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Sleep for `dur` unless cancelled first. Returns `false` on cancellation.
    pub async fn sleep(&self, dur: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancelled() => false,
            _ = tokio::time::sleep(dur) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_closes_exactly_once() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        assert!(signal.cancel());
        assert!(!signal.cancel());
        assert!(signal.is_cancelled());
    }

    #[test]
    fn clones_share_the_same_flag() {
        let signal = CancelSignal::new();
        let other = signal.clone();
        assert!(other.cancel());
        assert!(signal.is_cancelled());
        assert!(!signal.cancel());
    }

    #[tokio::test]
    async fn late_waiters_see_an_already_closed_signal() {
        let signal = CancelSignal::new();
        signal.cancel();
        signal.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_cut_short_by_cancel() {
        let signal = CancelSignal::new();
        let remote = signal.clone();
        let waiter = tokio::spawn(async move { signal.sleep(Duration::from_secs(60)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        remote.cancel();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancel() {
        let signal = CancelSignal::new();
        assert!(signal.sleep(Duration::from_millis(250)).await);
    }

    #[test]
    fn concurrent_cancels_close_once() {
        let signal = CancelSignal::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = signal.clone();
                std::thread::spawn(move || s.cancel())
            })
            .collect();
        let closed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();
        assert_eq!(closed, 1);
    }
}
