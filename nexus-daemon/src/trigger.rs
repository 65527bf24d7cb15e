//! Debounced auto-sync trigger.
//!
//! Three-state machine driving automatic propagation:
//!
//! - **Idle** — no change since the last pass.
//! - **Scheduled** — a change arrived; a fixed-delay timer is pending. Further
//!   changes reset the timer instead of queueing more passes.
//! - **Running** — the pass closure is executing. A change landing now sets a
//!   pending flag; when the pass finishes the trigger re-enters **Scheduled**
//!   immediately, so no mutation is ever dropped.
//!
//! The pass closure owns error handling; the trigger runs it and moves on.
//! Callers that want mutual exclusion with explicit syncs put the propagation
//! gate inside the closure.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerState {
    Idle,
    Scheduled,
    Running,
}

/// Handle to a spawned trigger. Cloneable; all clones feed the same machine.
#[derive(Debug, Clone)]
pub struct AutoSyncTrigger {
    changes: mpsc::UnboundedSender<()>,
    state: watch::Receiver<TriggerState>,
}

impl AutoSyncTrigger {
    /// Spawn the trigger loop. `pass` is invoked once per expired window.
    ///
    /// The loop exits when every [`AutoSyncTrigger`] clone has been dropped.
    pub fn spawn<F, Fut>(window: Duration, pass: F) -> (Self, JoinHandle<()>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TriggerState::Idle);
        let handle = tokio::spawn(trigger_loop(change_rx, state_tx, window, pass));
        (
            Self {
                changes: change_tx,
                state: state_rx,
            },
            handle,
        )
    }

    /// Record one registry change. Callers gate this on the auto-sync
    /// preference; a change that never reaches the trigger schedules nothing.
    pub fn notify_change(&self) {
        let _ = self.changes.send(());
    }

    pub fn state(&self) -> TriggerState {
        *self.state.borrow()
    }

    /// Watch every state transition (for status display and tests).
    pub fn subscribe(&self) -> watch::Receiver<TriggerState> {
        self.state.clone()
    }
}

async fn trigger_loop<F, Fut>(
    mut changes: mpsc::UnboundedReceiver<()>,
    state_tx: watch::Sender<TriggerState>,
    window: Duration,
    mut pass: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending = false;
    loop {
        if !pending {
            let _ = state_tx.send(TriggerState::Idle);
            if changes.recv().await.is_none() {
                return;
            }
        }
        pending = false;

        let _ = state_tx.send(TriggerState::Scheduled);
        let mut deadline = Instant::now() + window;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                event = changes.recv() => match event {
                    Some(()) => deadline = Instant::now() + window,
                    None => {
                        let _ = state_tx.send(TriggerState::Idle);
                        return;
                    }
                },
            }
        }

        let _ = state_tx.send(TriggerState::Running);
        pass().await;

        // Changes that landed mid-pass re-enter Scheduled without idling.
        loop {
            match changes.try_recv() {
                Ok(()) => pending = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    let _ = state_tx.send(TriggerState::Idle);
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::advance;

    const WINDOW: Duration = Duration::from_millis(1000);

    /// Let the spawned trigger task run without advancing the clock.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn burst_of_changes_coalesces_into_one_pass() {
        let count = Arc::new(AtomicUsize::new(0));
        let (trigger, _handle) = AutoSyncTrigger::spawn(WINDOW, {
            let count = count.clone();
            move || {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        settle().await;

        // Changes at t = 0, 100, 200 ms; each resets the window.
        for _ in 0..3 {
            trigger.notify_change();
            settle().await;
            advance(Duration::from_millis(100)).await;
        }

        advance(Duration::from_millis(890)).await; // t = 1190, window ends at 1200
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "window still open");

        advance(Duration::from_millis(20)).await; // t = 1210
        settle().await;
        assert_eq!(
            count.load(Ordering::SeqCst),
            1,
            "one pass, roughly one window after the last change"
        );

        advance(Duration::from_millis(3000)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "nothing further scheduled");
        assert_eq!(trigger.state(), TriggerState::Idle);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn change_during_running_pass_schedules_follow_up() {
        let count = Arc::new(AtomicUsize::new(0));
        let (trigger, _handle) = AutoSyncTrigger::spawn(WINDOW, {
            let count = count.clone();
            move || {
                let count = count.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        settle().await;

        trigger.notify_change();
        settle().await;
        advance(WINDOW).await; // t = 1000: pass starts
        settle().await;
        assert_eq!(trigger.state(), TriggerState::Running);

        trigger.notify_change(); // lands mid-pass
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "first pass still running");

        advance(Duration::from_millis(300)).await; // t = 1300: first pass done
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            trigger.state(),
            TriggerState::Scheduled,
            "mid-pass change must re-arm the trigger"
        );

        advance(Duration::from_millis(999)).await; // t = 2299
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "second window still open");

        advance(Duration::from_millis(1)).await; // t = 2300: second pass starts
        settle().await;
        advance(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2, "no mutation dropped");
        assert_eq!(trigger.state(), TriggerState::Idle);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn states_are_published_in_order() {
        let count = Arc::new(AtomicUsize::new(0));
        let (trigger, _handle) = AutoSyncTrigger::spawn(WINDOW, {
            let count = count.clone();
            move || {
                let count = count.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        settle().await;
        assert_eq!(trigger.state(), TriggerState::Idle);

        trigger.notify_change();
        settle().await;
        assert_eq!(trigger.state(), TriggerState::Scheduled);

        advance(WINDOW).await;
        settle().await;
        assert_eq!(trigger.state(), TriggerState::Running);

        advance(Duration::from_millis(300)).await;
        settle().await;
        assert_eq!(trigger.state(), TriggerState::Idle);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn no_change_means_no_pass() {
        let count = Arc::new(AtomicUsize::new(0));
        let (trigger, _handle) = AutoSyncTrigger::spawn(WINDOW, {
            let count = count.clone();
            move || {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        settle().await;

        advance(Duration::from_millis(5000)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(trigger.state(), TriggerState::Idle);
    }
}
