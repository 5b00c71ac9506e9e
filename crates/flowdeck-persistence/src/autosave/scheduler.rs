//! Trailing-edge debounce over save requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use flowdeck_model::StateDocument;

/// A buffered save that is ready to commit.
///
/// `epoch` is the engine's clear-generation at the moment the commit was
/// dispatched; the commit loop drops requests stamped before a clear.
#[derive(Debug)]
pub(crate) struct CommitRequest {
    pub state: StateDocument,
    pub epoch: u64,
}

#[derive(Debug)]
enum Command {
    Schedule(StateDocument),
    Flush,
    Cancel,
}

/// Coalesces bursts of save requests into a single trailing commit.
///
/// Each `schedule` call replaces the buffered state and re-arms the timer;
/// when the timer fires, only the most recent state is committed. At most
/// one commit is outstanding per scheduler. Handing the commit off is a
/// channel send — neither the timer firing nor `flush` waits for the
/// commit itself to finish.
pub struct DebouncedSaveScheduler {
    commands: mpsc::UnboundedSender<Command>,
    pending: Arc<AtomicBool>,
}

impl DebouncedSaveScheduler {
    /// Spawn the timer task. Must be called from within a tokio runtime.
    pub(crate) fn new(
        debounce: Duration,
        commits: mpsc::UnboundedSender<CommitRequest>,
        epoch: Arc<AtomicU64>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));

        tokio::spawn(run(
            command_rx,
            commits,
            epoch,
            Arc::clone(&pending),
            debounce,
        ));

        Self { commands, pending }
    }

    /// Buffer a state and (re)arm the debounce timer.
    ///
    /// Replaces any previously buffered state: last write wins.
    pub fn schedule(&self, state: StateDocument) {
        self.pending.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Schedule(state));
    }

    /// Commit the buffered state immediately, if any.
    ///
    /// Idempotent: flushing with nothing pending is a no-op. The pending
    /// flag is cleared before this returns, so a teardown path reading
    /// `is_pending` right after sees a consistent status.
    pub fn flush(&self) {
        self.pending.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Flush);
    }

    /// Drop the buffered state and disarm the timer.
    pub fn cancel(&self) {
        self.pending.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Cancel);
    }

    /// Whether a save is buffered and waiting to commit.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    commits: mpsc::UnboundedSender<CommitRequest>,
    epoch: Arc<AtomicU64>,
    pending: Arc<AtomicBool>,
    debounce: Duration,
) {
    let mut buffered: Option<StateDocument> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Schedule(state)) => {
                    buffered = Some(state);
                    deadline = Some(Instant::now() + debounce);
                    pending.store(true, Ordering::SeqCst);
                }
                Some(Command::Flush) => {
                    deadline = None;
                    dispatch(&mut buffered, &commits, &epoch, &pending);
                }
                Some(Command::Cancel) => {
                    buffered = None;
                    deadline = None;
                    pending.store(false, Ordering::SeqCst);
                }
                None => {
                    if buffered.is_some() {
                        tracing::debug!("scheduler dropped with a buffered save; discarding");
                    }
                    break;
                }
            },
            () = timer => {
                deadline = None;
                dispatch(&mut buffered, &commits, &epoch, &pending);
            }
        }
    }
}

fn dispatch(
    buffered: &mut Option<StateDocument>,
    commits: &mpsc::UnboundedSender<CommitRequest>,
    epoch: &AtomicU64,
    pending: &AtomicBool,
) {
    if let Some(state) = buffered.take() {
        pending.store(false, Ordering::SeqCst);
        let _ = commits.send(CommitRequest {
            state,
            epoch: epoch.load(Ordering::SeqCst),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(marker: u64) -> StateDocument {
        StateDocument::from_value(json!({"projects": [marker]})).unwrap()
    }

    fn scheduler(
        debounce_ms: u64,
    ) -> (DebouncedSaveScheduler, mpsc::UnboundedReceiver<CommitRequest>) {
        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        let scheduler =
            DebouncedSaveScheduler::new(Duration::from_millis(debounce_ms), commit_tx, epoch);
        (scheduler, commit_rx)
    }

    #[tokio::test]
    async fn test_burst_commits_only_last_state() {
        let (scheduler, mut commits) = scheduler(50);

        for marker in 1..=5 {
            scheduler.schedule(doc(marker));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let committed = commits.recv().await.unwrap();
        assert_eq!(committed.state, doc(5));

        // Exactly one commit for the whole burst
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(commits.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_flush_commits_immediately() {
        let (scheduler, mut commits) = scheduler(10_000);

        scheduler.schedule(doc(1));
        assert!(scheduler.is_pending());

        scheduler.flush();
        // Status must read not-pending as soon as flush returns, before
        // the commit is observed.
        assert!(!scheduler.is_pending());

        let committed = commits.recv().await.unwrap();
        assert_eq!(committed.state, doc(1));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test]
    async fn test_flush_with_nothing_pending_is_noop() {
        let (scheduler, mut commits) = scheduler(50);

        scheduler.flush();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(commits.try_recv().is_err());

        // A later schedule still works normally
        scheduler.schedule(doc(2));
        let committed = commits.recv().await.unwrap();
        assert_eq!(committed.state, doc(2));
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_save() {
        let (scheduler, mut commits) = scheduler(30);

        scheduler.schedule(doc(1));
        scheduler.cancel();
        assert!(!scheduler.is_pending());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(commits.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reschedule_resets_timer() {
        let (scheduler, mut commits) = scheduler(60);

        scheduler.schedule(doc(1));
        tokio::time::sleep(Duration::from_millis(40)).await;
        scheduler.schedule(doc(2));
        tokio::time::sleep(Duration::from_millis(40)).await;

        // First timer would have fired by now had it not been reset
        assert!(commits.try_recv().is_err());

        let committed = commits.recv().await.unwrap();
        assert_eq!(committed.state, doc(2));
    }
}
