//! External submission coordinator.
//!
//! Bridges the tick loop to the ledger without ever awaiting it. A submission
//! is detached onto the runtime; its completion only writes a status cell,
//! and the next [`SubmissionCoordinator::poll`] from the tick loop reads that
//! cell once and surfaces the terminal state. Reads after a successful
//! submission follow the same pattern through a second cell.

use crate::ledger::{ExternalScores, Ledger, LedgerError, SubmitReceipt, SubmitRequest};
use protocol::{SubmissionPhase, SubmissionView};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A single-writer, single-reader handoff slot tagged with the submission
/// generation that produced it.
#[derive(Debug)]
struct Cell<T> {
    generation: u64,
    value: Option<T>,
}

type Shared<T> = Arc<Mutex<Cell<T>>>;

fn shared<T>() -> Shared<T> {
    Arc::new(Mutex::new(Cell {
        generation: 0,
        value: None,
    }))
}

fn lock<T>(cell: &Mutex<Cell<T>>) -> MutexGuard<'_, Cell<T>> {
    cell.lock().unwrap_or_else(|e| e.into_inner())
}

/// Empty the slot and hand it to a new generation.
fn reset<T>(cell: &Mutex<Cell<T>>, generation: u64) {
    let mut slot = lock(cell);
    slot.generation = generation;
    slot.value = None;
}

/// Write `value` unless a newer submission has taken over the slot.
fn publish<T>(cell: &Mutex<Cell<T>>, generation: u64, value: T) -> bool {
    let mut slot = lock(cell);
    if slot.generation != generation {
        return false;
    }
    slot.value = Some(value);
    true
}

/// Terminal state of one round's submission, surfaced once.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionUpdate {
    pub round: u32,
    pub view: SubmissionView,
}

/// Everything the tick loop learned from one poll.
#[derive(Debug, Default)]
pub struct SubmissionPoll {
    pub status: Option<SubmissionUpdate>,
    /// Scores read back from the ledger, with the round they belong to.
    pub external: Option<(u32, ExternalScores)>,
}

type Outcome = (u32, Result<SubmitReceipt, LedgerError>);

pub struct SubmissionCoordinator {
    ledger: Option<Arc<dyn Ledger>>,
    session_id: String,
    timeout: Duration,
    fetch_after_submit: bool,
    generation: u64,
    /// Round whose outcome has not been surfaced yet.
    in_flight: Option<u32>,
    status: Shared<Outcome>,
    fetched: Shared<(u32, ExternalScores)>,
}

impl SubmissionCoordinator {
    pub fn new(
        ledger: Option<Arc<dyn Ledger>>,
        session_id: String,
        timeout: Duration,
        fetch_after_submit: bool,
    ) -> Self {
        Self {
            ledger,
            session_id,
            timeout,
            fetch_after_submit,
            generation: 0,
            in_flight: None,
            status: shared(),
            fetched: shared(),
        }
    }

    #[inline]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[inline]
    pub fn in_flight(&self) -> Option<u32> {
        self.in_flight
    }

    /// Dispatch a submission and return the `Pending` status to broadcast now.
    ///
    /// Returns `None` when no ledger is configured. A submission still in
    /// flight from an earlier round is superseded: its result is dropped.
    pub fn submit(&mut self, request: SubmitRequest) -> Option<SubmissionUpdate> {
        let ledger = self.ledger.clone()?;
        let round = request.round_number;

        if let Some(previous) = self.in_flight {
            warn!("Submission for round {} superseded by round {}", previous, round);
        }
        self.generation += 1;
        self.in_flight = Some(round);
        let generation = self.generation;
        reset(&self.status, generation);
        reset(&self.fetched, generation);

        info!(
            "Submitting {} scores for round {} of session {}",
            request.scores.len(),
            round,
            request.session_id
        );
        let status = self.status.clone();
        let limit = self.timeout;
        tokio::spawn(async move {
            let result = match timeout(limit, ledger.submit_scores(request)).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout(limit.as_millis() as u64)),
            };
            if !publish(&status, generation, (round, result)) {
                debug!("Dropped stale submission result for round {}", round);
            }
        });

        Some(SubmissionUpdate {
            round,
            view: SubmissionView::pending(),
        })
    }

    /// Read the handoff cells. Called once per tick.
    pub fn poll(&mut self) -> SubmissionPoll {
        let outcome = lock(&self.status).value.take();
        let external = lock(&self.fetched).value.take();

        let status = outcome.map(|(round, result)| {
            self.in_flight = None;
            let view = match result {
                Ok(receipt) => {
                    info!(
                        "Round {} scores recorded: {} (block {:?})",
                        round, receipt.reference, receipt.block
                    );
                    if self.fetch_after_submit {
                        self.fetch(round);
                    }
                    SubmissionView {
                        phase: SubmissionPhase::Succeeded,
                        reference: Some(receipt.reference),
                        block: receipt.block.map(|b| b.to_string()),
                        error: None,
                    }
                }
                Err(err) => {
                    warn!("Round {} score submission failed: {}", round, err);
                    SubmissionView {
                        phase: SubmissionPhase::Failed,
                        reference: None,
                        block: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            SubmissionUpdate { round, view }
        });

        SubmissionPoll { status, external }
    }

    /// Detached read of a round's external scores. Failures are logged and
    /// swallowed; local scores stay as they are.
    fn fetch(&self, round: u32) {
        let Some(ledger) = self.ledger.clone() else {
            return;
        };
        let fetched = self.fetched.clone();
        let generation = self.generation;
        let limit = self.timeout;
        let read = ledger.fetch_scores(&self.session_id, round);
        tokio::spawn(async move {
            match timeout(limit, read).await {
                Ok(Ok(scores)) => {
                    if !publish(&fetched, generation, (round, scores)) {
                        debug!("Dropped stale score read for round {}", round);
                    }
                }
                Ok(Err(err)) => warn!("Score read for round {} failed, keeping local scores: {}", round, err),
                Err(_) => warn!("Score read for round {} timed out, keeping local scores", round),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryLedger, ScoreSubmission};

    fn request(round: u32) -> SubmitRequest {
        SubmitRequest {
            session_id: "s".into(),
            round_number: round,
            scores: vec![
                ScoreSubmission {
                    player_id: "a".into(),
                    score: 40,
                },
                ScoreSubmission {
                    player_id: "b".into(),
                    score: 35,
                },
            ],
        }
    }

    fn coordinator(ledger: &MemoryLedger, timeout_ms: u64) -> SubmissionCoordinator {
        SubmissionCoordinator::new(
            Some(Arc::new(ledger.clone())),
            "s".into(),
            Duration::from_millis(timeout_ms),
            true,
        )
    }

    /// Poll like the tick loop would until a status shows up.
    async fn next_status(coordinator: &mut SubmissionCoordinator) -> SubmissionUpdate {
        for _ in 0..400 {
            if let Some(status) = coordinator.poll().status {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no submission status surfaced");
    }

    #[tokio::test]
    async fn test_disabled_submits_nothing() {
        let mut coordinator = SubmissionCoordinator::new(None, "s".into(), Duration::from_secs(1), true);
        assert!(coordinator.submit(request(1)).is_none());
        assert!(coordinator.poll().status.is_none());
    }

    #[tokio::test]
    async fn test_pending_then_success_once() {
        let ledger = MemoryLedger::new();
        let mut coordinator = coordinator(&ledger, 1000);

        let pending = coordinator.submit(request(1)).unwrap();
        assert_eq!(pending.view.phase, SubmissionPhase::Pending);
        // Nothing has run yet; the tick loop is never blocked.
        assert!(coordinator.poll().status.is_none());

        let done = next_status(&mut coordinator).await;
        assert_eq!(done.round, 1);
        assert_eq!(done.view.phase, SubmissionPhase::Succeeded);
        assert!(done.view.reference.is_some());
        assert_eq!(coordinator.in_flight(), None);
        assert_eq!(ledger.scores_for("s", 1).len(), 2);

        // Surfaced exactly once; the read-back follows.
        let mut external = None;
        for _ in 0..400 {
            let poll = coordinator.poll();
            assert!(poll.status.is_none());
            if poll.external.is_some() {
                external = poll.external;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let (round, scores) = external.unwrap();
        assert_eq!(round, 1);
        assert_eq!(scores.round_scores[0].player_id, "a");
    }

    #[tokio::test]
    async fn test_failure_is_terminal_and_not_retried() {
        let ledger = MemoryLedger::new();
        ledger.set_fail_submissions(true);
        let mut coordinator = coordinator(&ledger, 1000);

        coordinator.submit(request(1));
        let done = next_status(&mut coordinator).await;
        assert_eq!(done.view.phase, SubmissionPhase::Failed);
        assert!(done.view.error.is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let poll = coordinator.poll();
        assert!(poll.status.is_none());
        assert!(poll.external.is_none());
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let ledger = MemoryLedger::new().with_latency(Duration::from_millis(500));
        let mut coordinator = coordinator(&ledger, 20);

        coordinator.submit(request(1));
        let done = next_status(&mut coordinator).await;
        assert_eq!(done.view.phase, SubmissionPhase::Failed);
        assert!(done.view.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_read_failure_is_swallowed() {
        let ledger = MemoryLedger::new();
        ledger.set_fail_reads(true);
        let mut coordinator = coordinator(&ledger, 1000);

        coordinator.submit(request(1));
        assert_eq!(next_status(&mut coordinator).await.view.phase, SubmissionPhase::Succeeded);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(coordinator.poll().external.is_none());
    }

    #[tokio::test]
    async fn test_superseded_submission_result_is_dropped() {
        let ledger = MemoryLedger::new().with_latency(Duration::from_millis(20));
        let mut coordinator = coordinator(&ledger, 1000);

        coordinator.submit(request(1));
        coordinator.submit(request(2));
        let done = next_status(&mut coordinator).await;
        assert_eq!(done.round, 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(coordinator.poll().status.is_none());
    }
}
