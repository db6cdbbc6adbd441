//! In-process ledger for offline play and tests.

use super::{
    session_top, unix_millis, ExternalScore, ExternalScores, Ledger, LedgerError, SubmitReceipt,
    SubmitRequest,
};
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Store {
    rounds: HashMap<(String, u32), Vec<ExternalScore>>,
    next_block: u64,
    submissions: usize,
    fail_submissions: bool,
    fail_reads: bool,
    latency: Duration,
}

/// Ledger backed by a map, with the relay's validation and optional injected
/// failures and latency.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    store: Arc<Mutex<Store>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches the store.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    pub fn set_fail_submissions(&self, fail: bool) {
        self.lock().fail_submissions = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Number of accepted submissions.
    pub fn submission_count(&self) -> usize {
        self.lock().submissions
    }

    /// Stored scores of one round, in submission order.
    pub fn scores_for(&self, session_id: &str, round_number: u32) -> Vec<ExternalScore> {
        self.lock()
            .rounds
            .get(&(session_id.to_string(), round_number))
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A poisoned store only means a test panicked mid-call.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn latency(&self) -> Duration {
        self.lock().latency
    }
}

impl Ledger for MemoryLedger {
    fn submit_scores(&self, request: SubmitRequest) -> BoxFuture<'static, Result<SubmitReceipt, LedgerError>> {
        let ledger = self.clone();
        let latency = self.latency();
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            request.validate()?;

            let mut store = ledger.lock();
            if store.fail_submissions {
                return Err(LedgerError::Transport("injected submission failure".into()));
            }
            let now = unix_millis() / 1000;
            let entries = store
                .rounds
                .entry((request.session_id.clone(), request.round_number))
                .or_default();
            entries.extend(request.scores.iter().map(|s| ExternalScore {
                player_id: s.player_id.clone(),
                score: s.score,
                timestamp: Some(now),
                round_number: Some(request.round_number),
            }));

            store.next_block += 1;
            store.submissions += 1;
            let block = store.next_block;
            Ok(SubmitReceipt {
                reference: format!(
                    "mem-{}-{}-{}",
                    request.session_id, request.round_number, block
                ),
                block: Some(block),
            })
        }
        .boxed()
    }

    fn fetch_scores(
        &self,
        session_id: &str,
        round_number: u32,
    ) -> BoxFuture<'static, Result<ExternalScores, LedgerError>> {
        let ledger = self.clone();
        let latency = self.latency();
        let session_id = session_id.to_string();
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let store = ledger.lock();
            if store.fail_reads {
                return Err(LedgerError::Transport("injected read failure".into()));
            }

            let mut round_scores = store
                .rounds
                .get(&(session_id.clone(), round_number))
                .cloned()
                .unwrap_or_default();
            round_scores.sort_by(|a, b| b.score.cmp(&a.score));

            let mut session_rounds: Vec<(&u32, &Vec<ExternalScore>)> = store
                .rounds
                .iter()
                .filter(|((session, _), _)| *session == session_id)
                .map(|((_, round), scores)| (round, scores))
                .collect();
            session_rounds.sort_by_key(|(round, _)| **round);

            Ok(ExternalScores {
                round_scores,
                session_top_score: session_top(session_rounds.iter().map(|(_, s)| s.as_slice())),
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ScoreSubmission;

    fn request(round: u32, scores: &[(&str, u32)]) -> SubmitRequest {
        SubmitRequest {
            session_id: "s1".into(),
            round_number: round,
            scores: scores
                .iter()
                .map(|(id, score)| ScoreSubmission {
                    player_id: id.to_string(),
                    score: *score,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_submit_then_read_back() {
        let ledger = MemoryLedger::new();
        let receipt = ledger
            .submit_scores(request(1, &[("a", 35), ("b", 40)]))
            .await
            .unwrap();
        assert!(receipt.reference.starts_with("mem-s1-1"));
        assert_eq!(receipt.block, Some(1));

        let read = ledger.fetch_scores("s1", 1).await.unwrap();
        let ids: Vec<&str> = read.round_scores.iter().map(|s| s.player_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(read.round_scores.iter().all(|s| s.timestamp.is_some()));
        assert_eq!(read.session_top_score.unwrap().player_id, "b");
    }

    #[tokio::test]
    async fn test_session_top_spans_rounds() {
        let ledger = MemoryLedger::new();
        ledger.submit_scores(request(1, &[("a", 50), ("b", 40)])).await.unwrap();
        ledger.submit_scores(request(2, &[("b", 45), ("a", 30)])).await.unwrap();

        let top = ledger.fetch_scores("s1", 2).await.unwrap().session_top_score.unwrap();
        assert_eq!(top.player_id, "b");
        assert_eq!(top.total_score, 85);
        assert_eq!(top.round_count, 2);
    }

    #[tokio::test]
    async fn test_invalid_submission_is_rejected() {
        let ledger = MemoryLedger::new();
        let err = ledger.submit_scores(request(1, &[])).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let ledger = MemoryLedger::new();
        ledger.set_fail_submissions(true);
        assert!(ledger.submit_scores(request(1, &[("a", 1)])).await.is_err());
        assert!(ledger.scores_for("s1", 1).is_empty());

        ledger.set_fail_reads(true);
        assert!(ledger.fetch_scores("s1", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_round_reads_empty() {
        let ledger = MemoryLedger::new();
        let read = ledger.fetch_scores("nobody", 9).await.unwrap();
        assert!(read.round_scores.is_empty());
        assert!(read.session_top_score.is_none());
    }
}
