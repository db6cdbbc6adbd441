//! External score ledger collaborators.
//!
//! The ledger is a slow, fallible store for frozen round scores. The tick loop
//! never calls it directly; see [`crate::submission`].

mod http;
mod memory;

pub use http::HttpLedger;
pub use memory::MemoryLedger;

use crate::config::{LedgerConfig, LedgerMode};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors from a ledger call.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("relay returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One player's frozen score as sent to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    pub player_id: String,
    pub score: u32,
}

/// Body of a score submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub session_id: String,
    pub round_number: u32,
    pub scores: Vec<ScoreSubmission>,
}

impl SubmitRequest {
    /// Same checks the relay applies before touching the ledger.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.session_id.is_empty() {
            return Err(LedgerError::Rejected("sessionId is required".into()));
        }
        if self.round_number < 1 {
            return Err(LedgerError::Rejected("roundNumber must be at least 1".into()));
        }
        if self.scores.is_empty() {
            return Err(LedgerError::Rejected("scores must not be empty".into()));
        }
        if let Some(bad) = self.scores.iter().find(|s| s.player_id.is_empty()) {
            return Err(LedgerError::Rejected(format!(
                "score {} has no playerId",
                bad.score
            )));
        }
        Ok(())
    }
}

/// Proof that a submission landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Transaction hash or equivalent.
    pub reference: String,
    pub block: Option<u64>,
}

/// A score as stored by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalScore {
    pub player_id: String,
    pub score: u32,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub round_number: Option<u32>,
}

/// Aggregate best player across every round of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSessionTop {
    pub player_id: String,
    pub total_score: u64,
    pub round_count: u32,
}

/// Result of a score read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalScores {
    #[serde(default)]
    pub round_scores: Vec<ExternalScore>,
    #[serde(default)]
    pub session_top_score: Option<ExternalSessionTop>,
}

/// A store for round scores.
///
/// Futures are `'static` so the caller can detach them onto the runtime.
pub trait Ledger: Send + Sync {
    fn submit_scores(&self, request: SubmitRequest) -> BoxFuture<'static, Result<SubmitReceipt, LedgerError>>;

    fn fetch_scores(
        &self,
        session_id: &str,
        round_number: u32,
    ) -> BoxFuture<'static, Result<ExternalScores, LedgerError>>;
}

/// Build the configured ledger, if any.
pub fn from_config(config: &LedgerConfig) -> anyhow::Result<Option<Arc<dyn Ledger>>> {
    Ok(match config.mode {
        LedgerMode::Disabled => None,
        LedgerMode::Memory => Some(Arc::new(MemoryLedger::new())),
        LedgerMode::Http => Some(Arc::new(HttpLedger::new(
            &config.endpoint,
            Duration::from_millis(config.timeout_ms),
        )?)),
    })
}

/// The configured session id, or a fresh one derived from the clock.
pub fn session_id(config: &LedgerConfig) -> String {
    if config.session_id.is_empty() {
        format!("session-{}", unix_millis())
    } else {
        config.session_id.clone()
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Relays serialise big integers as strings; accept either.
pub(crate) fn number_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Sum every player's scores over the given rounds and pick the best total.
///
/// Ties keep the player seen first. All-zero totals yield no top.
pub(crate) fn session_top<'a>(
    rounds: impl IntoIterator<Item = &'a [ExternalScore]>,
) -> Option<ExternalSessionTop> {
    let mut totals: Vec<ExternalSessionTop> = Vec::new();
    for round in rounds {
        for score in round {
            match totals.iter_mut().find(|t| t.player_id == score.player_id) {
                Some(total) => {
                    total.total_score += u64::from(score.score);
                    total.round_count += 1;
                }
                None => totals.push(ExternalSessionTop {
                    player_id: score.player_id.clone(),
                    total_score: u64::from(score.score),
                    round_count: 1,
                }),
            }
        }
    }

    let mut best: Option<ExternalSessionTop> = None;
    for total in totals {
        let highest = best.as_ref().map_or(0, |b| b.total_score);
        if total.total_score > highest {
            best = Some(total);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(id: &str, score: u32) -> ExternalScore {
        ExternalScore {
            player_id: id.into(),
            score,
            timestamp: None,
            round_number: None,
        }
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = SubmitRequest {
            session_id: "s".into(),
            round_number: 2,
            scores: vec![ScoreSubmission {
                player_id: "a".into(),
                score: 40,
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sessionId"], "s");
        assert_eq!(json["roundNumber"], 2);
        assert_eq!(json["scores"][0]["playerId"], "a");
    }

    #[test]
    fn test_validation_matches_relay() {
        let mut request = SubmitRequest {
            session_id: String::new(),
            round_number: 1,
            scores: vec![ScoreSubmission {
                player_id: "a".into(),
                score: 1,
            }],
        };
        assert!(matches!(request.validate(), Err(LedgerError::Rejected(_))));
        request.session_id = "s".into();
        assert!(request.validate().is_ok());
        request.round_number = 0;
        assert!(request.validate().is_err());
        request.round_number = 1;
        request.scores.clear();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_read_response_parses() {
        let body = r#"{
            "sessionId": "s",
            "roundNumber": 1,
            "roundScores": [{"playerId": "a", "score": 41, "timestamp": 1700000000, "roundNumber": 1}],
            "sessionTopScore": {"playerId": "a", "totalScore": 90, "roundCount": 2}
        }"#;
        let scores: ExternalScores = serde_json::from_str(body).unwrap();
        assert_eq!(scores.round_scores[0].score, 41);
        assert_eq!(scores.round_scores[0].timestamp, Some(1_700_000_000));
        assert_eq!(scores.session_top_score.unwrap().total_score, 90);

        let empty: ExternalScores = serde_json::from_str(r#"{"sessionTopScore": null}"#).unwrap();
        assert!(empty.round_scores.is_empty());
        assert!(empty.session_top_score.is_none());
    }

    #[test]
    fn test_session_top_picks_highest_total() {
        let round1 = vec![score("a", 40), score("b", 35)];
        let round2 = vec![score("b", 50), score("a", 30)];
        let top = session_top([round1.as_slice(), round2.as_slice()]).unwrap();
        assert_eq!(top.player_id, "b");
        assert_eq!(top.total_score, 85);
        assert_eq!(top.round_count, 2);

        assert!(session_top([[score("a", 0)].as_slice()]).is_none());
    }

    #[test]
    fn test_disabled_mode_builds_nothing() {
        let config = LedgerConfig::default();
        assert!(from_config(&config).unwrap().is_none());
        assert!(session_id(&config).starts_with("session-"));
    }
}
