//! Round lifecycle.
//!
//! Rounds alternate forever between [`RoundPhase::Active`] and
//! [`RoundPhase::ScoreDisplay`]. All timestamps are milliseconds on the
//! session clock passed in by the caller, so the controller itself never
//! reads the wall clock.

use crate::config::RoundConfig;
use crate::entity::PlayerId;
use crate::ledger::{ExternalScores, ScoreSubmission, SubmitRequest};
use crate::world::World;
use protocol::{Color, Phase, RoundView, ScoreEntry, SessionTop};
use tracing::info;

/// Current phase with its time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Active { started_at: u64, ends_at: u64 },
    ScoreDisplay { started_at: u64, ends_at: u64 },
}

impl RoundPhase {
    #[inline]
    pub fn phase(&self) -> Phase {
        match self {
            RoundPhase::Active { .. } => Phase::Active,
            RoundPhase::ScoreDisplay { .. } => Phase::ScoreDisplay,
        }
    }

    #[inline]
    pub fn started_at(&self) -> u64 {
        match *self {
            RoundPhase::Active { started_at, .. } | RoundPhase::ScoreDisplay { started_at, .. } => started_at,
        }
    }

    #[inline]
    pub fn ends_at(&self) -> u64 {
        match *self {
            RoundPhase::Active { ends_at, .. } | RoundPhase::ScoreDisplay { ends_at, .. } => ends_at,
        }
    }
}

/// A frozen score row.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundScore {
    pub player_id: PlayerId,
    pub score: u32,
    pub color: Color,
    /// Set once the row comes from the ledger.
    pub timestamp: Option<u64>,
}

impl RoundScore {
    pub fn entry(&self) -> ScoreEntry {
        ScoreEntry {
            player_id: self.player_id.clone(),
            score: self.score,
            color: self.color,
            timestamp: self.timestamp,
        }
    }
}

/// A phase transition observed by [`RoundState::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum RoundEvent {
    /// Scores frozen; the frozen rows are sorted descending.
    Ended { round: u32, scores: Vec<RoundScore> },
    /// A new round began with every player reset.
    Started { round: u32 },
}

/// The single round state machine of a session.
#[derive(Debug)]
pub struct RoundState {
    number: u32,
    phase: RoundPhase,
    duration_ms: u64,
    score_display_ms: u64,
    scores: Vec<RoundScore>,
    session_top: Option<SessionTop>,
    /// Per-player totals over every finished round, in first-seen order.
    session_totals: Vec<SessionTop>,
}

impl RoundState {
    /// Round 1, active from `now`.
    pub fn new(config: &RoundConfig, now: u64) -> Self {
        Self {
            number: 1,
            phase: RoundPhase::Active {
                started_at: now,
                ends_at: now + config.duration_ms,
            },
            duration_ms: config.duration_ms,
            score_display_ms: config.score_display_ms,
            scores: Vec::new(),
            session_top: None,
            session_totals: Vec::new(),
        }
    }

    #[inline]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[inline]
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.phase, RoundPhase::Active { .. })
    }

    #[inline]
    pub fn scores(&self) -> &[RoundScore] {
        &self.scores
    }

    #[inline]
    pub fn session_top(&self) -> Option<&SessionTop> {
        self.session_top.as_ref()
    }

    /// Run at most one phase transition if the current phase has expired.
    pub fn update(&mut self, now: u64, world: &mut World) -> Option<RoundEvent> {
        match self.phase {
            RoundPhase::Active { ends_at, .. } if now >= ends_at => Some(self.end_round(now, world)),
            RoundPhase::ScoreDisplay { ends_at, .. } if now >= ends_at => {
                Some(self.start_next_round(now, world))
            }
            _ => None,
        }
    }

    /// Active -> ScoreDisplay. Freezes one score per present player.
    pub fn end_round(&mut self, now: u64, world: &World) -> RoundEvent {
        let mut scores: Vec<RoundScore> = world
            .players()
            .map(|p| RoundScore {
                player_id: p.id.clone(),
                score: p.score(),
                color: p.color,
                timestamp: None,
            })
            .collect();
        // Stable: equal scores keep join order.
        scores.sort_by(|a, b| b.score.cmp(&a.score));

        self.aggregate_session(&scores);
        self.scores = scores.clone();
        self.phase = RoundPhase::ScoreDisplay {
            started_at: now,
            ends_at: now + self.score_display_ms,
        };

        info!(
            "Round {} ended: {} scores, top {:?}",
            self.number,
            scores.len(),
            scores.first().map(|s| (&s.player_id, s.score))
        );
        RoundEvent::Ended {
            round: self.number,
            scores,
        }
    }

    /// ScoreDisplay -> Active of the next round. Resets the world.
    pub fn start_next_round(&mut self, now: u64, world: &mut World) -> RoundEvent {
        self.number += 1;
        self.scores.clear();
        world.reset_players_for_round();
        world.reset_fruit_counts();
        world.reset_food();
        self.phase = RoundPhase::Active {
            started_at: now,
            ends_at: now + self.duration_ms,
        };

        info!(
            "Round {} started with {} players and {} food",
            self.number,
            world.player_count(),
            world.food_count()
        );
        RoundEvent::Started { round: self.number }
    }

    /// Give the running round a fresh window from `now`. Returns false
    /// outside the Active phase, where the display countdown is left alone.
    pub fn restart(&mut self, now: u64) -> bool {
        if !self.is_active() {
            return false;
        }
        self.phase = RoundPhase::Active {
            started_at: now,
            ends_at: now + self.duration_ms,
        };
        true
    }

    /// The submission for the round just frozen, if anything was frozen.
    pub fn submission_request(&self, session_id: &str) -> Option<SubmitRequest> {
        if self.scores.is_empty() || self.is_active() {
            return None;
        }
        Some(SubmitRequest {
            session_id: session_id.to_string(),
            round_number: self.number,
            scores: self
                .scores
                .iter()
                .map(|s| ScoreSubmission {
                    player_id: s.player_id.clone(),
                    score: s.score,
                })
                .collect(),
        })
    }

    /// Overlay scores read back from the ledger.
    ///
    /// Rows replace the frozen ones only while `round` is still on display.
    /// Colors are kept by id (present players first, then the frozen rows),
    /// else drawn fresh. A returned session top always replaces the local
    /// one. Returns whether anything visible changed.
    pub fn apply_external_scores(&mut self, round: u32, external: ExternalScores, world: &mut World) -> bool {
        let mut changed = false;

        if let Some(top) = external.session_top_score {
            self.session_top = Some(SessionTop {
                player_id: top.player_id,
                total_score: top.total_score,
                round_count: top.round_count,
            });
            changed = true;
        }

        let on_display = round == self.number && !self.is_active();
        if on_display && !external.round_scores.is_empty() {
            let mut scores = Vec::with_capacity(external.round_scores.len());
            for row in external.round_scores {
                let known = world
                    .player(&row.player_id)
                    .map(|p| p.color)
                    .or_else(|| {
                        self.scores
                            .iter()
                            .find(|s| s.player_id == row.player_id)
                            .map(|s| s.color)
                    });
                let color = match known {
                    Some(color) => color,
                    None => world.random_color(),
                };
                scores.push(RoundScore {
                    player_id: row.player_id,
                    score: row.score,
                    color,
                    timestamp: row.timestamp,
                });
            }
            scores.sort_by(|a, b| b.score.cmp(&a.score));
            self.scores = scores;
            changed = true;
        }

        changed
    }

    /// Wire view with the time left in the current phase.
    pub fn view(&self, now: u64) -> RoundView {
        RoundView {
            number: self.number,
            phase: self.phase.phase(),
            time_remaining_ms: self.phase.ends_at().saturating_sub(now),
            scores: self.scores.iter().map(RoundScore::entry).collect(),
            session_top: self.session_top.clone(),
        }
    }

    fn aggregate_session(&mut self, scores: &[RoundScore]) {
        for score in scores {
            match self.session_totals.iter_mut().find(|t| t.player_id == score.player_id) {
                Some(total) => {
                    total.total_score += u64::from(score.score);
                    total.round_count += 1;
                }
                None => self.session_totals.push(SessionTop {
                    player_id: score.player_id.clone(),
                    total_score: u64::from(score.score),
                    round_count: 1,
                }),
            }
        }

        let mut best: Option<&SessionTop> = None;
        for total in &self.session_totals {
            if total.total_score > best.map_or(0, |b| b.total_score) {
                best = Some(total);
            }
        }
        if let Some(best) = best {
            self.session_top = Some(best.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ledger::{ExternalScore, ExternalSessionTop};
    use glam::Vec2;

    fn setup() -> (Config, World, RoundState) {
        let mut config = Config::default();
        config.world.seed = Some(5);
        let mut world = World::new(&config);
        world.populate();
        let round = RoundState::new(&config.round, 0);
        (config, world, round)
    }

    fn external(rows: &[(&str, u32)]) -> ExternalScores {
        ExternalScores {
            round_scores: rows
                .iter()
                .map(|(id, score)| ExternalScore {
                    player_id: id.to_string(),
                    score: *score,
                    timestamp: Some(1_700_000_000),
                    round_number: Some(1),
                })
                .collect(),
            session_top_score: None,
        }
    }

    #[test]
    fn test_active_until_duration_elapses() {
        let (_, mut world, mut round) = setup();
        assert_eq!(round.update(59_999, &mut world), None);
        assert!(round.is_active());
        assert_eq!(round.view(59_999).time_remaining_ms, 1);
    }

    #[test]
    fn test_restart_moves_active_window() {
        let (_, mut world, mut round) = setup();
        assert!(round.restart(300_000));
        assert_eq!(round.update(300_050, &mut world), None);
        assert_eq!(round.view(300_050).time_remaining_ms, 59_950);

        round.end_round(360_000, &world);
        assert!(!round.restart(360_100));
        assert_eq!(round.phase().ends_at(), 370_000);
    }

    #[test]
    fn test_round_end_freezes_sorted_scores() {
        let (_, mut world, mut round) = setup();
        world.join("small", None);
        world.join("big", None);
        world.player_mut("small").unwrap().size = 35.7;
        world.player_mut("big").unwrap().size = 40.2;

        let event = round.update(60_001, &mut world).unwrap();
        let RoundEvent::Ended { round: number, scores } = event else {
            panic!("expected round end");
        };
        assert_eq!(number, 1);
        let frozen: Vec<(&str, u32)> = scores.iter().map(|s| (s.player_id.as_str(), s.score)).collect();
        assert_eq!(frozen, vec![("big", 40), ("small", 35)]);
        assert_eq!(round.phase().phase(), Phase::ScoreDisplay);

        let request = round.submission_request("s").unwrap();
        assert_eq!(request.round_number, 1);
        assert_eq!(request.scores[0].score, 40);
    }

    #[test]
    fn test_equal_scores_keep_join_order() {
        let (_, mut world, mut round) = setup();
        for id in ["c", "a", "b"] {
            world.join(id, None);
        }
        round.end_round(60_000, &world);
        let ids: Vec<&str> = round.scores().iter().map(|s| s.player_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_full_cycle_resets_world() {
        let (config, mut world, mut round) = setup();
        world.join("a", None);
        world.record_consumption("a");
        world.player_mut("a").unwrap().target = Some(Vec2::new(10.0, 10.0));
        world.clear_food();

        round.update(60_000, &mut world);
        assert_eq!(round.update(69_999, &mut world), None);
        let event = round.update(70_000, &mut world).unwrap();
        assert_eq!(event, RoundEvent::Started { round: 2 });

        assert!(round.is_active());
        assert!(round.scores().is_empty());
        assert_eq!(world.food_count(), config.food.initial_amount);
        assert_eq!(world.fruit_count("a"), 0);
        let player = world.player("a").unwrap();
        assert_eq!(player.size, config.player.base_size());
        assert_eq!(player.target, None);
        assert_eq!(round.phase().ends_at(), 130_000);
    }

    #[test]
    fn test_round_number_increments_once_per_cycle() {
        let (_, mut world, mut round) = setup();
        let mut now = 0;
        for expected in 2..=4 {
            now += 60_000;
            round.update(now, &mut world);
            now += 10_000;
            round.update(now, &mut world);
            assert_eq!(round.number(), expected);
        }
    }

    #[test]
    fn test_empty_round_has_no_submission() {
        let (_, mut world, mut round) = setup();
        round.update(60_000, &mut world);
        assert!(round.submission_request("s").is_none());
    }

    #[test]
    fn test_local_session_top_aggregates_rounds() {
        let (_, mut world, mut round) = setup();
        world.join("a", None);
        world.join("b", None);
        world.player_mut("a").unwrap().size = 50.0;
        world.player_mut("b").unwrap().size = 40.0;
        round.update(60_000, &mut world);
        round.update(70_000, &mut world);

        world.player_mut("a").unwrap().size = 30.0;
        world.player_mut("b").unwrap().size = 45.0;
        round.update(130_000, &mut world);

        let top = round.session_top().unwrap();
        assert_eq!(top.player_id, "b");
        assert_eq!(top.total_score, 85);
        assert_eq!(top.round_count, 2);
    }

    #[test]
    fn test_external_scores_overlay_keeps_colors() {
        let (_, mut world, mut round) = setup();
        world.join("a", None);
        world.join("b", None);
        let color_a = world.player("a").unwrap().color;
        round.update(60_000, &mut world);
        world.leave("b");
        let color_b = round.scores().iter().find(|s| s.player_id == "b").unwrap().color;

        assert!(round.apply_external_scores(1, external(&[("b", 31), ("a", 33), ("x", 5)]), &mut world));
        let rows = round.scores();
        assert_eq!(rows[0].player_id, "a");
        assert_eq!(rows[0].color, color_a);
        assert_eq!(rows[1].color, color_b);
        assert_eq!(rows[2].player_id, "x");
        assert!(rows.iter().all(|r| r.timestamp.is_some()));
    }

    #[test]
    fn test_external_scores_for_stale_round_only_update_session_top() {
        let (_, mut world, mut round) = setup();
        world.join("a", None);
        round.update(60_000, &mut world);
        round.update(70_000, &mut world);

        let mut read = external(&[("a", 99)]);
        read.session_top_score = Some(ExternalSessionTop {
            player_id: "a".into(),
            total_score: 99,
            round_count: 1,
        });
        assert!(round.apply_external_scores(1, read, &mut world));
        assert!(round.scores().is_empty());
        assert_eq!(round.session_top().unwrap().total_score, 99);
    }

    #[test]
    fn test_empty_external_read_keeps_local_scores() {
        let (_, mut world, mut round) = setup();
        world.join("a", None);
        round.update(60_000, &mut world);
        assert!(!round.apply_external_scores(1, ExternalScores::default(), &mut world));
        assert_eq!(round.scores().len(), 1);
    }
}
