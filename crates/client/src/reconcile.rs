// Snapshot reconciliation.
//
// A pure function of (predicted state, authoritative snapshot). Nothing here
// touches the network or the renderer.

use crate::predictor::LocalPlayer;
use glam::Vec2;
use protocol::WorldSnapshot;
use std::collections::BTreeSet;

/// What the predictor believes before a snapshot lands.
#[derive(Debug, Clone)]
pub struct PredictedState {
    pub player: LocalPlayer,
    pub predicted_eaten: BTreeSet<u32>,
}

/// Corrected state plus a record of what the server overruled.
#[derive(Debug, Clone)]
pub struct Correction {
    pub state: PredictedState,
    /// Position was replaced by the server's.
    pub snapped: bool,
    /// Predictions the server rejected: the food is still there.
    pub unpredicted: Vec<u32>,
    /// Predictions the server agreed with: the food is gone.
    pub confirmed: Vec<u32>,
    /// Our player was in the snapshot.
    pub present: bool,
}

pub fn reconcile(
    predicted: &PredictedState,
    snapshot: &WorldSnapshot,
    self_id: &str,
    snap_distance: f32,
) -> Correction {
    let mut state = predicted.clone();
    let mut snapped = false;

    let me = snapshot.players.iter().find(|p| p.id == self_id);
    if let Some(me) = me {
        let authoritative = Vec2::new(me.x, me.y);
        if state.player.position.distance(authoritative) > snap_distance {
            state.player.position = authoritative;
            state.player.velocity = Vec2::ZERO;
            snapped = true;
        }
        state.player.size = me.size;
        state.player.color = me.color;
    }

    let listed: BTreeSet<u32> = snapshot.food.iter().map(|f| f.id).collect();
    let (unpredicted, confirmed): (Vec<u32>, Vec<u32>) = predicted
        .predicted_eaten
        .iter()
        .copied()
        .partition(|id| listed.contains(id));

    // Ids are never reused, so both outcomes leave the set.
    state.predicted_eaten.clear();

    Correction {
        state,
        snapped,
        unpredicted,
        confirmed,
        present: me.is_some(),
    }
}
