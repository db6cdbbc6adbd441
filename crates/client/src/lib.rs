// Client core for the orb arena.
// Predicts our own orb locally and reconciles it against server snapshots.
// Rendering and sockets live with the caller.

pub mod predictor; // Seek/drift controller, speculative consumption
pub mod reconcile; // Pure snapshot correction
pub mod session; // Packet handling and send cadence

pub use predictor::{LocalPlayer, Predictor, PredictorConfig};
pub use reconcile::{reconcile, Correction, PredictedState};
pub use session::{ClientSession, SessionEvent, SEND_INTERVAL_MS};
