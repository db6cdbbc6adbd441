//! Authoritative orb arena server library.

pub mod collision;
pub mod config;
pub mod entity;
pub mod ledger;
pub mod movement;
pub mod round;
pub mod server;
pub mod submission;
pub mod throttle;
pub mod world;

// Re-export commonly used types
pub use config::Config;
pub use server::{
    run, Channels, GameState, Intent, LeaderboardBroadcast, RoundBroadcast, SubmissionBroadcast,
    Subscriptions, TargetedMessage, WorldUpdateBroadcast,
};
