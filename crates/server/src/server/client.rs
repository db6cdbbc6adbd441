//! Client session state.

use crate::entity::PlayerId;
use std::net::SocketAddr;
use std::time::Instant;

/// A connected client session.
#[derive(Debug)]
pub struct Client {
    /// Unique connection ID.
    pub id: u32,
    /// Remote address.
    pub addr: SocketAddr,
    /// Player this connection speaks for, bound by Join.
    pub player_id: Option<PlayerId>,
    pub connected_at: Instant,
    /// Last time a packet arrived.
    pub last_activity: Instant,
    pub packets_received: u64,
    /// Consume claims the server did not accept.
    pub rejected_claims: u32,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            player_id: None,
            connected_at: now,
            last_activity: now,
            packets_received: 0,
            rejected_claims: 0,
        }
    }

    #[inline]
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.packets_received += 1;
    }

    #[inline]
    pub fn is_joined(&self) -> bool {
        self.player_id.is_some()
    }
}
