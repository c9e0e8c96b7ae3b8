//! Bookkeeping record for one open client connection.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

/// What the server knows about an open connection.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Player name once the connection said HELLO
    pub player_name: Option<String>,

    /// Remote address of the client
    pub remote_addr: SocketAddr,

    /// When the connection was accepted
    pub connected_at: SystemTime,
}

impl ClientConnection {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            player_name: None,
            remote_addr,
            connected_at: SystemTime::now(),
        }
    }

    /// How long the connection has been open.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed().unwrap_or_default()
    }
}
