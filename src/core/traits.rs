//! Core traits and channel aliases.
//!
//! The gateway talks to the outside world through two seams: the
//! [`Transport`] it sends packets through, and the broadcast channel
//! decoded updates fan out on. Both are deliberately narrow so hosts can
//! swap in their own plumbing (a different socket, a test double, a bridge
//! into another runtime).

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::core::data::NodeUpdate;
use crate::core::error::Result;

/// Outbound packet transport.
///
/// Invoked at most once per dispatcher flush. Implementations do not need
/// to serialize calls for different destinations; the dispatcher already
/// guarantees that flushes for the same key never overlap.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one raw datagram to the destination address.
    async fn send(&self, dest: SocketAddr, payload: &[u8]) -> Result<()>;
}

/// Sender half of the decoded-update fan-out (broadcast supports multiple
/// subscribers).
pub type UpdateSender = broadcast::Sender<NodeUpdate>;

/// Receiver half of the decoded-update fan-out.
pub type UpdateReceiver = broadcast::Receiver<NodeUpdate>;
