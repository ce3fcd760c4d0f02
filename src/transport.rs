//! UDP transport and the receive endpoint.
//!
//! CoE runs over plain UDP datagrams, one frame per datagram, on port 5441
//! (V1) or 5442 (V2). [`UdpTransport`] is the outbound half used by the
//! dispatcher; [`CoeEndpoint`] binds a listening socket, decodes inbound
//! datagrams, merges them into an LKGV store and fans the merged updates
//! out to subscribers.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec;
use crate::core::data::{NodeUpdate, ProtocolVersion};
use crate::core::error::Result;
use crate::core::traits::{Transport, UpdateReceiver, UpdateSender};
use crate::store::StateStore;

/// Datagram buffer size; comfortably above the largest V2 frame (132 bytes).
const RECV_BUF_LEN: usize = 2048;

/// Broadcast capacity for inbound updates.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Outbound UDP sender.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind a fresh socket for sending (any free port).
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Wrap an already bound socket, sharing it with a receiver.
    pub fn from_socket(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, dest: SocketAddr, payload: &[u8]) -> Result<()> {
        self.socket.send_to(payload, dest).await?;
        Ok(())
    }
}

/// Bound receive endpoint for one protocol version.
///
/// Decoded updates are merged into the endpoint's LKGV store first, and
/// subscribers receive the complete post-merge state of the affected
/// addressable unit rather than the sparse frame contents.
pub struct CoeEndpoint {
    version: ProtocolVersion,
    socket: Arc<UdpSocket>,
    inbound: Arc<StateStore>,
    update_tx: UpdateSender,
    recv_handle: Option<JoinHandle<()>>,
}

impl CoeEndpoint {
    /// Bind to an explicit address.
    pub async fn bind(version: ProtocolVersion, addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!(%version, addr = %socket.local_addr()?, "listening");
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Ok(Self {
            version,
            socket: Arc::new(socket),
            inbound: Arc::new(StateStore::new()),
            update_tx,
            recv_handle: None,
        })
    }

    /// Bind to the version's well-known port on all interfaces.
    pub async fn bind_default(version: ProtocolVersion) -> Result<Self> {
        let addr: SocketAddr = ([0, 0, 0, 0], version.port()).into();
        Self::bind(version, addr).await
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Subscribe to merged inbound updates.
    pub fn subscribe(&self) -> UpdateReceiver {
        self.update_tx.subscribe()
    }

    /// The inbound LKGV store.
    pub fn inbound(&self) -> Arc<StateStore> {
        self.inbound.clone()
    }

    /// An outbound transport sharing this endpoint's socket, so replies
    /// originate from the port peers expect.
    pub fn transport(&self) -> Arc<UdpTransport> {
        Arc::new(UdpTransport::from_socket(self.socket.clone()))
    }

    /// Spawn the receive loop. Idempotent.
    pub fn start(&mut self) {
        if self.recv_handle.is_some() {
            return;
        }
        let socket = self.socket.clone();
        let version = self.version;
        let inbound = self.inbound.clone();
        let update_tx = self.update_tx.clone();

        self.recv_handle = Some(tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUF_LEN];
            loop {
                let (len, peer) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(err) => {
                        warn!(%version, error = %err, "receive failed");
                        continue;
                    }
                };

                let updates = match codec::decode(version, &buf[..len]) {
                    Ok(updates) => updates,
                    Err(err) => {
                        // Malformed datagrams are dropped without touching state.
                        warn!(%version, %peer, error = %err, "dropping datagram");
                        continue;
                    }
                };

                for update in updates {
                    let update = update.with_source(peer);
                    let key = match update.key(version) {
                        Some(key) => key,
                        None => continue,
                    };
                    let merged = inbound.merge(key, &update);

                    // Rebuild the update from the merged state so that
                    // subscribers always see complete unit state.
                    let mut full = NodeUpdate::new(update.node, update.data_type);
                    full.block = update.block;
                    full.source = update.source;
                    for out in merged.known_outputs(key) {
                        full.insert(out);
                    }
                    debug!(%key, outputs = full.len(), "merged inbound update");
                    let _ = update_tx.send(full);
                }
            }
        }));
    }

    /// Abort the receive loop.
    pub fn stop(&mut self) {
        if let Some(handle) = self.recv_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for CoeEndpoint {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    use crate::codec::v1::{self, BlockPayload};
    use crate::core::data::{DataType, PacketKey};

    async fn loopback_endpoint(version: ProtocolVersion) -> CoeEndpoint {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut endpoint = CoeEndpoint::bind(version, addr).await.unwrap();
        endpoint.start();
        endpoint
    }

    async fn sender() -> UdpTransport {
        UdpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_endpoint_receives_and_merges_v1() {
        let endpoint = loopback_endpoint(ProtocolVersion::V1).await;
        let mut updates = endpoint.subscribe();
        let tx = sender().await;
        let dest = endpoint.local_addr().unwrap();

        let payload = BlockPayload::Analog {
            values: [22.5, 0.0, 0.0, 0.0],
            units: [1, 0, 0, 0],
        };
        tx.send(dest, &v1::encode(5, 1, &payload).bytes).await.unwrap();

        let update = timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.node, 5);
        assert_eq!(update.block, Some(1));
        assert_eq!(update.get(1).unwrap().value.as_f64(), 22.5);
        assert!(update.source.is_some());

        let key = PacketKey::V1 { node: 5, block: 1 };
        assert_eq!(
            endpoint.inbound().read(key, 1).unwrap().value.as_f64(),
            22.5
        );
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_dropped() {
        let endpoint = loopback_endpoint(ProtocolVersion::V1).await;
        let mut updates = endpoint.subscribe();
        let tx = sender().await;
        let dest = endpoint.local_addr().unwrap();

        // 13 bytes: wrong length, must not produce an update or state.
        tx.send(dest, &[0u8; 13]).await.unwrap();

        let payload = BlockPayload::Analog {
            values: [1.0, 0.0, 0.0, 0.0],
            units: [0, 0, 0, 0],
        };
        tx.send(dest, &v1::encode(2, 1, &payload).bytes).await.unwrap();

        // Only the valid frame comes through.
        let update = timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.node, 2);
        assert!(endpoint.inbound().keys().len() == 1);
    }

    #[tokio::test]
    async fn test_v2_sparse_updates_accumulate() {
        let endpoint = loopback_endpoint(ProtocolVersion::V2).await;
        let mut updates = endpoint.subscribe();
        let tx = sender().await;
        let dest = endpoint.local_addr().unwrap();

        use crate::codec::v2::{self, V2Output};
        use crate::core::data::OutputValue;

        let first = v2::encode(
            1,
            &[V2Output {
                output: 5,
                unit: 10,
                value: OutputValue::Analog(25.0),
            }],
        )
        .unwrap();
        tx.send(dest, &first).await.unwrap();
        let update = timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.len(), 1);

        let second = v2::encode(
            1,
            &[V2Output {
                output: 7,
                unit: 10,
                value: OutputValue::Analog(30.0),
            }],
        )
        .unwrap();
        tx.send(dest, &second).await.unwrap();
        let update = timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();

        // Subscribers see the merged state, not just the new frame.
        assert_eq!(update.data_type, DataType::Analog);
        assert_eq!(update.len(), 2);
        assert_eq!(update.get(5).unwrap().value.as_f64(), 25.0);
        assert_eq!(update.get(7).unwrap().value.as_f64(), 30.0);
    }
}
