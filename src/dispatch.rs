//! Debounced output dispatch.
//!
//! Flows writing different outputs of the same addressable unit tend to fire
//! together (one inbound event fans out to several writes). Transmitting
//! each write as its own datagram would flood the bus and, for V1, each
//! frame would overwrite the whole block with mostly stale slots. The
//! dispatcher therefore coalesces: writes are merged into per-key pending
//! state, a debounce timer restarts on every write, and only when the key
//! stays quiet for the full window is one datagram built and sent.
//!
//! Each key is owned by its own task with an unbounded mailbox, so writes
//! to different keys never contend and writes arriving mid-flush queue up
//! for the next cycle instead of being lost.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::codec::{address, v1, v2};
use crate::core::data::{LogicalOutput, OutputValue, PacketKey, ProtocolVersion};
use crate::core::error::Result;
use crate::core::traits::Transport;
use crate::store::StateStore;

/// Debounce window: a key is flushed once it stays quiet this long.
pub const DEBOUNCE_MS: u64 = 50;

/// One write request against a logical output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputWrite {
    pub output: u16,
    pub value: OutputValue,
    pub unit: u8,
}

impl OutputWrite {
    pub fn new(output: u16, value: impl Into<OutputValue>, unit: u8) -> Self {
        Self {
            output,
            value: value.into(),
            unit,
        }
    }
}

/// Per-write report delivered after the flush that carried it.
///
/// Every write merged into a flushed datagram gets exactly one outcome,
/// even when several writes were coalesced into a single transmission.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub key: PacketKey,
    pub output: u16,
    /// The value the flush actually transmitted for this output, which may
    /// supersede the write's own value when a later write won the slot.
    pub value: OutputValue,
    pub sent_at: DateTime<Utc>,
    /// Transport error text, `None` on success.
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Channel end on which a writer receives its [`SendOutcome`]s.
pub type OutcomeSender = mpsc::UnboundedSender<SendOutcome>;
pub type OutcomeReceiver = mpsc::UnboundedReceiver<SendOutcome>;

struct KeyCommand {
    write: OutputWrite,
    reporter: Option<OutcomeSender>,
}

struct DispatcherInner {
    version: ProtocolVersion,
    transport: Arc<dyn Transport>,
    destination: SocketAddr,
    debounce: Duration,
    store: StateStore,
    mailboxes: DashMap<PacketKey, mpsc::UnboundedSender<KeyCommand>>,
}

/// Coalescing dispatcher for one protocol version and destination.
///
/// Cheap to clone; all clones share the same pending state and outbound
/// LKGV store.
#[derive(Clone)]
pub struct CoalescingDispatcher {
    inner: Arc<DispatcherInner>,
}

impl CoalescingDispatcher {
    pub fn new(
        version: ProtocolVersion,
        transport: Arc<dyn Transport>,
        destination: SocketAddr,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                version,
                transport,
                destination,
                debounce: Duration::from_millis(DEBOUNCE_MS),
                store: StateStore::new(),
                mailboxes: DashMap::new(),
            }),
        }
    }

    /// Override the debounce window. Mainly useful in tests.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.debounce = debounce,
            // Already shared; keep the existing window.
            None => warn!("debounce override ignored, dispatcher already cloned"),
        }
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.inner.version
    }

    /// The outbound LKGV store backing the dispatcher.
    ///
    /// Writes merge into the store when they are enqueued, so a reader may
    /// observe a value up to one debounce window before it is transmitted.
    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    /// Queue one write. The key's debounce timer (re)starts now.
    pub fn write(&self, node: u8, write: OutputWrite) {
        self.submit(node, write, None);
    }

    /// Queue one write and receive a [`SendOutcome`] on `reporter` once the
    /// flush carrying it happened.
    pub fn write_with_report(&self, node: u8, write: OutputWrite, reporter: OutcomeSender) {
        self.submit(node, write, Some(reporter));
    }

    fn submit(&self, node: u8, write: OutputWrite, reporter: Option<OutcomeSender>) {
        let key = address::packet_key_for(
            self.inner.version,
            write.value.data_type(),
            node,
            write.output,
        );
        let tx = self
            .inner
            .mailboxes
            .entry(key)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_key_task(self.inner.clone(), key, rx));
                tx
            })
            .clone();
        // Fails only when racing shutdown(); the write is dropped then.
        let _ = tx.send(KeyCommand { write, reporter });
    }

    /// Stop all key tasks. Each flushes its pending writes first, then
    /// exits. A later write restarts its key's task.
    pub fn shutdown(&self) {
        self.inner.mailboxes.clear();
    }
}

impl std::fmt::Debug for CoalescingDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingDispatcher")
            .field("version", &self.inner.version)
            .field("destination", &self.inner.destination)
            .field("debounce", &self.inner.debounce)
            .finish()
    }
}

/// Writes coalesced into the next flush, with their reporters.
struct PendingFlush {
    participants: Vec<(OutputWrite, Option<OutcomeSender>)>,
}

impl PendingFlush {
    fn new() -> Self {
        Self {
            participants: Vec::new(),
        }
    }

    fn absorb(&mut self, inner: &DispatcherInner, key: PacketKey, cmd: KeyCommand) {
        let out = LogicalOutput {
            output: cmd.write.output,
            value: cmd.write.value,
            unit: cmd.write.unit,
        };
        inner.store.merge_output(key, &out);
        self.participants.push((cmd.write, cmd.reporter));
    }
}

/// Owns all transmissions for one packet key.
///
/// Idle until a write arrives, then keeps absorbing writes while the
/// debounce timer resets, and flushes once the key stays quiet for the
/// full window. New writes arriving during the flush wait in the mailbox
/// and start the next cycle.
async fn run_key_task(
    inner: Arc<DispatcherInner>,
    key: PacketKey,
    mut rx: mpsc::UnboundedReceiver<KeyCommand>,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = PendingFlush::new();
        pending.absorb(&inner, key, first);
        let mut deadline = Instant::now() + inner.debounce;

        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => {
                        pending.absorb(&inner, key, cmd);
                        deadline = Instant::now() + inner.debounce;
                    }
                    // Dispatcher dropped; flush what we have and exit.
                    None => break,
                },
                _ = sleep_until(deadline) => break,
            }
        }

        flush(&inner, key, pending).await;
    }
}

/// Encode the complete merged state behind `key` and transmit it.
async fn flush(inner: &DispatcherInner, key: PacketKey, pending: PendingFlush) {
    let error = match transmit(inner, key).await {
        Ok(packets) => {
            debug!(key = %key, packets, writes = pending.participants.len(), "flushed");
            None
        }
        Err(err) => {
            warn!(key = %key, error = %err, "transmit failed");
            Some(err.to_string())
        }
    };

    let sent_at = Utc::now();
    for (write, reporter) in pending.participants {
        if let Some(tx) = reporter {
            // Report the value the wire actually carried: a later write to
            // the same output inside the window supersedes an earlier one.
            let value = inner
                .store
                .read(key, write.output)
                .map(|out| out.value)
                .unwrap_or(write.value);
            let _ = tx.send(SendOutcome {
                key,
                output: write.output,
                value,
                sent_at,
                error: error.clone(),
            });
        }
    }
}

async fn transmit(inner: &DispatcherInner, key: PacketKey) -> Result<usize> {
    let state = match inner.store.snapshot(key) {
        Some(state) => state,
        None => return Ok(0),
    };

    let packets: Vec<Vec<u8>> = match key {
        PacketKey::V1 { node, block } => {
            let payload = match state.v1_payload() {
                Some(payload) => payload,
                None => return Ok(0),
            };
            let packet = v1::encode(node, block, &payload);
            for warning in &packet.warnings {
                warn!(key = %key, %warning, "value clamped during encode");
            }
            vec![packet.bytes]
        }
        PacketKey::V2 { node, .. } => {
            let outputs: Vec<v2::V2Output> = state
                .known_outputs(key)
                .into_iter()
                .map(|out| v2::V2Output {
                    output: out.output,
                    unit: out.unit,
                    value: out.value,
                })
                .collect();
            v2::encode_chunked(node, &outputs)
        }
    };

    for bytes in &packets {
        inner.transport.send(inner.destination, bytes).await?;
    }
    Ok(packets.len())
}

// ============================================================
// Send suppression
// ============================================================

/// Decision returned by [`OutputGate::decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    /// Transmit now.
    Send,
    /// Inside the blocking window; try again after `retry_in`.
    Blocked { retry_in: Duration },
    /// Change below the configured threshold, nothing to send yet.
    Unchanged { delta: f64 },
}

/// Per-output send suppression: rate limiting, minimum-change filtering
/// and periodic retransmission.
///
/// Pure state machine driven by caller-supplied timestamps, so it composes
/// with the dispatcher's own timing and stays trivially testable.
#[derive(Debug, Clone)]
pub struct OutputGate {
    /// Smallest absolute change worth transmitting.
    pub min_change: f64,
    /// Minimum spacing between transmissions.
    pub blocking_time: Duration,
    /// Retransmit the last value after this much silence.
    pub max_interval: Duration,
    last_sent: Option<(OutputValue, DateTime<Utc>)>,
}

impl Default for OutputGate {
    fn default() -> Self {
        Self {
            min_change: 0.0,
            blocking_time: Duration::from_secs(10),
            max_interval: Duration::from_secs(300),
            last_sent: None,
        }
    }
}

impl OutputGate {
    pub fn new(min_change: f64, blocking_time: Duration, max_interval: Duration) -> Self {
        Self {
            min_change,
            blocking_time,
            max_interval,
            last_sent: None,
        }
    }

    /// Decide whether `value` should be transmitted at `now`.
    ///
    /// The first value always sends. Digital flips always count as a
    /// sufficient change.
    pub fn decide(&self, value: OutputValue, now: DateTime<Utc>) -> GateDecision {
        let (last_value, last_at) = match self.last_sent {
            Some(last) => last,
            None => return GateDecision::Send,
        };

        let since = (now - last_at).to_std().unwrap_or(Duration::ZERO);
        if since < self.blocking_time {
            return GateDecision::Blocked {
                retry_in: self.blocking_time - since,
            };
        }
        if since >= self.max_interval {
            return GateDecision::Send;
        }

        let delta = (value.as_f64() - last_value.as_f64()).abs();
        if delta >= self.min_change || value.data_type() != last_value.data_type() {
            GateDecision::Send
        } else {
            GateDecision::Unchanged { delta }
        }
    }

    /// Record a transmission of `value` at `now`.
    pub fn mark_sent(&mut self, value: OutputValue, now: DateTime<Utc>) {
        self.last_sent = Some((value, now));
    }

    /// True once the max-interval retransmission of the last value is due.
    pub fn retransmit_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_sent {
            Some((_, last_at)) => {
                (now - last_at).to_std().unwrap_or(Duration::ZERO) >= self.max_interval
            }
            None => false,
        }
    }

    /// The last transmitted value, if any.
    pub fn last_value(&self) -> Option<OutputValue> {
        self.last_sent.map(|(value, _)| value)
    }
}
