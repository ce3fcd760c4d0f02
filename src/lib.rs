//! # CoE Gateway (coegw)
//!
//! A gateway library for the CAN-over-Ethernet (CoE) protocol used by
//! building-automation CAN controllers, speaking UDP on ports 5441 (V1)
//! and 5442 (V2).
//!
//! ## Features
//!
//! - **Bit-exact codecs**: 14-byte V1 block frames and variable-length V2
//!   multi-value frames, with per-unit decimal scaling
//! - **Last-known-good-value state**: sparse updates merge into complete
//!   per-unit state, on both the receive and the transmit path
//! - **Debounced dispatch**: concurrent writes to one addressable unit
//!   coalesce into a single datagram per quiet period
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coegw::prelude::*;
//! use coegw::transport::CoeEndpoint;
//!
//! // Listen for V2 frames and watch merged state arrive.
//! let mut endpoint = CoeEndpoint::bind_default(ProtocolVersion::V2).await?;
//! endpoint.start();
//! let mut updates = endpoint.subscribe();
//! while let Ok(update) = updates.recv().await {
//!     println!("node {}: {} outputs known", update.node, update.len());
//! }
//! ```
//!
//! Sending goes through [`dispatch::CoalescingDispatcher`], which owns the
//! outbound state and the debounce timers:
//!
//! ```rust,ignore
//! use coegw::dispatch::{CoalescingDispatcher, OutputWrite};
//!
//! let dispatcher = CoalescingDispatcher::new(ProtocolVersion::V1, transport, dest);
//! dispatcher.write(5, OutputWrite::new(1, 22.5, 1)); // 22.5 °C to node 5
//! ```

pub mod codec;
pub mod core;
pub mod dispatch;
pub mod store;
pub mod transport;
pub mod units;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        data::*,
        error::{CoeError, Result},
        traits::*,
    };
    pub use crate::dispatch::{CoalescingDispatcher, OutputWrite, SendOutcome};
    pub use crate::store::{BlockState, StateStore};
}

// Re-export core types at crate root for convenience
pub use crate::core::data::{
    DataType, LogicalOutput, NodeUpdate, OutputValue, PacketKey, ProtocolVersion,
};
pub use crate::core::error::{CoeError, Result};
