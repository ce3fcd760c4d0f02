//! Core abstractions for the CoE gateway.
//!
//! This module provides the version-agnostic data model, the error taxonomy,
//! and the seams (transport, update fan-out) the protocol layer plugs into.

pub mod data;
pub mod error;
pub mod traits;

pub use data::*;
pub use error::{CoeError, Result};
pub use traits::*;
