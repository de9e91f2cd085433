//! Typed ring transport: the three request kinds of spec.md §4.H,
//! length-prefixed `bincode` framing over TCP, and an in-memory test
//! double.

mod error;
mod link;
mod wire;

pub use error::{Result, TransportError};
pub use link::{read_frame, write_frame, InMemoryRingLink, RetryPolicy, RingLink, TcpRingLink};
pub use wire::{Criterion, CriterionOp, PartyAddress, RingMessage, WIRE_SCHEMA_VERSION};
