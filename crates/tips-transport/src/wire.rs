//! Ring message types: the three request kinds named in spec.md §4.H,
//! plus the party roster and criteria list that ride along in
//! `Information`.
//!
//! Grounded on `communication.py`'s untyped `Dict` payloads (`REQUEST_TYPE`
//! / `CRITERIA` / `INFO` / ... string keys) and `constants.py`'s
//! `RequestType` enum, reified here as a proper tagged `enum` per Design
//! Note 1 instead of a dict keyed by string constants — the wire schema
//! a deployment actually depends on should be a type the compiler
//! checks, not a set of dict keys.

use serde::{Deserialize, Serialize};
use tips_crypto::{PublicKeyBytes, SealedRow};
use tips_hierarchy::{AttrValue, AttributeIndex, QidAttributeSet};
use tips_tree::TipsNodeId;

pub const WIRE_SCHEMA_VERSION: u16 = 1;

/// A single request criterion: restrict attribute `attribute` to values
/// satisfying `op value`. Ported from `box.py::_gather_box_data_for_request`'s
/// three-operator criterion tuples; the category name has already been
/// resolved to an attribute index by the coordinator CLI before this
/// struct is built (criterion parsing from free text is `tips-cli`'s
/// job, per spec.md's Non-goals list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    /// The attribute the criterion restricts.
    pub attribute: AttributeIndex,
    /// The comparison to apply.
    pub op: CriterionOp,
    /// The value to compare against.
    pub value: AttrValue,
}

/// The three comparison operators the original parser accepts (`=`,
/// `<`, `>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionOp {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `>`
    Gt,
}

/// One party's ring/motion addressing, as carried in the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyAddress {
    /// Ring position / party id (0 = coordinator).
    pub id: u32,
    /// Host the party listens on.
    pub host: String,
    /// Ring transport port.
    pub ring_port: u16,
    /// Port reserved for the oracle/MPC backend (unused by the
    /// in-process oracle, carried through for a real MPC deployment).
    pub motion_port: u16,
}

/// One message traveling around the ring.
///
/// `bincode`-serialized and length-prefixed on the wire (see
/// [`crate::link::write_frame`]); this enum is the payload, not the
/// frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RingMessage {
    /// Sent once, coordinator to party 1, at request start.
    Information {
        /// The request's filter criteria.
        criteria: Vec<Criterion>,
        /// Every QID attribute's hierarchy.
        qid_attribute_set: QidAttributeSet,
        /// The coordinator's sealed-box public key.
        coordinator_public_key: PublicKeyBytes,
        /// The full party roster, including the coordinator.
        parties: Vec<PartyAddress>,
        /// Node ids this round's counter groups are reported against.
        pending_node_ids: Vec<TipsNodeId>,
    },
    /// Sent once per regular round, carrying the chosen refinement.
    Instruction {
        /// Node ids this round's counter groups are reported against.
        pending_node_ids: Vec<TipsNodeId>,
        /// The attribute to refine.
        best_attribute: AttributeIndex,
        /// The label of the bucket to refine.
        best_label: String,
    },
    /// Sent once at collection time, carrying the accumulated,
    /// shuffled ciphertext list.
    End {
        /// Sealed rows accumulated so far around the ring.
        rows: Vec<SealedRow>,
    },
}

impl RingMessage {
    /// A short tag for logging, without dumping the whole payload.
    pub fn kind(&self) -> &'static str {
        match self {
            RingMessage::Information { .. } => "INFORMATION",
            RingMessage::Instruction { .. } => "INSTRUCTION",
            RingMessage::End { .. } => "END",
        }
    }
}
