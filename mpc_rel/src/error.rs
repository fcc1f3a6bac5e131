use thiserror::Error;

use crate::NodeId;

/// Error of relational query.
/// Local misuse is reported before any network round of the affected node.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RelError {
    #[error("row has {found} cells, expected {expected}")]
    WidthMismatch { expected: usize, found: usize },
    #[error("column {column} is out of range for relation of width {width}")]
    ColumnOutOfRange { column: usize, width: usize },
    #[error("key column {0} contains secret values")]
    KeyNotPublic(usize),
    #[error("column {0} is already public")]
    AlreadyPublic(usize),
    #[error("division precision {0} is too large")]
    PrecisionTooLarge(usize),
    #[error("division operand {0} is out of range")]
    DivisionOperandOutOfRange(i64),
    #[error("party {party} provided {found} columns, expected {expected}")]
    ColumnCountMismatch {
        party: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown party {0}")]
    UnknownParty(usize),
    #[error("gathered columns must be revealed to all {parties} parties, got {recipients}")]
    PartialGather { recipients: usize, parties: usize },
    #[error("value of party {0} is missing")]
    MissingValue(usize),
    #[error("revealed count {0} is invalid")]
    InvalidCount(i64),
    #[error("value {0} doesn't fit into relation cell")]
    ValueOutOfRange(i64),
    #[error("node {0} doesn't belong to this session")]
    UnknownNode(NodeId),
    #[error("input produced by node {0} is unavailable")]
    InputUnavailable(NodeId),
}
