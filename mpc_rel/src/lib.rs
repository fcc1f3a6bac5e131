//! Relational algebra over secret-shared relations.
//!
//! Operators are composed into a graph through [`QuerySession`]. Each operator is oblivious:
//! its sequence of interactive steps depends only on public data (relation widths, row counts
//! and explicitly revealed padding counts), never on secret cell values.

mod cell;
mod cutoff;
mod deferred;
mod division;
mod error;
pub mod operators;
mod relation;
mod session;
mod sort;

#[cfg(test)]
mod test_util;

pub use cell::{Cell, Flag, SecretInt, CELL_BITS, MAX_CELL_VALUE};
pub use cutoff::cutoff_tail;
pub use deferred::{Deferred, Fanout, NodeId};
pub use division::{divide, MAX_PRECISION};
pub use error::RelError;
pub use operators::KeyMode;
pub use relation::{PlainRelation, Relation, Row};
pub use session::{DeferredRelation, OutputHandle, QueryResults, QuerySession, RelationNode};
pub use sort::{sort_rows, SortOrder};
