//! Relational operators on resolved relations.
//! [`QuerySession`](crate::QuerySession) wraps them into nodes of a query graph.

mod aggregate;
mod io;
mod join;
mod project;

pub use aggregate::aggregate_sum;
pub use io::{broadcast_constant, gather, gather_to, input, output, output_to, scatter};
pub(crate) use io::{check_gather_recipients, check_party, check_private_rows, check_recipients};
pub use join::join;
pub use project::{project, project_with, select};

/// Visibility of keys used by join and aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyMode {
    /// Keys are secret. The result is padded to a public size and the padding is cut off,
    /// revealing only the number of padding rows.
    Private,
    /// Keys are public cells. Groups and matches are computed locally, which reveals them.
    Open,
}
