use std::{future::Future, pin::Pin, task::Poll};

use futures::future::{maybe_done, poll_fn};

mod bitwise;
mod boolean;
mod elementary;
mod integer;
mod sequences;
pub mod testing;

pub use bitwise::bitwise_compare;
pub use boolean::BitShare;
pub use elementary::mul;
pub use integer::{decode_int, embed_int, IntShare};
pub use sequences::fold_tree;

pub use futures; // Reexport futures crate for join_circuits! macro.

/// Wait on multiple concurrent branches, returning when **all** branches complete.
/// Branches are polled in the order they are listed, which keeps request order identical across parties.
#[macro_export]
macro_rules! join_circuits {
    ($($tokens:tt)*) => {{
        $crate::circuits::futures::join!($( $tokens )*)
    }}
}

/// Run a dynamic number of circuits concurrently and collect their outputs in input order.
/// On each poll the circuits are polled in sequence, so requests are issued deterministically.
pub async fn join_circuits_all<I>(iter: I) -> Vec<<I::Item as Future>::Output>
where
    I: IntoIterator,
    I::Item: Future,
{
    let mut circuits: Vec<_> = iter.into_iter().map(|x| maybe_done(Box::pin(x))).collect();

    poll_fn(|cx| {
        let mut all_done = true;
        for circuit in circuits.iter_mut() {
            if Pin::new(circuit).poll(cx).is_pending() {
                all_done = false;
            }
        }
        if all_done {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    })
    .await;

    circuits
        .iter_mut()
        .map(|circuit| {
            Pin::new(circuit)
                .take_output()
                .expect("Circuit output taken twice")
        })
        .collect()
}
