//! Helpers for running circuits on a single-node mock engine.

use futures::future::LocalBoxFuture;

use crate::{
    executor::{run_circuit, MpcExecutionContext},
    fields::Mersenne127,
    plaintext::{MockMpcEngine, PlainShare},
};

pub type MockField = Mersenne127;
pub type MockEngine = MockMpcEngine<MockField>;
pub type MockShare = PlainShare<MockField>;

/// Run circuit on mock engine. Panics if circuit stalls.
pub async fn test_circuit<F>(circuit: F)
where
    F: for<'a> FnOnce(&'a MpcExecutionContext<MockEngine>) -> LocalBoxFuture<'a, ()>,
{
    if let Err(err) = run_circuit(MockEngine::new(), circuit).await {
        panic!("Mock circuit failed: {}", err);
    }
}
