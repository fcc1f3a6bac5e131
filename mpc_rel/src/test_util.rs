//! Helpers shared by tests of relational operators.

use futures::future::{join_all, LocalBoxFuture};
use mpc::{
    circuits::{join_circuits_all, testing::*},
    executor::{run_circuit, MpcExecutionContext, MpcExecutionStats},
    fields::Mersenne127,
    spdz::{FakeSpdzDealer, SpdzEngine, SpdzError, SpdzMessage},
    transport::{mock_multiparty_channels, BincodeDuplex},
    MpcEngine,
};

use crate::{Cell, PlainRelation, Row, SecretInt};

pub type SpdzTestEngine =
    SpdzEngine<Mersenne127, FakeSpdzDealer<Mersenne127>, BincodeDuplex<SpdzMessage<Mersenne127>>>;

/// Share public values as secret cells without communication.
pub fn secret_rows<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rows: &[Vec<i64>],
) -> Vec<Row<E::Share>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|&value| Cell::Secret(SecretInt::plain(ctx, value)))
                .collect()
        })
        .collect()
}

/// Reveal all cells of given rows.
pub async fn reveal_rows<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rows: &[Row<E::Share>],
) -> PlainRelation {
    join_circuits_all(rows.iter().map(|row| {
        join_circuits_all(row.iter().map(|cell| cell.reveal(ctx)))
    }))
    .await
}

/// Run circuit on mock engine and return its output with execution statistics.
pub async fn run_mock<T, F>(circuit: F) -> (T, MpcExecutionStats)
where
    F: for<'a> FnOnce(&'a MpcExecutionContext<MockEngine>) -> LocalBoxFuture<'a, T>,
{
    match run_circuit(MockEngine::new(), circuit).await {
        Ok(result) => result,
        Err(err) => panic!("Mock circuit failed: {}", err),
    }
}

/// Run circuit on mock engine outside of async context.
pub fn block_on_mock<T, F>(circuit: F) -> T
where
    F: for<'a> FnOnce(&'a MpcExecutionContext<MockEngine>) -> LocalBoxFuture<'a, T>,
{
    futures::executor::block_on(run_mock(circuit)).0
}

/// Run the same circuit on SPDZ engines of all parties connected with in-memory channels.
pub async fn run_spdz<T, F>(num_parties: usize, circuit: F) -> Vec<Result<T, SpdzError>>
where
    F: Copy + for<'a> Fn(&'a MpcExecutionContext<SpdzTestEngine>) -> LocalBoxFuture<'a, T>,
{
    let engines = mock_multiparty_channels(num_parties, 1 << 20)
        .into_iter()
        .enumerate()
        .map(|(id, transport)| SpdzEngine::new(FakeSpdzDealer::new(num_parties, id, 7), transport));

    join_all(engines.map(|engine| async move {
        run_circuit(engine, circuit)
            .await
            .map(|(output, _)| output)
            .map_err(|err| match err {
                mpc::executor::MpcExecutionError::Engine(err) => err,
                mpc::executor::MpcExecutionError::Stalled => panic!("SPDZ circuit stalled"),
            })
    }))
    .await
}
