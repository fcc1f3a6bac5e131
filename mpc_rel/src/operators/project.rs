use std::future::Future;

use mpc::{circuits::join_circuits_all, executor::MpcExecutionContext, MpcEngine};

use crate::{cutoff_tail, Cell, Flag, RelError, Relation, Row};

/// Apply local transformation to every row. The transformation must not communicate.
pub fn project<E, F>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    width: usize,
    transform: F,
) -> Result<Relation<E::Share>, RelError>
where
    E: MpcEngine,
    F: Fn(&MpcExecutionContext<E>, &[Cell<E::Share>]) -> Row<E::Share>,
{
    let rows = rel.rows().iter().map(|row| transform(ctx, row)).collect();
    Relation::new(width, rows)
}

/// Apply interactive transformation to every row. Rows are transformed concurrently.
pub async fn project_with<'a, E, F, Fut>(
    ctx: &'a MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    width: usize,
    transform: &F,
) -> Result<Relation<E::Share>, RelError>
where
    E: MpcEngine,
    F: Fn(&'a MpcExecutionContext<E>, Row<E::Share>) -> Fut,
    Fut: Future<Output = Result<Row<E::Share>, RelError>>,
{
    let rows = join_circuits_all(rel.into_rows().into_iter().map(|row| transform(ctx, row)))
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    Relation::new(width, rows)
}

/// Keep rows that satisfy predicate. Only the number of rejected rows is revealed.
/// Kept rows are in unspecified order, unless all predicate results are public.
pub async fn select<'a, E, P, Fut>(
    ctx: &'a MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    predicate: &P,
) -> Result<Relation<E::Share>, RelError>
where
    E: MpcEngine,
    P: Fn(&'a MpcExecutionContext<E>, Row<E::Share>) -> Fut,
    Fut: Future<Output = Result<Flag<E::Share>, RelError>>,
{
    let width = rel.width();
    let flags = join_circuits_all(rel.rows().iter().cloned().map(|row| predicate(ctx, row)))
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = rel.into_rows();
    for (row, flag) in rows.iter_mut().zip(flags) {
        row.push(flag.into_cell());
    }
    cutoff_tail(ctx, Relation::new(width + 1, rows)?).await
}
