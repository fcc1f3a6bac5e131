use itertools::Itertools;
use mpc::{
    circuits::join_circuits_all, executor::MpcExecutionContext, join_circuits, MpcContext,
    MpcEngine,
};

use crate::{
    cell::{check_input_value, decode, embed},
    relation::{check_column, check_widths},
    Cell, PlainRelation, RelError, Relation, SecretInt,
};

/// Check that party ID is valid.
pub(crate) fn check_party<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    party: usize,
) -> Result<(), RelError> {
    if party < ctx.num_parties() {
        Ok(())
    } else {
        Err(RelError::UnknownParty(party))
    }
}

/// Check recipients of a reveal and drop duplicates.
pub(crate) fn check_recipients<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    recipients: &[usize],
) -> Result<Vec<usize>, RelError> {
    let recipients: Vec<_> = recipients.iter().copied().unique().collect();
    for &party in &recipients {
        check_party(ctx, party)?;
    }
    Ok(recipients)
}

/// Check that gathered columns are revealed to every party. Public cells hold the same value
/// on every party.
pub(crate) fn check_gather_recipients<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    recipients: &[usize],
) -> Result<(), RelError> {
    let recipients = check_recipients(ctx, recipients)?;
    if recipients.len() == ctx.num_parties() {
        Ok(())
    } else {
        Err(RelError::PartialGather {
            recipients: recipients.len(),
            parties: ctx.num_parties(),
        })
    }
}

/// Check that private rows of current party can be shared.
pub(crate) fn check_private_rows(width: usize, rows: &PlainRelation) -> Result<(), RelError> {
    check_widths(width, rows)?;
    for &value in rows.iter().flatten() {
        check_input_value(value)?;
    }
    Ok(())
}

/// Make value known only to `owner` public. Other parties pass None.
pub async fn broadcast_constant<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    owner: usize,
    value: Option<i64>,
) -> Result<i64, RelError> {
    check_party(ctx, owner)?;
    let value = if owner == ctx.party_id() {
        let value = value.ok_or(RelError::MissingValue(owner))?;
        Some(embed(check_input_value(value)?))
    } else {
        None
    };
    Ok(decode(ctx.broadcast(owner, value).await))
}

/// Every party makes the number of its private rows public.
async fn broadcast_row_counts<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    num_rows: usize,
) -> Result<Vec<usize>, RelError> {
    broadcast_all(ctx, num_rows as i64)
        .await?
        .into_iter()
        .map(|count| usize::try_from(count).map_err(|_| RelError::InvalidCount(count)))
        .collect()
}

/// Every party broadcasts a value, results are ordered by party ID.
async fn broadcast_all<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    value: i64,
) -> Result<Vec<i64>, RelError> {
    let party_id = ctx.party_id();
    join_circuits_all(
        (0..ctx.num_parties())
            .map(|owner| broadcast_constant(ctx, owner, (owner == party_id).then(|| value))),
    )
    .await
    .into_iter()
    .collect()
}

/// Slots of combined relation in row-major order: owner, own value and column index.
fn input_slots<'r, F: mpc::MpcField>(
    party_id: usize,
    rows: &'r PlainRelation,
    counts: &'r [usize],
    width: usize,
) -> impl Iterator<Item = (usize, Option<F>, usize)> + 'r {
    counts.iter().enumerate().flat_map(move |(owner, &count)| {
        (0..count).flat_map(move |row| {
            (0..width).map(move |col| {
                let value = (owner == party_id)
                    .then(|| rows.get(row).and_then(|r| r.get(col)))
                    .flatten()
                    .map(|&value| embed(value));
                (owner, value, col)
            })
        })
    })
}

/// Split cells in row-major order into rows of given width.
fn into_rows<T>(cells: Vec<Cell<T>>, num_rows: usize, width: usize) -> Vec<Vec<Cell<T>>> {
    let mut cells = cells.into_iter();
    (0..num_rows)
        .map(|_| cells.by_ref().take(width).collect())
        .collect()
}

/// Secret-share private rows of all parties. Row counts are made public first, so all parties
/// agree on the layout. Rows are ordered by owner.
pub async fn input<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rows: PlainRelation,
    width: usize,
) -> Result<Relation<E::Share>, RelError> {
    check_private_rows(width, &rows)?;
    let counts = broadcast_row_counts(ctx, rows.len()).await?;
    tracing::debug!(?counts, width, "sharing input rows");

    let cells = join_circuits_all(
        input_slots(ctx.party_id(), &rows, &counts, width)
            .map(|(owner, value, _)| ctx.input(owner, value)),
    )
    .await
    .into_iter()
    .map(|share| Cell::Secret(SecretInt::wrap(share)))
    .collect();

    Relation::new(width, into_rows(cells, counts.iter().sum(), width))
}

/// Share private rows of all parties with per-column privacy thresholds.
/// Columns with threshold 0 become public. Any positive threshold gives a secret column.
/// Row and column counts of every party are made public first.
pub async fn scatter<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rows: PlainRelation,
    thresholds: &[usize],
) -> Result<Relation<E::Share>, RelError> {
    let width = thresholds.len();
    check_private_rows(width, &rows)?;

    let (counts, column_counts) =
        join_circuits!(broadcast_row_counts(ctx, rows.len()), broadcast_all(ctx, width as i64));
    let counts = counts?;
    for (party, found) in column_counts?.into_iter().enumerate() {
        if found != width as i64 {
            return Err(RelError::ColumnCountMismatch {
                party,
                expected: width,
                found: found.max(0) as usize,
            });
        }
    }
    tracing::debug!(?counts, ?thresholds, "scattering rows");

    let cells = join_circuits_all(input_slots(ctx.party_id(), &rows, &counts, width).map(
        |(owner, value, col)| async move {
            if thresholds[col] == 0 {
                Cell::Plain(decode(ctx.broadcast(owner, value).await))
            } else {
                Cell::Secret(SecretInt::wrap(ctx.input(owner, value).await))
            }
        },
    ))
    .await;

    Relation::new(width, into_rows(cells, counts.iter().sum(), width))
}

/// Reveal given columns to `recipients`, which must cover all parties. Other columns are kept
/// as they are. Use [`gather_to`] to reveal columns only to some parties.
pub async fn gather<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    columns: &[usize],
    recipients: &[usize],
) -> Result<Relation<E::Share>, RelError> {
    check_gather_recipients(ctx, recipients)?;
    let columns: Vec<_> = columns.iter().copied().unique().collect();
    for &column in &columns {
        check_column(rel.width(), column)?;
        if !rel.is_empty() && rel.rows().iter().all(|row| row[column].is_plain()) {
            return Err(RelError::AlreadyPublic(column));
        }
    }
    if columns.is_empty() {
        return Ok(rel);
    }

    let width = rel.width();
    let mut rows = rel.into_rows();
    let revealed = join_circuits_all(
        rows.iter()
            .flat_map(|row| columns.iter().map(move |&column| row[column].reveal(ctx))),
    )
    .await;

    let mut revealed = revealed.into_iter();
    for row in rows.iter_mut() {
        for &column in &columns {
            if let Some(value) = revealed.next() {
                row[column] = Cell::Plain(value);
            }
        }
    }
    Relation::new(width, rows)
}

/// Reveal whole relation to all parties.
pub async fn output<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
) -> PlainRelation {
    join_circuits_all(
        rel.rows()
            .iter()
            .map(|row| join_circuits_all(row.iter().map(|cell| cell.reveal(ctx)))),
    )
    .await
}

/// Reveal whole relation only to given recipients. Other parties get None.
pub async fn output_to<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    recipients: &[usize],
) -> Result<Option<PlainRelation>, RelError> {
    let recipients = check_recipients(ctx, recipients)?;

    let revealed = join_circuits_all(rel.rows().iter().map(|row| {
        join_circuits_all(row.iter().map(|&cell| {
            let recipients = &recipients;
            async move {
                match cell {
                    Cell::Plain(value) => Some(value),
                    Cell::Secret(share) => ctx.open_to(recipients, share.raw()).await.map(decode),
                }
            }
        }))
    }))
    .await;

    if !recipients.contains(&ctx.party_id()) {
        return Ok(None);
    }
    Ok(revealed
        .into_iter()
        .map(|row| row.into_iter().collect::<Option<Vec<_>>>())
        .collect())
}

/// Reveal given columns only to `recipients`. The result holds just those columns, in the
/// requested order. Other parties get None.
pub async fn gather_to<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    columns: &[usize],
    recipients: &[usize],
) -> Result<Option<PlainRelation>, RelError> {
    let columns: Vec<_> = columns.iter().copied().unique().collect();
    for &column in &columns {
        check_column(rel.width(), column)?;
    }
    let rows = rel
        .rows()
        .iter()
        .map(|row| columns.iter().map(|&column| row[column]).collect())
        .collect();
    output_to(ctx, Relation::new(columns.len(), rows)?, recipients).await
}
