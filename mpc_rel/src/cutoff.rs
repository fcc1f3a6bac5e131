use mpc::{executor::MpcExecutionContext, MpcEngine};

use crate::{sort_rows, Cell, RelError, Relation, Row, SortOrder};

/// Remove padding rows from relation whose last column is a 0/1 indicator (1 marks valid rows).
/// Rows are sorted by indicator, so valid rows come first, and the number of padding rows is
/// revealed to all parties. Nothing else about the padding is revealed. The indicator column is
/// removed from the result.
/// If all indicators are public, rows are filtered locally and their order is kept.
pub async fn cutoff_tail<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    padded: Relation<E::Share>,
) -> Result<Relation<E::Share>, RelError> {
    let width = padded
        .width()
        .checked_sub(1)
        .ok_or(RelError::ColumnOutOfRange { column: 0, width: 0 })?;
    let rows = padded.into_rows();
    let num_rows = rows.len();

    let mut rows = if rows.iter().all(|row| row[width].is_plain()) {
        rows.into_iter()
            .filter(|row| row[width].as_plain() != Some(0))
            .collect()
    } else {
        let indicator = |row: &[Cell<E::Share>]| row[width];
        let mut sorted = sort_rows(ctx, rows, &indicator, SortOrder::Descending).await;

        let tail_len = count_padding(ctx, &sorted, width).await;
        tracing::info!(rows = num_rows, tail_len, "revealed number of padding rows");

        let keep = usize::try_from(tail_len)
            .ok()
            .and_then(|tail_len| num_rows.checked_sub(tail_len))
            .ok_or(RelError::InvalidCount(tail_len))?;
        sorted.truncate(keep);
        sorted
    };

    for row in rows.iter_mut() {
        row.truncate(width);
    }
    Relation::new(width, rows)
}

/// Reveal number of rows whose indicator is 0.
async fn count_padding<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rows: &[Row<E::Share>],
    indicator_col: usize,
) -> i64 {
    rows.iter()
        .fold(Cell::Plain(0), |acc, row| {
            acc.add(ctx, Cell::Plain(1).sub(ctx, row[indicator_col]))
        })
        .reveal(ctx)
        .await
}
