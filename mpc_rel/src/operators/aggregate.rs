use std::collections::BTreeMap;

use mpc::{circuits::join_circuits_all, executor::MpcExecutionContext, MpcEngine};

use super::KeyMode;
use crate::{
    cutoff_tail, relation::check_column, sort_rows, Cell, RelError, Relation, SortOrder,
};

/// Group rows by `key_col` and sum `agg_col` within each group.
/// Produces relation of width 2 with one (key, sum) row per distinct key.
/// With private keys, rows are sorted by key and each row is folded into the next one if
/// their keys are equal; the order of resulting groups is unspecified.
/// With open keys, groups are ordered by key.
pub async fn aggregate_sum<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    key_col: usize,
    agg_col: usize,
    mode: KeyMode,
) -> Result<Relation<E::Share>, RelError> {
    check_column(rel.width(), key_col)?;
    check_column(rel.width(), agg_col)?;

    match mode {
        KeyMode::Private => aggregate_private(ctx, rel, key_col, agg_col).await,
        KeyMode::Open => aggregate_open(ctx, rel, key_col, agg_col),
    }
}

async fn aggregate_private<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    key_col: usize,
    agg_col: usize,
) -> Result<Relation<E::Share>, RelError> {
    let pairs = rel
        .rows()
        .iter()
        .map(|row| vec![row[key_col], row[agg_col]])
        .collect();
    let key = |row: &[Cell<E::Share>]| row[0];
    let mut rows = sort_rows(ctx, pairs, &key, SortOrder::Ascending).await;

    let same_key =
        join_circuits_all(rows.windows(2).map(|pair| pair[0][0].equal(ctx, pair[1][0]))).await;

    // Value of each row is carried into the next one if their keys match, so the last row
    // of every group holds the group sum and the rows before it are marked as padding.
    let mut indicators = Vec::with_capacity(rows.len());
    for (i, same) in same_key.into_iter().enumerate() {
        let carried = rows[i][1].mul_flag(ctx, same).await;
        rows[i][1] = rows[i][1].sub(ctx, carried);
        rows[i + 1][1] = rows[i + 1][1].add(ctx, carried);
        indicators.push(same.not(ctx).into_cell());
    }
    if !rows.is_empty() {
        indicators.push(Cell::Plain(1));
    }

    for (row, indicator) in rows.iter_mut().zip(indicators) {
        row.push(indicator);
    }
    cutoff_tail(ctx, Relation::new(3, rows)?).await
}

fn aggregate_open<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    rel: Relation<E::Share>,
    key_col: usize,
    agg_col: usize,
) -> Result<Relation<E::Share>, RelError> {
    let mut groups = BTreeMap::new();
    for row in rel.rows() {
        let key = row[key_col]
            .as_plain()
            .ok_or(RelError::KeyNotPublic(key_col))?;
        let sum = groups.entry(key).or_insert(Cell::Plain(0));
        *sum = sum.add(ctx, row[agg_col]);
    }

    let rows = groups
        .into_iter()
        .map(|(key, sum)| vec![Cell::Plain(key), sum])
        .collect();
    Relation::new(2, rows)
}

#[cfg(test)]
mod tests {
    use mpc::circuits::testing::*;
    use proptest::prelude::*;

    use super::*;
    use crate::{test_util::*, SecretInt};

    fn aggregate_private_revealed(input: &[Vec<i64>]) -> Vec<Vec<i64>> {
        let input = input.to_vec();
        let mut rows = block_on_mock(move |ctx| {
            Box::pin(async move {
                let rel = Relation::new(2, secret_rows(ctx, &input)).unwrap();
                let result = aggregate_sum(ctx, rel, 0, 1, KeyMode::Private).await.unwrap();
                reveal_rows(ctx, result.rows()).await
            })
        });
        rows.sort();
        rows
    }

    #[tokio::test]
    async fn test_aggregate_private() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let input = [
                    vec![3, 1, 9],
                    vec![1, 2, 9],
                    vec![3, 5, 9],
                    vec![2, 7, 9],
                    vec![1, 3, 9],
                ];
                let rel = Relation::new(3, secret_rows(ctx, &input)).unwrap();
                let result = aggregate_sum(ctx, rel, 0, 1, KeyMode::Private).await.unwrap();
                assert_eq!(result.width(), 2);

                let mut rows = reveal_rows(ctx, result.rows()).await;
                rows.sort();
                assert_eq!(rows, vec![vec![1, 5], vec![2, 7], vec![3, 6]]);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_aggregate_private_single_group() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let input = [vec![0, 10], vec![0, 20], vec![0, 30], vec![0, 40]];
                let rel = Relation::new(2, secret_rows(ctx, &input)).unwrap();
                let result = aggregate_sum(ctx, rel, 0, 1, KeyMode::Private).await.unwrap();
                assert_eq!(reveal_rows(ctx, result.rows()).await, vec![vec![0, 100]]);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_aggregate_private_empty() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let rel = Relation::<MockShare>::empty(2);
                let result = aggregate_sum(ctx, rel, 0, 1, KeyMode::Private).await.unwrap();
                assert!(result.is_empty());
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_aggregate_open() {
        let (rows, stats) = run_mock(|ctx| {
            Box::pin(async move {
                let rows = vec![
                    vec![Cell::Plain(2), Cell::Secret(SecretInt::plain(ctx, 4))],
                    vec![Cell::Plain(1), Cell::Plain(1)],
                    vec![Cell::Plain(2), Cell::Plain(6)],
                ];
                let rel = Relation::new(2, rows).unwrap();
                let result = aggregate_sum(ctx, rel, 0, 1, KeyMode::Open).await.unwrap();
                assert!(result.rows().iter().all(|row| row[0].is_plain()));
                result
            })
        })
        .await;

        assert_eq!(stats.num_rounds, 0);
        let keys: Vec<_> = rows.rows().iter().map(|row| row[0].as_plain()).collect();
        assert_eq!(keys, vec![Some(1), Some(2)]);
        assert_eq!(rows.rows()[0][1].as_plain(), Some(1));
        assert!(!rows.rows()[1][1].is_plain());
    }

    #[tokio::test]
    async fn test_aggregate_open_requires_public_keys() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let rel = Relation::new(2, secret_rows(ctx, &[vec![1, 2]])).unwrap();
                let result = aggregate_sum(ctx, rel, 0, 1, KeyMode::Open).await;
                assert_eq!(result.unwrap_err(), RelError::KeyNotPublic(0));
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_aggregate_invalid_column() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let rel = Relation::<MockShare>::empty(2);
                let result = aggregate_sum(ctx, rel, 0, 2, KeyMode::Private).await;
                assert_eq!(
                    result.unwrap_err(),
                    RelError::ColumnOutOfRange { column: 2, width: 2 }
                );
            })
        })
        .await;
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_aggregate_private_matches_group_by(
            (input, shuffled) in prop::collection::vec(
                (0i64..4, -100i64..100).prop_map(|(k, v)| vec![k, v]),
                0..8,
            )
            .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
        ) {
            let mut groups = BTreeMap::new();
            for row in &input {
                *groups.entry(row[0]).or_insert(0) += row[1];
            }
            let expected: Vec<_> = groups.into_iter().map(|(key, sum)| vec![key, sum]).collect();

            prop_assert_eq!(aggregate_private_revealed(&input), expected.clone());
            prop_assert_eq!(aggregate_private_revealed(&shuffled), expected);
        }
    }
}
