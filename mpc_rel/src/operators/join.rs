use itertools::iproduct;
use mpc::{circuits::join_circuits_all, executor::MpcExecutionContext, MpcEngine, MpcShare};

use super::KeyMode;
use crate::{
    cutoff_tail,
    relation::{check_column, without_column},
    Cell, RelError, Relation, Row,
};

/// Equi-join of two relations on `left_col` and `right_col`.
/// Each resulting row consists of the join key, the remaining cells of the left row and the
/// remaining cells of the right row.
/// With private keys, all |left| * |right| pairs are compared and non-matching pairs are cut off,
/// which reveals only the number of matches. With open keys, only matching pairs are built.
pub async fn join<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    left: Relation<E::Share>,
    right: Relation<E::Share>,
    left_col: usize,
    right_col: usize,
    mode: KeyMode,
) -> Result<Relation<E::Share>, RelError> {
    check_column(left.width(), left_col)?;
    check_column(right.width(), right_col)?;
    let width = left.width() + right.width() - 1;

    match mode {
        KeyMode::Private => {
            let pairs: Vec<_> = iproduct!(left.rows(), right.rows()).collect();
            let matches = join_circuits_all(
                pairs
                    .iter()
                    .map(|(l, r)| l[left_col].equal(ctx, r[right_col])),
            )
            .await;

            let rows = pairs
                .iter()
                .zip(matches)
                .map(|((l, r), matched)| {
                    let mut row = joined_row(l, r, left_col, right_col);
                    row.push(matched.into_cell());
                    row
                })
                .collect();
            cutoff_tail(ctx, Relation::new(width + 1, rows)?).await
        }
        KeyMode::Open => {
            let left_keys = public_keys(&left, left_col)?;
            let right_keys = public_keys(&right, right_col)?;

            let left_rows = left.rows().iter().zip(left_keys);
            let right_rows = right.rows().iter().zip(&right_keys);
            let rows = iproduct!(left_rows, right_rows)
                .filter(|((_, l_key), (_, r_key))| l_key == *r_key)
                .map(|((l, _), (r, _))| joined_row(l, r, left_col, right_col))
                .collect();
            Relation::new(width, rows)
        }
    }
}

/// Join key followed by the remaining cells of both rows.
fn joined_row<T: Copy>(
    left: &[Cell<T>],
    right: &[Cell<T>],
    left_col: usize,
    right_col: usize,
) -> Row<T> {
    let mut row = Vec::with_capacity(left.len() + right.len());
    row.push(left[left_col]);
    row.extend(without_column(left, left_col));
    row.extend(without_column(right, right_col));
    row
}

fn public_keys<T: MpcShare>(rel: &Relation<T>, column: usize) -> Result<Vec<i64>, RelError> {
    rel.rows()
        .iter()
        .map(|row| row[column].as_plain().ok_or(RelError::KeyNotPublic(column)))
        .collect()
}

#[cfg(test)]
mod tests {
    use mpc::circuits::testing::*;
    use proptest::prelude::*;

    use super::*;
    use crate::{test_util::*, SecretInt};

    fn join_private_revealed(left: &[Vec<i64>], right: &[Vec<i64>]) -> Vec<Vec<i64>> {
        let (left, right) = (left.to_vec(), right.to_vec());
        let mut rows = block_on_mock(move |ctx| {
            Box::pin(async move {
                let left = Relation::new(2, secret_rows(ctx, &left)).unwrap();
                let right = Relation::new(2, secret_rows(ctx, &right)).unwrap();
                let result = join(ctx, left, right, 0, 0, KeyMode::Private).await.unwrap();
                reveal_rows(ctx, result.rows()).await
            })
        });
        rows.sort();
        rows
    }

    fn nested_loop_join(left: &[Vec<i64>], right: &[Vec<i64>]) -> Vec<Vec<i64>> {
        let mut rows: Vec<_> = iproduct!(left, right)
            .filter(|(l, r)| l[0] == r[0])
            .map(|(l, r)| vec![l[0], l[1], r[1]])
            .collect();
        rows.sort();
        rows
    }

    fn keyed_rows() -> impl Strategy<Value = (Vec<Vec<i64>>, Vec<Vec<i64>>)> {
        prop::collection::vec((0i64..4, -50i64..50).prop_map(|(k, v)| vec![k, v]), 0..5)
            .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
    }

    #[tokio::test]
    async fn test_join_private() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let left = [vec![1, 10], vec![2, 20], vec![3, 30]];
                let right = [vec![100, 2], vec![300, 3], vec![301, 3], vec![400, 4]];
                let left = Relation::new(2, secret_rows(ctx, &left)).unwrap();
                let right = Relation::new(2, secret_rows(ctx, &right)).unwrap();
                let result = join(ctx, left, right, 0, 1, KeyMode::Private).await.unwrap();
                assert_eq!(result.width(), 3);

                let mut rows = reveal_rows(ctx, result.rows()).await;
                rows.sort();
                assert_eq!(rows, vec![vec![2, 20, 100], vec![3, 30, 300], vec![3, 30, 301]]);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_join_private_without_matches() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let left = Relation::new(1, secret_rows(ctx, &[vec![1], vec![2]])).unwrap();
                let right = Relation::new(1, secret_rows(ctx, &[vec![3]])).unwrap();
                let result = join(ctx, left, right, 0, 0, KeyMode::Private).await.unwrap();
                assert!(result.is_empty());
                assert_eq!(result.width(), 1);
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_join_open() {
        let (rows, stats) = run_mock(|ctx| {
            Box::pin(async move {
                let left = vec![
                    vec![Cell::Plain(1), Cell::Secret(SecretInt::plain(ctx, 10))],
                    vec![Cell::Plain(2), Cell::Plain(20)],
                ];
                let right = vec![
                    vec![Cell::Plain(2), Cell::Plain(7)],
                    vec![Cell::Plain(1), Cell::Plain(8)],
                ];
                let left = Relation::new(2, left).unwrap();
                let right = Relation::new(2, right).unwrap();
                let result = join(ctx, left, right, 0, 0, KeyMode::Open).await.unwrap();
                reveal_rows(ctx, result.rows()).await
            })
        })
        .await;

        assert_eq!(rows, vec![vec![1, 10, 8], vec![2, 20, 7]]);
        assert_eq!(stats.num_inputs, 0);
    }

    #[tokio::test]
    async fn test_join_open_requires_public_keys() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let left = Relation::from_plain(1, vec![vec![1]]).unwrap();
                let right = Relation::new(1, secret_rows(ctx, &[vec![1]])).unwrap();
                let result = join(ctx, left, right, 0, 0, KeyMode::Open).await;
                assert_eq!(result.unwrap_err(), RelError::KeyNotPublic(0));
            })
        })
        .await;
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_join_private_matches_nested_loop(
            (left, left_shuffled) in keyed_rows(),
            (right, right_shuffled) in keyed_rows()
        ) {
            let expected = nested_loop_join(&left, &right);
            prop_assert_eq!(join_private_revealed(&left, &right), expected.clone());
            prop_assert_eq!(join_private_revealed(&left_shuffled, &right_shuffled), expected);
        }
    }
}
