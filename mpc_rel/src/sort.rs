use std::mem;

use futures::future::LocalBoxFuture;
use mpc::{
    circuits::join_circuits_all, executor::MpcExecutionContext, join_circuits, MpcEngine,
};

use crate::{Cell, Flag, Row};

/// Direction of sorting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort rows obliviously by key with bitonic sorting network.
/// The sequence of comparisons depends only on the number of rows. Sorting is not stable.
/// Cost: O(n log^2 n) comparisons and at most one multiplication per cell per comparison,
/// in O(log^2 n) rounds of comparisons.
pub async fn sort_rows<E, K>(
    ctx: &MpcExecutionContext<E>,
    mut rows: Vec<Row<E::Share>>,
    key: &K,
    order: SortOrder,
) -> Vec<Row<E::Share>>
where
    E: MpcEngine,
    K: Fn(&[Cell<E::Share>]) -> Cell<E::Share>,
{
    if rows.len() >= 2 {
        bitonic_sort(ctx, &mut rows, key, order == SortOrder::Ascending).await;
    }
    rows
}

/// Sort the first half in opposite direction and the second half in requested direction,
/// then merge them.
fn bitonic_sort<'a, E, K>(
    ctx: &'a MpcExecutionContext<E>,
    rows: &'a mut [Row<E::Share>],
    key: &'a K,
    ascending: bool,
) -> LocalBoxFuture<'a, ()>
where
    E: MpcEngine,
    K: Fn(&[Cell<E::Share>]) -> Cell<E::Share>,
{
    Box::pin(async move {
        if rows.len() < 2 {
            return;
        }
        let (low, high) = rows.split_at_mut(rows.len() / 2);
        join_circuits!(
            bitonic_sort(ctx, low, key, !ascending),
            bitonic_sort(ctx, high, key, ascending)
        );
        bitonic_merge(ctx, rows, key, ascending).await;
    })
}

/// Merge bitonic sequence of any length.
fn bitonic_merge<'a, E, K>(
    ctx: &'a MpcExecutionContext<E>,
    rows: &'a mut [Row<E::Share>],
    key: &'a K,
    ascending: bool,
) -> LocalBoxFuture<'a, ()>
where
    E: MpcEngine,
    K: Fn(&[Cell<E::Share>]) -> Cell<E::Share>,
{
    Box::pin(async move {
        if rows.len() < 2 {
            return;
        }
        let (low, high) = rows.split_at_mut(greatest_power_of_two_below(rows.len()));
        join_circuits_all(
            low.iter_mut()
                .zip(high.iter_mut())
                .map(|(x, y)| compare_exchange(ctx, x, y, key, ascending)),
        )
        .await;
        join_circuits!(
            bitonic_merge(ctx, low, key, ascending),
            bitonic_merge(ctx, high, key, ascending)
        );
    })
}

/// Swap rows if they are in wrong order.
/// The swap bit is b = [key(x) <= key(y)] XOR ascending and the rows become
/// x - b(x - y) and y + b(x - y), which is a single multiplication per cell.
async fn compare_exchange<E, K>(
    ctx: &MpcExecutionContext<E>,
    x: &mut Row<E::Share>,
    y: &mut Row<E::Share>,
    key: &K,
    ascending: bool,
) where
    E: MpcEngine,
    K: Fn(&[Cell<E::Share>]) -> Cell<E::Share>,
{
    let in_order = key(x.as_slice()).less_eq(ctx, key(y.as_slice())).await;

    match in_order.xor_plain(ctx, ascending) {
        Flag::Plain(swap) => {
            if swap {
                mem::swap(x, y);
            }
        }
        swap => {
            let deltas = join_circuits_all(
                x.iter()
                    .zip(y.iter())
                    .map(|(&a, &b)| a.sub(ctx, b).mul_flag(ctx, swap)),
            )
            .await;
            for ((a, b), delta) in x.iter_mut().zip(y.iter_mut()).zip(deltas) {
                *a = a.sub(ctx, delta);
                *b = b.add(ctx, delta);
            }
        }
    }
}

/// Largest power of two strictly less than n, for n >= 2.
fn greatest_power_of_two_below(n: usize) -> usize {
    1 << (usize::BITS - 1 - (n - 1).leading_zeros())
}

#[cfg(test)]
mod tests {
    use mpc::circuits::testing::*;
    use proptest::prelude::*;

    use super::*;
    use crate::{test_util::*, SecretInt};

    fn first_column(row: &[Cell<MockShare>]) -> Cell<MockShare> {
        row[0]
    }

    #[test]
    fn test_greatest_power_of_two_below() {
        let expected = [(2, 1), (3, 2), (4, 2), (5, 4), (8, 4), (9, 8), (1000, 512)];
        for (n, power) in expected {
            assert_eq!(greatest_power_of_two_below(n), power);
        }
    }

    #[tokio::test]
    async fn test_sort_secret_rows() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let input = [vec![5, 50], vec![1, 10], vec![4, 40], vec![2, 20], vec![3, 30]];
                let rows = secret_rows(ctx, &input);
                let sorted = sort_rows(ctx, rows, &first_column, SortOrder::Ascending).await;
                assert_eq!(
                    reveal_rows(ctx, &sorted).await,
                    vec![vec![1, 10], vec![2, 20], vec![3, 30], vec![4, 40], vec![5, 50]]
                );
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_sort_descending_mixed_cells() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let rows = vec![
                    vec![Cell::Plain(1), Cell::Plain(100)],
                    vec![Cell::Secret(SecretInt::plain(ctx, 3)), Cell::Plain(300)],
                    vec![Cell::Plain(2), Cell::Secret(SecretInt::plain(ctx, 200))],
                ];
                let sorted = sort_rows(ctx, rows, &first_column, SortOrder::Descending).await;
                assert_eq!(
                    reveal_rows(ctx, &sorted).await,
                    vec![vec![3, 300], vec![2, 200], vec![1, 100]]
                );
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_sort_plain_keys_stays_local() {
        let (rows, stats) = run_mock(|ctx| {
            Box::pin(async move {
                let rows = vec![vec![Cell::Plain(3)], vec![Cell::Plain(1)], vec![Cell::Plain(2)]];
                let sorted = sort_rows(ctx, rows, &first_column, SortOrder::Ascending).await;
                sorted.iter().map(|row| row[0].as_plain()).collect::<Vec<_>>()
            })
        })
        .await;

        assert_eq!(rows, vec![Some(1), Some(2), Some(3)]);
        assert_eq!(stats.num_rounds, 0);
    }

    #[tokio::test]
    async fn test_sort_short_relations() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let empty = sort_rows(ctx, Vec::new(), &first_column, SortOrder::Ascending).await;
                assert!(empty.is_empty());

                let single = secret_rows(ctx, &[vec![7, 8]]);
                let sorted = sort_rows(ctx, single, &first_column, SortOrder::Descending).await;
                assert_eq!(reveal_rows(ctx, &sorted).await, vec![vec![7, 8]]);
            })
        })
        .await;
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_sort_is_sorted_permutation(
            keys in prop::collection::vec(-1000i64..1000, 0..12),
            ascending in any::<bool>()
        ) {
            let order = if ascending { SortOrder::Ascending } else { SortOrder::Descending };
            let input: Vec<Vec<i64>> =
                keys.iter().enumerate().map(|(i, &k)| vec![k, i as i64]).collect();
            let circuit_input = input.clone();

            let (sorted, sorted_twice) = block_on_mock(move |ctx| {
                Box::pin(async move {
                    let rows = secret_rows(ctx, &circuit_input);
                    let sorted = sort_rows(ctx, rows, &first_column, order).await;
                    let sorted_twice = sort_rows(ctx, sorted.clone(), &first_column, order).await;
                    (reveal_rows(ctx, &sorted).await, reveal_rows(ctx, &sorted_twice).await)
                })
            });

            for pair in sorted.windows(2) {
                match order {
                    SortOrder::Ascending => prop_assert!(pair[0][0] <= pair[1][0]),
                    SortOrder::Descending => prop_assert!(pair[0][0] >= pair[1][0]),
                }
            }

            let mut expected = input;
            let mut actual = sorted.clone();
            expected.sort();
            actual.sort();
            prop_assert_eq!(actual, expected);

            let keys_once: Vec<_> = sorted.iter().map(|row| row[0]).collect();
            let keys_twice: Vec<_> = sorted_twice.iter().map(|row| row[0]).collect();
            prop_assert_eq!(keys_once, keys_twice);
        }
    }
}
