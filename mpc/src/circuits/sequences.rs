use std::future::Future;

use itertools::Itertools;

use super::join_circuits_all;

/// Single element or pair of elements of the same type.
enum SingleOrPair<T> {
    Single(T),
    Pair(T, T),
}

/// Batch iterator into pairs and maybe a leftover single element.
fn batch_pairs<T>(it: impl IntoIterator<Item = T>) -> impl Iterator<Item = SingleOrPair<T>> {
    it.into_iter().batching(|it| {
        it.next().map(|first| match it.next() {
            Some(second) => SingleOrPair::Pair(first, second),
            None => SingleOrPair::Single(first),
        })
    })
}

/// Aggregate an iterator of elements by combining distinct pairs in log_2(n) rounds.
/// Pairs are combined left to right, so `combine_fn` doesn't have to be commutative.
pub async fn fold_tree<T, F, Fut>(iter: impl IntoIterator<Item = T>, default: T, combine_fn: F) -> T
where
    F: Copy + Fn(T, T) -> Fut,
    Fut: Future<Output = T>,
{
    let mut elems: Vec<_> = iter.into_iter().collect();

    while elems.len() > 1 {
        elems = join_circuits_all(batch_pairs(elems).map(|p| async move {
            match p {
                SingleOrPair::Single(value) => value,
                SingleOrPair::Pair(first, second) => combine_fn(first, second).await,
            }
        }))
        .await;
    }

    elems.into_iter().next().unwrap_or(default)
}
