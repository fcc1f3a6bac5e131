use crate::{executor::MpcExecutionContext, join_circuits, MpcEngine, MpcField, MpcShare};

use super::{fold_tree, mul, BitShare};

/// Compare plaintext unsigned integer with a hidden integer, provided sharings of its individual bits.
/// Bits are given from the least significant one. Returns pair of bits ([lhs < rhs], [lhs > rhs]).
/// Cost: 2(k-1) multiplications in log_2(k) rounds for k bits.
pub async fn bitwise_compare<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    lhs: u64,
    rhs: &[BitShare<E::Share>],
) -> (BitShare<E::Share>, BitShare<E::Share>) {
    // Each bit position is mapped to a pair (cmp, neq), where cmp is -1, 0 or 1 depending on the sign
    // of lhs_i - rhs_i and neq is [lhs_i != rhs_i]. Pairs for a low part L and a high part H combine as
    // cmp = cmp_H + neq_H' * cmp_L, neq = neq_H + neq_H' * neq_L, where neq_H' = 1 - neq_H.
    let base_cases = rhs.iter().enumerate().map(|(i, rhs_bit)| {
        if (lhs >> i) & 1 == 0 {
            (-rhs_bit.raw(), rhs_bit.raw())
        } else {
            let not_rhs_bit = rhs_bit.not(ctx);
            (not_rhs_bit.raw(), not_rhs_bit.raw())
        }
    });

    let (cmp, neq) = fold_tree(
        base_cases,
        (E::Share::zero(), E::Share::zero()),
        |low, high| async move {
            let (a, b) = join_circuits!(mul(ctx, low.0, high.1), mul(ctx, low.1, high.1));
            (low.0 + high.0 - a, low.1 + high.1 - b)
        },
    )
    .await;

    // cmp = 1 iff lhs > rhs, cmp = -1 iff lhs < rhs.
    let half = E::Field::power_of_two_inverse(1);
    let is_less = BitShare::wrap((neq - cmp) * half);
    let is_greater = BitShare::wrap((neq + cmp) * half);
    (is_less, is_greater)
}

#[cfg(test)]
mod tests {
    use crate::circuits::{testing::*, *};

    #[tokio::test]
    async fn test_bitwise_compare() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let cases = [(100, 100), (100, 101), (101, 100), (100, 200), (200, 100), (0, 255)];

                for (lhs, rhs) in cases {
                    let rhs_bits: Vec<_> = (0..8)
                        .map(|i| BitShare::plain(ctx, ((rhs >> i) & 1) == 1))
                        .collect();

                    let (is_less, is_greater) = bitwise_compare(ctx, lhs, &rhs_bits).await;
                    assert_eq!(is_less.open_unchecked(ctx).await, lhs < rhs);
                    assert_eq!(is_greater.open_unchecked(ctx).await, lhs > rhs);
                }
            })
        })
        .await;
    }
}
