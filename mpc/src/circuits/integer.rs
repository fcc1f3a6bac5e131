use std::{
    cmp,
    ops::{Add, Mul, Neg, Sub},
};

use crate::{executor::MpcExecutionContext, fields::MpcField, join_circuits, MpcEngine, MpcShare};

use super::{bitwise_compare, mul, BitShare};

/// Share of N-bit signed integer embedded in a prime field.
/// Value should be in range -2^(N-1) < x < 2^(N-1) (we don't allow -2^(N-1), so each value can be negated).
#[derive(Copy, Clone, Debug)]
pub struct IntShare<T, const N: usize>(T);

impl<T: MpcShare, const N: usize> IntShare<T, N> {
    /// Wrap raw share. Input is assumed to be a sharing of an N-bit signed integer.
    pub fn wrap(raw: T) -> Self {
        Self(raw)
    }

    /// Wrap plain value. Input must be an N-bit signed integer.
    pub fn plain<E>(ctx: &MpcExecutionContext<E>, value: i64) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        Self::wrap(ctx.plain(embed_int::<_, N>(value)))
    }

    /// Sharing of zero.
    pub fn zero() -> Self {
        Self::wrap(T::zero())
    }

    /// Sharing of one.
    pub fn one<E>(ctx: &MpcExecutionContext<E>) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        Self::wrap(ctx.one())
    }

    /// Unwrapped MPC share.
    pub fn raw(self) -> T {
        self.0
    }

    /// Open share. Requires communication.
    /// Warning: Integrity checks may be deferred (like in SPDZ protocol). Use with care.
    pub async fn open_unchecked<E>(self, ctx: &MpcExecutionContext<E>) -> i64
    where
        E: MpcEngine<Share = T>,
    {
        decode_int::<_, N>(ctx.open_unchecked(self.0).await)
    }

    /// Open share after checking integrity of previous openings.
    pub async fn open<E>(self, ctx: &MpcExecutionContext<E>) -> i64
    where
        E: MpcEngine<Share = T>,
    {
        decode_int::<_, N>(ctx.open(self.0).await)
    }

    /// Multiply share by two.
    pub fn double(self) -> Self {
        Self::wrap(self.0.double())
    }

    /// Multiply two shared integers. The product must fit in N bits.
    pub async fn mul<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        Self::wrap(mul(ctx, self.0, rhs.0).await)
    }

    /// Multiply shared integer by shared bit.
    pub async fn mul_bit<E>(self, ctx: &MpcExecutionContext<E>, bit: BitShare<T>) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        Self::wrap(mul(ctx, self.0, bit.raw()).await)
    }

    /// Remainder of N-bit integer modulo 2^k for k < N. Result is given in range [0;2^k).
    /// Warning: guarantees only statistical privacy with (Field::SAFE_BITS - N) bits, input cannot be overflown.
    pub async fn mod_power_of_two<E>(self, ctx: &MpcExecutionContext<E>, k: usize) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        assert!(k < N, "Unsigned modulo overflows");

        // Mod2M from "Improved Primitives for Secure Multiparty Integer Computation" (Catrina, de Hoogh).
        let (mask, low, low_bits) = random_bit_mask(ctx, k);
        let masked_value = mask + self.raw() + ctx.plain(E::Field::power_of_two(N - 1));

        // A corrupted mask would leak the low bits, so previous openings are checked first.
        ctx.ensure_integrity();
        let masked_value = ctx.open_unchecked(masked_value).await;
        let masked_value = if k == 0 {
            0
        } else {
            masked_value.truncated() & ((1u64 << k) - 1)
        };

        let (masked_less, _) = bitwise_compare(ctx, masked_value, &low_bits).await;
        let correction = masked_less.raw() * T::Field::power_of_two(k);

        Self::wrap(ctx.plain(masked_value.into()) - low + correction)
    }

    /// Floor division of N-bit integer by 2^k.
    /// Warning: guarantees only statistical privacy with (Field::SAFE_BITS - N) bits, input cannot be overflown.
    pub async fn div_power_of_two<E>(self, ctx: &MpcExecutionContext<E>, k: usize) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        let k = cmp::min(k, N - 1);
        let remainder = self.mod_power_of_two(ctx, k).await;
        Self::wrap((self.raw() - remainder.raw()) * T::Field::power_of_two_inverse(k))
    }

    /// Test if value is less than zero.
    /// Warning: guarantees only statistical privacy with (Field::SAFE_BITS - N) bits, input cannot be overflown.
    pub async fn less_than_zero<E>(self, ctx: &MpcExecutionContext<E>) -> BitShare<T>
    where
        E: MpcEngine<Share = T>,
    {
        BitShare::wrap(-self.div_power_of_two(ctx, N - 1).await.raw())
    }

    /// Test if self < rhs. The difference must fit in N bits.
    pub async fn less<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> BitShare<T>
    where
        E: MpcEngine<Share = T>,
    {
        (self - rhs).less_than_zero(ctx).await
    }

    /// Test if self > rhs. The difference must fit in N bits.
    pub async fn greater<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> BitShare<T>
    where
        E: MpcEngine<Share = T>,
    {
        (rhs - self).less_than_zero(ctx).await
    }

    /// Test if self <= rhs. The difference must fit in N bits.
    pub async fn less_eq<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> BitShare<T>
    where
        E: MpcEngine<Share = T>,
    {
        self.greater(ctx, rhs).await.not(ctx)
    }

    /// Test if self == rhs. Both signs of the difference are tested concurrently.
    pub async fn equal<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> BitShare<T>
    where
        E: MpcEngine<Share = T>,
    {
        let (is_less, is_greater) = join_circuits!(self.less(ctx, rhs), self.greater(ctx, rhs));
        BitShare::wrap(ctx.one() - is_less.raw() - is_greater.raw())
    }
}

impl<T: MpcShare, const N: usize> From<BitShare<T>> for IntShare<T, N> {
    fn from(bit: BitShare<T>) -> Self {
        Self::wrap(bit.raw())
    }
}

impl<T: MpcShare, const N: usize> Add for IntShare<T, N> {
    type Output = IntShare<T, N>;
    fn add(self, rhs: Self) -> Self::Output {
        Self::wrap(self.0 + rhs.0)
    }
}

impl<T: MpcShare, const N: usize> Sub for IntShare<T, N> {
    type Output = IntShare<T, N>;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::wrap(self.0 - rhs.0)
    }
}

impl<T: MpcShare, const N: usize> Neg for IntShare<T, N> {
    type Output = IntShare<T, N>;
    fn neg(self) -> Self::Output {
        Self::wrap(-self.0)
    }
}

impl<T: MpcShare, const N: usize> Mul<i64> for IntShare<T, N> {
    type Output = IntShare<T, N>;
    fn mul(self, rhs: i64) -> Self::Output {
        Self::wrap(self.0 * embed_int::<_, N>(rhs))
    }
}

/// Embed signed N-bit integer into prime field.
/// Panics if value is out of range.
pub fn embed_int<T: MpcField, const N: usize>(value: i64) -> T {
    if N < 64 {
        assert!(
            value > -(1 << (N - 1)) && value < (1 << (N - 1)),
            "Input value is out of bounds"
        );
    }
    let elem = T::from(value.unsigned_abs());
    if value < 0 {
        -elem
    } else {
        elem
    }
}

/// Decode signed N-bit integer embedded in prime field.
pub fn decode_int<T: MpcField, const N: usize>(elem: T) -> i64 {
    let unsigned = (elem + T::power_of_two(N - 1))
        .truncated()
        .wrapping_sub(1u64 << (N - 1));
    unsigned as i64
}

/// Combine sharing of bits into shared integer.
fn bits_to_raw_share<T: MpcShare>(bits: &[BitShare<T>]) -> T {
    bits.iter()
        .rev()
        .fold(T::zero(), |acc, &x| acc.double() + x.raw())
}

/// Function PRandM from "Improved Primitives for Secure Multiparty Integer Computation".
/// Returns sharing of a random integer X, sharing of X mod 2^k and separate sharings of the first k bits.
/// The integer X has Field::SAFE_BITS bits and is provided by dealer.
fn random_bit_mask<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    k: usize,
) -> (E::Share, E::Share, Vec<BitShare<E::Share>>) {
    let high_part = ctx.next_uint(E::Field::SAFE_BITS - k);
    let low_bits: Vec<_> = (0..k).map(|_| BitShare::random(ctx)).collect();
    let low_part = bits_to_raw_share(&low_bits);
    let mask = high_part * E::Field::power_of_two(k) + low_part;
    (mask, low_part, low_bits)
}

#[cfg(test)]
mod tests {
    use crate::circuits::{testing::*, *};

    #[tokio::test]
    async fn test_plain_and_open() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let positive: IntShare<_, 16> = IntShare::plain(ctx, 420);
                let negative: IntShare<_, 16> = IntShare::plain(ctx, -1337);
                assert_eq!(positive.raw().0, MockField::from(420));
                assert_eq!(negative.raw().0, -MockField::from(1337));
                assert_eq!(positive.open_unchecked(ctx).await, 420);
                assert_eq!(negative.open(ctx).await, -1337);
            })
        })
        .await;
    }

    #[test]
    fn test_embed_and_decode() {
        for value in [0, 1, -1, 1 << 40, -(1 << 40)] {
            let elem: MockField = embed_int::<_, 48>(value);
            assert_eq!(decode_int::<_, 48>(elem), value);
        }
    }

    #[tokio::test]
    async fn test_mod_power_of_two() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let cases = [0, 1, -1, 123, -123, 17, -17];
                for power in 0..8 {
                    for value in cases {
                        let share: IntShare<_, 8> = IntShare::plain(ctx, value);
                        let reduced = share.mod_power_of_two(ctx, power).await;
                        let reduced = reduced.open_unchecked(ctx).await;
                        assert_eq!(reduced, value.rem_euclid(1 << power));
                    }
                }
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_div_power_of_two() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let cases = [0, 1, -1, 123, -123, 17, -17];
                for power in 0..10 {
                    for value in cases {
                        let share: IntShare<_, 8> = IntShare::plain(ctx, value);
                        let reduced = share.div_power_of_two(ctx, power).await;
                        let reduced = reduced.open_unchecked(ctx).await;
                        assert_eq!(reduced, value >> power);
                    }
                }
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_comparisons() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let cases = [(0, 0), (1, -1), (-5, 7), (42, 42), (-100, -101)];
                for (lhs, rhs) in cases {
                    let x: IntShare<_, 16> = IntShare::plain(ctx, lhs);
                    let y = IntShare::plain(ctx, rhs);
                    assert_eq!(x.less(ctx, y).await.open(ctx).await, lhs < rhs);
                    assert_eq!(x.greater(ctx, y).await.open(ctx).await, lhs > rhs);
                    assert_eq!(x.less_eq(ctx, y).await.open(ctx).await, lhs <= rhs);
                    assert_eq!(x.equal(ctx, y).await.open(ctx).await, lhs == rhs);
                }
            })
        })
        .await;
    }

    #[tokio::test]
    async fn test_mul() {
        test_circuit(|ctx| {
            Box::pin(async move {
                let x: IntShare<_, 32> = IntShare::plain(ctx, -12);
                let y = IntShare::plain(ctx, 34);
                assert_eq!(x.mul(ctx, y).await.open(ctx).await, -408);
                assert_eq!((x * 3).open(ctx).await, -36);
                let bit = BitShare::one(ctx);
                assert_eq!(y.mul_bit(ctx, bit).await.open(ctx).await, 34);
            })
        })
        .await;
    }
}
