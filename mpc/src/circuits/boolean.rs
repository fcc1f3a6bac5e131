use ff::Field;

use crate::{executor::MpcExecutionContext, MpcEngine, MpcShare};

/// Share of bit value embedded in a prime field.
#[derive(Copy, Clone, Debug)]
pub struct BitShare<T>(T);

impl<T: MpcShare> BitShare<T> {
    /// Wrap raw share. Input is assumed to be a sharing of a single bit.
    pub fn wrap(raw: T) -> Self {
        Self(raw)
    }

    /// Wrap plaintext boolean value.
    pub fn plain<E>(ctx: &MpcExecutionContext<E>, value: bool) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        Self::wrap(if value { ctx.one() } else { T::zero() })
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

    /// Sharing of random bit.
    pub fn random<E>(ctx: &MpcExecutionContext<E>) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        Self::wrap(ctx.next_bit())
    }

    /// Unwrapped MPC share.
    pub fn raw(self) -> T {
        self.0
    }

    /// Open share. Requires communication.
    /// Warning: Integrity checks may be deferred (like in SPDZ protocol). Use with care.
    pub async fn open_unchecked<E>(self, ctx: &MpcExecutionContext<E>) -> bool
    where
        E: MpcEngine<Share = T>,
    {
        ctx.open_unchecked(self.0).await != E::Field::zero()
    }

    /// Open share after checking integrity of previous openings.
    pub async fn open<E>(self, ctx: &MpcExecutionContext<E>) -> bool
    where
        E: MpcEngine<Share = T>,
    {
        ctx.open(self.0).await != E::Field::zero()
    }

    /// Logical negation.
    pub fn not<E>(self, ctx: &MpcExecutionContext<E>) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        Self::wrap(ctx.one() - self.0)
    }

    /// XOR with public bit. Doesn't require communication.
    pub fn xor_plain<E>(self, ctx: &MpcExecutionContext<E>, rhs: bool) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        if rhs {
            self.not(ctx)
        } else {
            self
        }
    }
}
