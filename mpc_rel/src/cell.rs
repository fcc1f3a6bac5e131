use mpc::{
    circuits::{decode_int, BitShare, IntShare},
    executor::MpcExecutionContext,
    MpcEngine, MpcField, MpcShare,
};

use crate::{division, RelError};

/// Number of bits of secret integers stored in relation cells.
pub const CELL_BITS: usize = 48;

/// Largest absolute value accepted as relation input.
/// Difference of any two inputs still fits into a cell, so inputs can be compared.
pub const MAX_CELL_VALUE: i64 = (1 << (CELL_BITS - 2)) - 1;

/// Secret signed integer stored in a relation cell.
pub type SecretInt<T> = IntShare<T, CELL_BITS>;

/// Single value of a relation.
/// Public cells are known to all parties and cost nothing to compute with.
#[derive(Clone, Copy, Debug)]
pub enum Cell<T> {
    Secret(SecretInt<T>),
    Plain(i64),
}

/// Boolean produced by comparing cells. Comparing two public cells gives a public flag.
#[derive(Clone, Copy, Debug)]
pub enum Flag<T> {
    Secret(BitShare<T>),
    Plain(bool),
}

/// Embed signed integer into field. Out of range values wrap around silently.
pub(crate) fn embed<F: MpcField>(value: i64) -> F {
    let elem = F::from(value.unsigned_abs());
    if value < 0 {
        -elem
    } else {
        elem
    }
}

/// Check that value can be used as relation input.
pub(crate) fn check_input_value(value: i64) -> Result<i64, RelError> {
    if (-MAX_CELL_VALUE..=MAX_CELL_VALUE).contains(&value) {
        Ok(value)
    } else {
        Err(RelError::ValueOutOfRange(value))
    }
}

/// Decode revealed field element into signed integer.
pub(crate) fn decode<F: MpcField>(elem: F) -> i64 {
    decode_int::<_, CELL_BITS>(elem)
}

impl<T: MpcShare> Cell<T> {
    /// Value of public cell.
    pub fn as_plain(&self) -> Option<i64> {
        match self {
            Cell::Plain(value) => Some(*value),
            Cell::Secret(_) => None,
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, Cell::Plain(_))
    }

    /// Secret sharing of cell value. Public values get a trivial sharing.
    pub fn to_secret<E>(self, ctx: &MpcExecutionContext<E>) -> SecretInt<T>
    where
        E: MpcEngine<Share = T>,
    {
        match self {
            Cell::Secret(share) => share,
            Cell::Plain(value) => SecretInt::wrap(ctx.plain(embed(value))),
        }
    }

    pub fn add<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        match (self, rhs) {
            (Cell::Plain(x), Cell::Plain(y)) => Cell::Plain(x.wrapping_add(y)),
            (x, y) => Cell::Secret(x.to_secret(ctx) + y.to_secret(ctx)),
        }
    }

    pub fn sub<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        match (self, rhs) {
            (Cell::Plain(x), Cell::Plain(y)) => Cell::Plain(x.wrapping_sub(y)),
            (x, y) => Cell::Secret(x.to_secret(ctx) - y.to_secret(ctx)),
        }
    }

    /// Multiply by public constant. Doesn't require communication.
    pub fn scale(self, factor: i64) -> Self {
        match self {
            Cell::Plain(x) => Cell::Plain(x.wrapping_mul(factor)),
            Cell::Secret(x) => {
                Cell::Secret(SecretInt::wrap(x.raw() * embed::<T::Field>(factor)))
            }
        }
    }

    /// Multiply two cells. Requires one round only if both cells are secret.
    pub async fn mul<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        match (self, rhs) {
            (Cell::Secret(x), Cell::Secret(y)) => Cell::Secret(x.mul(ctx, y).await),
            (Cell::Plain(factor), cell) | (cell, Cell::Plain(factor)) => cell.scale(factor),
        }
    }

    /// Multiply cell by flag, giving either the cell value or zero.
    pub async fn mul_flag<E>(self, ctx: &MpcExecutionContext<E>, flag: Flag<T>) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        match (self, flag) {
            (cell, Flag::Plain(true)) => cell,
            (_, Flag::Plain(false)) => Cell::Plain(0),
            (Cell::Plain(x), Flag::Secret(bit)) => {
                Cell::Secret(SecretInt::wrap(bit.raw() * embed::<T::Field>(x)))
            }
            (Cell::Secret(x), Flag::Secret(bit)) => Cell::Secret(x.mul_bit(ctx, bit).await),
        }
    }

    /// Test if self <= rhs.
    pub async fn less_eq<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> Flag<T>
    where
        E: MpcEngine<Share = T>,
    {
        match (self, rhs) {
            (Cell::Plain(x), Cell::Plain(y)) => Flag::Plain(x <= y),
            (x, y) => Flag::Secret(x.to_secret(ctx).less_eq(ctx, y.to_secret(ctx)).await),
        }
    }

    /// Test if self > rhs.
    pub async fn greater<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> Flag<T>
    where
        E: MpcEngine<Share = T>,
    {
        self.less_eq(ctx, rhs).await.not(ctx)
    }

    /// Test if self == rhs.
    pub async fn equal<E>(self, ctx: &MpcExecutionContext<E>, rhs: Self) -> Flag<T>
    where
        E: MpcEngine<Share = T>,
    {
        match (self, rhs) {
            (Cell::Plain(x), Cell::Plain(y)) => Flag::Plain(x == y),
            (x, y) => Flag::Secret(x.to_secret(ctx).equal(ctx, y.to_secret(ctx)).await),
        }
    }

    /// Secure division, see [`division::divide`].
    pub async fn divide<E>(
        self,
        ctx: &MpcExecutionContext<E>,
        rhs: Self,
        precision: usize,
    ) -> Result<Self, RelError>
    where
        E: MpcEngine<Share = T>,
    {
        division::divide(ctx, self, rhs, precision).await
    }

    /// Reveal cell value to all parties. Public cells are returned without communication.
    pub async fn reveal<E>(self, ctx: &MpcExecutionContext<E>) -> i64
    where
        E: MpcEngine<Share = T>,
    {
        match self {
            Cell::Plain(value) => value,
            Cell::Secret(share) => share.open(ctx).await,
        }
    }
}

impl<T: MpcShare> Flag<T> {
    pub fn not<E>(self, ctx: &MpcExecutionContext<E>) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        match self {
            Flag::Plain(value) => Flag::Plain(!value),
            Flag::Secret(bit) => Flag::Secret(bit.not(ctx)),
        }
    }

    /// XOR with public bit. Doesn't require communication.
    pub fn xor_plain<E>(self, ctx: &MpcExecutionContext<E>, rhs: bool) -> Self
    where
        E: MpcEngine<Share = T>,
    {
        match self {
            Flag::Plain(value) => Flag::Plain(value ^ rhs),
            Flag::Secret(bit) => Flag::Secret(bit.xor_plain(ctx, rhs)),
        }
    }

    /// Flag as 0/1 cell.
    pub fn into_cell(self) -> Cell<T> {
        match self {
            Flag::Plain(value) => Cell::Plain(value as i64),
            Flag::Secret(bit) => Cell::Secret(SecretInt::from(bit)),
        }
    }

    /// Reveal flag to all parties.
    pub async fn reveal<E>(self, ctx: &MpcExecutionContext<E>) -> bool
    where
        E: MpcEngine<Share = T>,
    {
        match self {
            Flag::Plain(value) => value,
            Flag::Secret(bit) => bit.open(ctx).await,
        }
    }
}
