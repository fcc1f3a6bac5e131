use mpc::{executor::MpcExecutionContext, MpcEngine};

use crate::{Cell, RelError, SecretInt, CELL_BITS, MAX_CELL_VALUE};

/// Largest supported division precision. Shifted divisors must stay comparable with the dividend.
pub const MAX_PRECISION: usize = CELL_BITS - 2;

/// Compute floor(x / y) bit by bit, from bit `precision` down to bit 0.
/// Requires x >= 0, y >= 0 and 2^precision * y <= MAX_CELL_VALUE. Public operands violating
/// this are rejected before any round, secret ones are the caller's responsibility.
/// Quotients that don't fit into precision + 1 bits saturate, so division by zero gives
/// 2^(precision + 1) - 1.
/// Cost: precision + 1 sequential comparisons and precision multiplications.
pub async fn divide<E: MpcEngine>(
    ctx: &MpcExecutionContext<E>,
    x: Cell<E::Share>,
    y: Cell<E::Share>,
    precision: usize,
) -> Result<Cell<E::Share>, RelError> {
    if precision > MAX_PRECISION {
        return Err(RelError::PrecisionTooLarge(precision));
    }
    check_operands(x.as_plain(), y.as_plain(), precision)?;

    if let (Cell::Plain(x), Cell::Plain(y)) = (x, y) {
        return Ok(Cell::Plain(divide_plain(x, y, precision)));
    }

    let mut remainder = x.to_secret(ctx);
    let divisor = y.to_secret(ctx);
    let mut quotient = SecretInt::zero();

    for i in (0..=precision).rev() {
        let shifted = divisor * (1 << i);
        let bit = shifted.less_eq(ctx, remainder).await;
        quotient = quotient + SecretInt::from(bit) * (1 << i);
        if i > 0 {
            remainder = remainder - shifted.mul_bit(ctx, bit).await;
        }
    }

    Ok(Cell::Secret(quotient))
}

fn check_operands(x: Option<i64>, y: Option<i64>, precision: usize) -> Result<(), RelError> {
    if let Some(x) = x.filter(|&x| x < 0) {
        return Err(RelError::DivisionOperandOutOfRange(x));
    }
    match y {
        Some(y) if y < 0 || i128::from(y) << precision > i128::from(MAX_CELL_VALUE) => {
            Err(RelError::DivisionOperandOutOfRange(y))
        }
        _ => Ok(()),
    }
}

/// Division of public values with the same semantics as [`divide`].
/// Operands and precision must already be validated.
pub(crate) fn divide_plain(x: i64, y: i64, precision: usize) -> i64 {
    let mut remainder = i128::from(x);
    let mut quotient = 0;
    for i in (0..=precision).rev() {
        let shifted = i128::from(y) << i;
        if shifted <= remainder {
            quotient |= 1 << i;
            remainder -= shifted;
        }
    }
    quotient
}
