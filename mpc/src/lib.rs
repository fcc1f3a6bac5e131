use std::{
    fmt,
    ops::{Add, Mul, Neg, Sub},
};

use async_trait::async_trait;

pub use ff;

pub mod circuits;
pub mod executor;
pub mod fields;
pub mod plaintext;
pub mod spdz;
pub mod transport;

pub use fields::MpcField;

/// Private share of a field element.
/// Sharing is linear and supports multiplication by plaintext field elements without communication.
pub trait MpcShare:
    Copy
    + Clone
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Mul<Self::Field, Output = Self>
{
    /// Field type of value represented by this share.
    type Field: MpcField;

    /// Sharing of zero. Doesn't depend on party.
    fn zero() -> Self;

    /// Multiply share by two.
    fn double(&self) -> Self;
}

/// Sharing-based MPC computation context.
pub trait MpcContext {
    /// Field type used by this MPC protocol.
    type Field: MpcField;

    /// Share type used by this MPC protocol.
    type Share: MpcShare<Field = Self::Field>;

    /// Number of parties participating in MPC computation.
    fn num_parties(&self) -> usize;

    /// ID of current party.
    fn party_id(&self) -> usize;
}

/// Dealer of precomputed parameters for MPC computation.
pub trait MpcDealer: MpcContext {
    /// Sharing of a public value.
    fn share_plain(&self, x: Self::Field) -> Self::Share;

    /// Random sharing of a secret random triple (a, b, c) that satisfies ab = c.
    fn next_beaver_triple(&mut self) -> (Self::Share, Self::Share, Self::Share);

    /// Random sharing of a secret random bit.
    fn next_bit(&mut self) -> Self::Share;

    /// Random sharing of a secret uniformly random integer in range [0; 2^bits).
    fn next_uint(&mut self, bits: usize) -> Self::Share {
        (0..bits).fold(Self::Share::zero(), |acc, _| acc.double() + self.next_bit())
    }
}

/// Request for secret input, issued by all parties in the same order.
/// `value` is present only on the owning party.
#[derive(Clone, Copy, Debug)]
pub struct InputRequest<T> {
    pub owner: usize,
    pub value: Option<T>,
}

/// Low-level interface of sharing-based MPC protocol.
#[async_trait(?Send)]
pub trait MpcEngine: MpcContext {
    type Dealer: MpcDealer<Field = Self::Field, Share = Self::Share>;
    type Error: fmt::Debug + fmt::Display;

    /// Get dealer associated with this computation.
    fn dealer(&mut self) -> &mut Self::Dealer;

    /// Share a batch of input values. Returns one share per request, in order.
    async fn process_inputs(
        &mut self,
        requests: Vec<InputRequest<Self::Field>>,
    ) -> Result<Vec<Self::Share>, Self::Error>;

    /// Open a batch of shares without checking their integrity.
    async fn process_openings_unchecked(
        &mut self,
        requests: Vec<Self::Share>,
    ) -> Result<Vec<Self::Field>, Self::Error>;

    /// Verify integrity of all values opened so far.
    async fn check_integrity(&mut self) -> Result<(), Self::Error>;
}
