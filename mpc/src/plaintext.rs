use std::{
    convert::Infallible,
    marker::PhantomData,
    ops::{Add, Mul, Neg, Sub},
};

use async_trait::async_trait;
use ff::Field;
use rand::{thread_rng, Rng};

use crate::{InputRequest, MpcContext, MpcDealer, MpcEngine, MpcField, MpcShare};

/// Mock MPC engine that computes result in plain on a single node.
pub struct MockMpcEngine<T: MpcField> {
    _phantom: PhantomData<T>,
}

impl<T: MpcField> MockMpcEngine<T> {
    /// Create a new instance of mock.
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: MpcField> Default for MockMpcEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MpcField> MpcContext for MockMpcEngine<T> {
    type Field = T;
    type Share = PlainShare<T>;

    fn num_parties(&self) -> usize {
        1
    }

    fn party_id(&self) -> usize {
        0
    }
}

#[async_trait(?Send)]
impl<T: MpcField> MpcEngine for MockMpcEngine<T> {
    type Dealer = Self;
    type Error = Infallible;

    fn dealer(&mut self) -> &mut Self::Dealer {
        self
    }

    async fn process_inputs(
        &mut self,
        requests: Vec<InputRequest<Self::Field>>,
    ) -> Result<Vec<Self::Share>, Self::Error> {
        Ok(requests
            .into_iter()
            .map(|r| PlainShare(r.value.unwrap_or_else(T::zero)))
            .collect())
    }

    async fn process_openings_unchecked(
        &mut self,
        requests: Vec<Self::Share>,
    ) -> Result<Vec<Self::Field>, Self::Error> {
        Ok(requests.iter().map(|r| r.0).collect())
    }

    async fn check_integrity(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<T: MpcField> MpcDealer for MockMpcEngine<T> {
    fn share_plain(&self, x: Self::Field) -> Self::Share {
        PlainShare(x)
    }

    fn next_beaver_triple(&mut self) -> (Self::Share, Self::Share, Self::Share) {
        let mut rng = thread_rng();
        let a = Self::Field::random(&mut rng);
        let b = Self::Field::random(&mut rng);
        (PlainShare(a), PlainShare(b), PlainShare(a * b))
    }

    fn next_bit(&mut self) -> Self::Share {
        let bit = if thread_rng().gen() { T::one() } else { T::zero() };
        PlainShare(bit)
    }
}

/// Mock share of a computation run on a single node. Wraps plaintext value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlainShare<T>(pub T);

impl<T: MpcField> MpcShare for PlainShare<T> {
    type Field = T;

    fn zero() -> Self {
        PlainShare(T::zero())
    }

    fn double(&self) -> Self {
        PlainShare(self.0.double())
    }
}

impl<T: MpcField> Add for PlainShare<T> {
    type Output = PlainShare<T>;
    fn add(self, rhs: Self) -> Self::Output {
        PlainShare(self.0 + rhs.0)
    }
}

impl<T: MpcField> Sub for PlainShare<T> {
    type Output = PlainShare<T>;
    fn sub(self, rhs: Self) -> Self::Output {
        PlainShare(self.0 - rhs.0)
    }
}

impl<T: MpcField> Neg for PlainShare<T> {
    type Output = PlainShare<T>;
    fn neg(self) -> Self::Output {
        PlainShare(-self.0)
    }
}

impl<T: MpcField> Mul<T> for PlainShare<T> {
    type Output = PlainShare<T>;
    fn mul(self, rhs: T) -> Self::Output {
        PlainShare(self.0 * rhs)
    }
}
