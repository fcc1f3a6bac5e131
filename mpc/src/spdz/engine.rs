use std::mem;

use async_trait::async_trait;
use ff::{Field, PrimeField};
use futures::{Sink, Stream};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::{
    transport::{MultipartyTransport, TransportError},
    InputRequest, MpcContext, MpcDealer, MpcEngine, MpcField,
};

use super::{SpdzDealer, SpdzShare};

/// SPDZ protocol message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SpdzMessage<T> {
    Input(Vec<T>),
    PartialOpenShares(Vec<T>),
    PartialOpenSum(Vec<T>),
    MacCheckCommit(Vec<u8>),
    MacCheckReveal { sigma: T, nonce: Vec<u8> },
}

/// Error in SPDZ protocol. Any error is fatal for the whole computation.
#[derive(Debug, Error)]
pub enum SpdzError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected message from party {0}")]
    UnexpectedMessage(usize),
    #[error("party {party} sent {found} values, expected {expected}")]
    LengthMismatch {
        party: usize,
        expected: usize,
        found: usize,
    },
    #[error("input requested from unknown party {0}")]
    UnknownParty(usize),
    #[error("input value of current party is missing")]
    MissingInput,
    #[error("party {0} revealed value that doesn't match its commitment")]
    CommitmentMismatch(usize),
    #[error("MAC check of opened values failed")]
    MacCheckFailed,
}

/// SPDZ protocol implementation.
pub struct SpdzEngine<T, Dealer, Channel> {
    dealer: Dealer,
    transport: MultipartyTransport<SpdzMessage<T>, Channel>,
    unchecked: Vec<(T, T)>, // Opened values and own MAC shares, waiting for integrity check.
}

impl<T, Dealer, Channel> SpdzEngine<T, Dealer, Channel> {
    pub fn new(dealer: Dealer, transport: MultipartyTransport<SpdzMessage<T>, Channel>) -> Self {
        Self {
            dealer,
            transport,
            unchecked: Vec::new(),
        }
    }
}

impl<T, Dealer, Channel> MpcContext for SpdzEngine<T, Dealer, Channel>
where
    T: MpcField,
    Dealer: SpdzDealer<Field = T, Share = SpdzShare<T>>,
{
    type Field = T;
    type Share = SpdzShare<T>;

    fn num_parties(&self) -> usize {
        self.transport.num_parties()
    }

    fn party_id(&self) -> usize {
        self.transport.party_id()
    }
}

#[async_trait(?Send)]
impl<T, E, Dealer, Channel> MpcEngine for SpdzEngine<T, Dealer, Channel>
where
    T: MpcField,
    Dealer: SpdzDealer<Field = T, Share = SpdzShare<T>>,
    Channel: Stream<Item = Result<SpdzMessage<T>, E>> + Sink<SpdzMessage<T>> + Unpin,
{
    type Dealer = Dealer;
    type Error = SpdzError;

    fn dealer(&mut self) -> &mut Self::Dealer {
        &mut self.dealer
    }

    async fn process_inputs(
        &mut self,
        requests: Vec<InputRequest<Self::Field>>,
    ) -> Result<Vec<Self::Share>, Self::Error> {
        let party_id = self.party_id();
        let num_parties = self.num_parties();

        // Owner broadcasts difference between its input and a mask known only to it.
        let mut own_deltas = Vec::new();
        let mut shares = Vec::with_capacity(requests.len());
        for request in &requests {
            if request.owner >= num_parties {
                return Err(SpdzError::UnknownParty(request.owner));
            }
            if request.owner == party_id {
                let value = request.value.ok_or(SpdzError::MissingInput)?;
                let (mask, mask_plain) = self.dealer.next_input_mask_own();
                let delta = value - mask_plain;
                own_deltas.push(delta);
                shares.push(Some(mask + self.dealer.share_plain(delta)));
            } else {
                shares.push(None);
            }
        }

        let mut deltas: Vec<_> = (0..num_parties).map(|_| Vec::new().into_iter()).collect();
        for (other_id, msg) in self
            .transport
            .exchange_with_all(SpdzMessage::Input(own_deltas))
            .await?
        {
            let expected = requests.iter().filter(|r| r.owner == other_id).count();
            match msg {
                SpdzMessage::Input(values) if values.len() == expected => {
                    deltas[other_id] = values.into_iter();
                }
                SpdzMessage::Input(values) => {
                    return Err(SpdzError::LengthMismatch {
                        party: other_id,
                        expected,
                        found: values.len(),
                    })
                }
                _ => return Err(SpdzError::UnexpectedMessage(other_id)),
            }
        }

        let mut result = Vec::with_capacity(requests.len());
        for (share, request) in shares.into_iter().zip(&requests) {
            let share = match share {
                Some(share) => share,
                None => {
                    // Lengths were validated above.
                    let delta = deltas[request.owner].next().unwrap_or_else(T::zero);
                    let mask = self.dealer.next_input_mask_for(request.owner);
                    mask + self.dealer.share_plain(delta)
                }
            };
            result.push(share);
        }
        Ok(result)
    }

    async fn process_openings_unchecked(
        &mut self,
        requests: Vec<Self::Share>,
    ) -> Result<Vec<Self::Field>, Self::Error> {
        let mut values: Vec<_> = requests.iter().map(|x| x.value).collect();

        // Party 0 gathers partial shares and broadcasts the sums.
        let opened = if self.party_id() == 0 {
            for (other_id, msg) in self.transport.receive_from_all().await? {
                match msg {
                    SpdzMessage::PartialOpenShares(parts) if parts.len() == values.len() => {
                        for (value, part) in values.iter_mut().zip(parts) {
                            *value += part;
                        }
                    }
                    SpdzMessage::PartialOpenShares(parts) => {
                        return Err(SpdzError::LengthMismatch {
                            party: other_id,
                            expected: values.len(),
                            found: parts.len(),
                        })
                    }
                    _ => return Err(SpdzError::UnexpectedMessage(other_id)),
                }
            }
            self.transport
                .send_to_all(SpdzMessage::PartialOpenSum(values.clone()))
                .await?;
            values
        } else {
            let expected = values.len();
            self.transport
                .send_to(0, SpdzMessage::PartialOpenShares(values))
                .await?;
            match self.transport.receive_from(0).await? {
                SpdzMessage::PartialOpenSum(sums) if sums.len() == expected => sums,
                SpdzMessage::PartialOpenSum(sums) => {
                    return Err(SpdzError::LengthMismatch {
                        party: 0,
                        expected,
                        found: sums.len(),
                    })
                }
                _ => return Err(SpdzError::UnexpectedMessage(0)),
            }
        };

        self.unchecked
            .extend(opened.iter().zip(&requests).map(|(&v, share)| (v, share.mac)));
        Ok(opened)
    }

    async fn check_integrity(&mut self) -> Result<(), Self::Error> {
        if self.unchecked.is_empty() {
            return Ok(());
        }
        let opened = mem::take(&mut self.unchecked);

        // Random linear combination of MAC differences, with coefficients derived from public opened values.
        let mut hasher = Sha3_256::new();
        for (value, _) in &opened {
            hasher.update(value.to_repr());
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hasher.finalize());
        let mut rng = SmallRng::from_seed(seed);

        let key_share = self.dealer.authentication_key_share();
        let sigma = opened.iter().fold(T::zero(), |acc, &(value, mac)| {
            acc + T::random(&mut rng) * (mac - key_share * value)
        });

        // Commit to own sigma before seeing sigmas of others.
        let nonce: [u8; 32] = rand::thread_rng().gen();
        let commitments = self
            .transport
            .exchange_with_all(SpdzMessage::MacCheckCommit(commit(sigma, &nonce)))
            .await?;
        let reveals = self
            .transport
            .exchange_with_all(SpdzMessage::MacCheckReveal {
                sigma,
                nonce: nonce.to_vec(),
            })
            .await?;

        let mut total = sigma;
        for ((other_id, commitment), (_, reveal)) in commitments.into_iter().zip(reveals) {
            match (commitment, reveal) {
                (
                    SpdzMessage::MacCheckCommit(commitment),
                    SpdzMessage::MacCheckReveal { sigma, nonce },
                ) => {
                    if commit(sigma, &nonce) != commitment {
                        return Err(SpdzError::CommitmentMismatch(other_id));
                    }
                    total += sigma;
                }
                _ => return Err(SpdzError::UnexpectedMessage(other_id)),
            }
        }

        if bool::from(total.is_zero()) {
            tracing::trace!(values = opened.len(), "MAC check passed");
            Ok(())
        } else {
            Err(SpdzError::MacCheckFailed)
        }
    }
}

/// Hash commitment to a field element.
fn commit<T: PrimeField>(value: T, nonce: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_256::new();
    hasher.update(value.to_repr());
    hasher.update(nonce);
    hasher.finalize().to_vec()
}
