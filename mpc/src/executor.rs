use std::{
    cell::{Cell, RefCell},
    future::Future,
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use ff::Field;
use futures::{
    future::LocalBoxFuture,
    task::{waker, ArcWake},
};
use thiserror::Error;

use crate::{circuits::join_circuits_all, InputRequest, MpcContext, MpcDealer, MpcEngine};

/// Statistics of finished circuit execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MpcExecutionStats {
    pub num_rounds: usize,
    pub num_inputs: usize,
    pub num_openings: usize,
    pub num_integrity_checks: usize,
}

/// Error during circuit execution. Any error aborts the whole computation.
#[derive(Debug, Error)]
pub enum MpcExecutionError<E> {
    #[error("MPC engine failed: {0}")]
    Engine(E),
    #[error("circuit is pending, but it didn't issue any requests")]
    Stalled,
}

/// Context of running MPC circuit. Circuits are async functions that take reference to this context.
/// All interactive requests issued while polling the circuit are batched into a single communication round.
pub struct MpcExecutionContext<E: MpcEngine> {
    engine: RefCell<E>,
    num_parties: usize,
    party_id: usize,
    input_buffer: RoundCommandBuffer<InputRequest<E::Field>, E::Share>,
    open_buffer: RoundCommandBuffer<E::Share, E::Field>,
    integrity_check_requested: Cell<bool>,
    stats: Cell<MpcExecutionStats>,
}

impl<E: MpcEngine> MpcExecutionContext<E> {
    fn new(engine: E) -> Self {
        Self {
            num_parties: engine.num_parties(),
            party_id: engine.party_id(),
            engine: RefCell::new(engine),
            input_buffer: RoundCommandBuffer::new(),
            open_buffer: RoundCommandBuffer::new(),
            integrity_check_requested: Cell::new(false),
            stats: Cell::new(MpcExecutionStats::default()),
        }
    }

    /// Sharing of a public value.
    pub fn plain(&self, value: E::Field) -> E::Share {
        self.engine.borrow_mut().dealer().share_plain(value)
    }

    /// Sharing of one.
    pub fn one(&self) -> E::Share {
        self.plain(E::Field::one())
    }

    /// Sharing of two.
    pub fn two(&self) -> E::Share {
        self.plain(E::Field::from(2))
    }

    /// Random sharing of a secret random triple (a, b, c) that satisfies ab = c.
    pub fn next_beaver_triple(&self) -> (E::Share, E::Share, E::Share) {
        self.engine.borrow_mut().dealer().next_beaver_triple()
    }

    /// Random sharing of a secret random bit.
    pub fn next_bit(&self) -> E::Share {
        self.engine.borrow_mut().dealer().next_bit()
    }

    /// Random sharing of a secret random integer in range [0; 2^bits).
    pub fn next_uint(&self, bits: usize) -> E::Share {
        self.engine.borrow_mut().dealer().next_uint(bits)
    }

    /// Get private share of value provided by party `owner`.
    /// If `party_id() != owner`, then `value` must be None.
    pub async fn input(&self, owner: usize, value: Option<E::Field>) -> E::Share {
        self.input_buffer
            .queue(InputRequest { owner, value })
            .await
    }

    /// Open provided share. Requires communication.
    /// Warning: Integrity checks may be deferred (like in SPDZ protocol). Use with care.
    pub async fn open_unchecked(&self, share: E::Share) -> E::Field {
        self.open_buffer.queue(share).await
    }

    /// Request integrity check of all previously opened values before the next round of openings.
    pub fn ensure_integrity(&self) {
        self.integrity_check_requested.set(true);
    }

    /// Open provided share after checking integrity of everything opened before.
    pub async fn open(&self, share: E::Share) -> E::Field {
        self.ensure_integrity();
        self.open_unchecked(share).await
    }

    /// Make value known to one party public to all parties (sharing with threshold 0).
    pub async fn broadcast(&self, owner: usize, value: Option<E::Field>) -> E::Field {
        let share = self.input(owner, value).await;
        self.open(share).await
    }

    /// Reveal share only to given recipients. Other parties learn nothing and get None.
    /// Each recipient masks the value with its own random input before it's opened.
    pub async fn open_to(&self, recipients: &[usize], share: E::Share) -> Option<E::Field> {
        let party_id = self.party_id;
        let revealed = join_circuits_all(recipients.iter().map(|&recipient| async move {
            let mask = (recipient == party_id).then(|| E::Field::random(rand::thread_rng()));
            let mask_share = self.input(recipient, mask).await;
            let masked = self.open(share + mask_share).await;
            mask.map(|mask| masked - mask)
        }))
        .await;
        revealed.into_iter().flatten().next()
    }

    /// Statistics of execution so far.
    pub fn stats(&self) -> MpcExecutionStats {
        self.stats.get()
    }

    fn has_pending_requests(&self) -> bool {
        self.input_buffer.has_requests() || self.open_buffer.has_requests()
    }

    /// Send all requests gathered while polling circuit and resolve them.
    async fn process_round(&self) -> Result<(), E::Error> {
        let inputs = self.input_buffer.take_requests();
        let openings = self.open_buffer.take_requests();
        let mut stats = self.stats.get();
        stats.num_rounds += 1;

        tracing::trace!(
            round = stats.num_rounds,
            inputs = inputs.len(),
            openings = openings.len(),
            "processing round"
        );

        let mut engine = self.engine.borrow_mut();

        let input_responses = if inputs.is_empty() {
            Vec::new()
        } else {
            stats.num_inputs += inputs.len();
            engine.process_inputs(inputs).await?
        };

        if self.integrity_check_requested.replace(false) {
            stats.num_integrity_checks += 1;
            engine.check_integrity().await?;
        }

        let open_responses = if openings.is_empty() {
            Vec::new()
        } else {
            stats.num_openings += openings.len();
            engine.process_openings_unchecked(openings).await?
        };

        drop(engine);
        self.stats.set(stats);
        self.input_buffer.resolve_all(input_responses);
        self.open_buffer.resolve_all(open_responses);
        Ok(())
    }

    /// Check integrity of everything that was opened.
    async fn final_integrity_check(&self) -> Result<(), E::Error> {
        let mut stats = self.stats.get();
        stats.num_integrity_checks += 1;
        self.stats.set(stats);
        self.engine.borrow_mut().check_integrity().await
    }
}

impl<E: MpcEngine> MpcContext for MpcExecutionContext<E> {
    type Field = E::Field;
    type Share = E::Share;

    fn num_parties(&self) -> usize {
        self.num_parties
    }

    fn party_id(&self) -> usize {
        self.party_id
    }
}

/// Execute given async circuit on specified MPC engine.
/// The engine is dropped after the circuit completes, which terminates participation of this party.
pub async fn run_circuit<E, T, F>(
    engine: E,
    circuit: F,
) -> Result<(T, MpcExecutionStats), MpcExecutionError<E::Error>>
where
    E: MpcEngine,
    F: for<'a> FnOnce(&'a MpcExecutionContext<E>) -> LocalBoxFuture<'a, T>,
{
    let ctx = MpcExecutionContext::new(engine);

    let output = {
        let mut future = circuit(&ctx);
        let wake_flag = Arc::new(WakeFlag::default());
        let waker = waker(wake_flag.clone());

        loop {
            wake_flag.0.store(false, Ordering::SeqCst);

            if let Poll::Ready(output) = future.as_mut().poll(&mut Context::from_waker(&waker)) {
                break output;
            }

            if ctx.has_pending_requests() {
                ctx.process_round()
                    .await
                    .map_err(MpcExecutionError::Engine)?;
            } else if !wake_flag.0.load(Ordering::SeqCst) {
                // Nothing can make progress: no requests were queued and no local future was woken up.
                tracing::warn!("circuit stalled");
                return Err(MpcExecutionError::Stalled);
            }
        }
    };

    ctx.final_integrity_check()
        .await
        .map_err(MpcExecutionError::Engine)?;

    let stats = ctx.stats();
    tracing::debug!(?stats, "circuit finished");
    Ok((output, stats))
}

/// Waker that records whether any local future was woken during polling.
#[derive(Default)]
struct WakeFlag(AtomicBool);

impl ArcWake for WakeFlag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.store(true, Ordering::SeqCst);
    }
}

/// Buffer for accumulating commands issued by async circuit.
struct RoundCommandBuffer<T, S> {
    requests: RefCell<Vec<T>>,
    responses: RefCell<Vec<Option<S>>>,
    round_index: Cell<usize>,
    first_unpolled_response: Cell<usize>,
}

impl<T, S> RoundCommandBuffer<T, S> {
    /// Create new instance.
    fn new() -> Self {
        RoundCommandBuffer {
            requests: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
            round_index: Cell::new(0),
            first_unpolled_response: Cell::new(0),
        }
    }

    /// Queue new command and asynchronously wait for response.
    async fn queue(&self, input: T) -> S {
        let index = self.requests.borrow().len();
        let target_round = self.round_index.get() + 1;
        self.requests.borrow_mut().push(input);

        futures::future::poll_fn(|_| {
            if self.round_index.get() == target_round {
                if self.first_unpolled_response.get() != index {
                    panic!("Circuit execution went out of order");
                }
                self.first_unpolled_response.set(index + 1);
                Poll::Ready(
                    self.responses.borrow_mut()[index]
                        .take()
                        .expect("Future polled twice"),
                )
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Check if any command was queued since last round.
    fn has_requests(&self) -> bool {
        !self.requests.borrow().is_empty()
    }

    /// Get requests accumulated during last round.
    fn take_requests(&self) -> Vec<T> {
        mem::take(&mut *self.requests.borrow_mut())
    }

    /// Resolve all requests issued during last round.
    fn resolve_all(&self, new_responses: impl IntoIterator<Item = S>) {
        let mut responses = self.responses.borrow_mut();

        if self.first_unpolled_response.get() != responses.len() {
            panic!("Some responses from previous round were not processed");
        }

        responses.clear();
        responses.extend(new_responses.into_iter().map(Some));
        self.round_index.set(self.round_index.get() + 1);
        self.first_unpolled_response.set(0);
    }
}

#[cfg(test)]
mod tests {
    use crate::circuits::{join_circuits_all, testing::*};
    use crate::executor::{run_circuit, MpcExecutionError};

    #[tokio::test]
    async fn test_batches_requests_into_rounds() {
        let (result, stats) = run_circuit(MockEngine::new(), |ctx| {
            Box::pin(async move {
                let shares =
                    join_circuits_all((1..=4u64).map(|x| ctx.input(0, Some(x.into())))).await;
                let opened = join_circuits_all(shares.into_iter().map(|x| ctx.open(x))).await;
                opened.into_iter().fold(MockField::from(0), |acc, x| acc + x)
            })
        })
        .await
        .unwrap();

        assert_eq!(result, MockField::from(10));
        assert_eq!(stats.num_rounds, 2);
        assert_eq!(stats.num_inputs, 4);
        assert_eq!(stats.num_openings, 4);
    }

    #[tokio::test]
    async fn test_broadcast_and_open_to() {
        let (result, _) = run_circuit(MockEngine::new(), |ctx| {
            Box::pin(async move {
                let public = ctx.broadcast(0, Some(42.into())).await;
                let private = ctx.open_to(&[0], ctx.plain(7.into())).await;
                (public, private)
            })
        })
        .await
        .unwrap();

        assert_eq!(result, (MockField::from(42), Some(MockField::from(7))));
    }

    #[tokio::test]
    async fn test_stalled_circuit() {
        let result = run_circuit(MockEngine::new(), |_| {
            Box::pin(async move { futures::future::pending::<()>().await })
        })
        .await;

        assert!(matches!(result, Err(MpcExecutionError::Stalled)));
    }
}
