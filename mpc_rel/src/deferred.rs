use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{channel::oneshot, future::LocalBoxFuture, FutureExt};

use crate::RelError;

/// Identifier of operator node within a query session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Single-assignment handle to a value produced by another node.
/// Resolves to an error if the producer failed.
pub struct Deferred<V> {
    source: NodeId,
    receiver: oneshot::Receiver<V>,
}

impl<V> Deferred<V> {
    /// Node which produces the value.
    pub fn source(&self) -> NodeId {
        self.source
    }
}

impl<V> Future for Deferred<V> {
    type Output = Result<V, RelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let source = this.source;
        this.receiver
            .poll_unpin(cx)
            .map(|received| received.map_err(|_| RelError::InputUnavailable(source)))
    }
}

/// Producer of a value with any number of consumers.
/// Consumers are registered with [`Fanout::another`] and each of them receives its own copy
/// once the producer resolves. Forwarding consumes the node, so no consumer can be added later.
pub struct Fanout<'a, V> {
    id: NodeId,
    producer: LocalBoxFuture<'a, Result<V, RelError>>,
    consumers: Vec<oneshot::Sender<V>>,
}

impl<'a, V: Clone + 'a> Fanout<'a, V> {
    pub fn new(id: NodeId, producer: impl Future<Output = Result<V, RelError>> + 'a) -> Self {
        Self {
            id,
            producer: producer.boxed_local(),
            consumers: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Register a new consumer.
    pub fn another(&mut self) -> Deferred<V> {
        let (sender, receiver) = oneshot::channel();
        self.consumers.push(sender);
        Deferred {
            source: self.id,
            receiver,
        }
    }

    pub fn num_consumers(&self) -> usize {
        self.consumers.len()
    }

    /// Wait for producer and deliver its value to every consumer.
    /// If producer fails, all consumers observe [`RelError::InputUnavailable`].
    pub async fn forward(self) -> Result<(), RelError> {
        let Fanout {
            id,
            producer,
            mut consumers,
        } = self;

        let value = producer.await.map_err(|err| {
            tracing::debug!(node = %id, %err, "node failed");
            err
        })?;

        tracing::debug!(node = %id, consumers = consumers.len(), "forwarding node output");
        if let Some(last) = consumers.pop() {
            for consumer in consumers {
                // Consumer might have been dropped already, which is fine.
                let _ = consumer.send(value.clone());
            }
            let _ = last.send(value);
        }
        Ok(())
    }
}
