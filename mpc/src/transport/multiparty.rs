use futures::{
    stream::{SplitSink, SplitStream},
    FutureExt, Sink, SinkExt, Stream, StreamExt, TryFutureExt,
};

use super::TransportError;

type ChannelHalves<T, Channel> = (SplitSink<Channel, T>, SplitStream<Channel>);

/// Wrapper for peer-to-peer connections in multi-party protocol.
pub struct MultipartyTransport<T, Channel> {
    channels: Vec<Option<ChannelHalves<T, Channel>>>,
    party_id: usize,
}

impl<T, Channel> MultipartyTransport<T, Channel>
where
    Channel: Stream + Sink<T>,
{
    /// Create wrapper for given list of connections. All channels but party_id should be present.
    pub fn new(channels: impl IntoIterator<Item = Option<Channel>>, party_id: usize) -> Self {
        // We split streams into unidirectional halves. This allows us to
        // asynchronously wait on both receives and sends without bothering borrow checker.
        let channels: Vec<_> = channels.into_iter().map(|x| x.map(|x| x.split())).collect();
        for (j, channel) in channels.iter().enumerate() {
            if j != party_id && channel.is_none() {
                panic!("Channel missing for party {}", j);
            }
        }
        Self { channels, party_id }
    }
}

impl<T, Channel> MultipartyTransport<T, Channel> {
    /// Number of parties participating in multi-party protocol.
    pub fn num_parties(&self) -> usize {
        self.channels.len()
    }

    /// ID of current party.
    pub fn party_id(&self) -> usize {
        self.party_id
    }

    /// Channel to other party. Loopback channel doesn't exist.
    fn channel(
        &mut self,
        other_id: usize,
    ) -> Result<&mut ChannelHalves<T, Channel>, TransportError> {
        if other_id == self.party_id {
            return Err(TransportError::NoChannel(other_id));
        }
        self.channels
            .get_mut(other_id)
            .and_then(Option::as_mut)
            .ok_or(TransportError::NoChannel(other_id))
    }

    /// Channels to all other parties, in order of party IDs.
    fn other_channels(&mut self) -> impl Iterator<Item = (usize, &mut ChannelHalves<T, Channel>)> {
        let party_id = self.party_id;
        self.channels
            .iter_mut()
            .enumerate()
            .filter(move |(id, _)| *id != party_id)
            .filter_map(|(id, channel)| channel.as_mut().map(|channel| (id, channel)))
    }
}

impl<T, E, Channel> MultipartyTransport<T, Channel>
where
    T: Clone,
    Channel: Stream<Item = Result<T, E>> + Sink<T> + Unpin,
{
    /// Send message to party with given ID.
    pub async fn send_to(&mut self, other_id: usize, msg: T) -> Result<(), TransportError> {
        let (sink, _) = self.channel(other_id)?;
        sink.send(msg)
            .await
            .map_err(|_| TransportError::Send(other_id))
    }

    /// Receive message from party with given ID.
    pub async fn receive_from(&mut self, other_id: usize) -> Result<T, TransportError> {
        let (_, stream) = self.channel(other_id)?;
        match stream.next().await {
            Some(Ok(msg)) => Ok(msg),
            _ => Err(TransportError::Recv(other_id)),
        }
    }

    /// Send message to all parties.
    pub async fn send_to_all(&mut self, msg: T) -> Result<(), TransportError> {
        futures::future::try_join_all(self.other_channels().map(|(id, (sink, _))| {
            sink.send(msg.clone())
                .then(move |x| async move { x.map_err(|_| TransportError::Send(id)) })
        }))
        .await
        .map(|_| ())
    }

    /// Receive messages from all parties.
    pub async fn receive_from_all(&mut self) -> Result<Vec<(usize, T)>, TransportError> {
        futures::future::try_join_all(self.other_channels().map(|(id, (_, stream))| {
            stream.next().then(move |raw| async move {
                match raw {
                    Some(Ok(msg)) => Ok((id, msg)),
                    _ => Err(TransportError::Recv(id)),
                }
            })
        }))
        .await
    }

    /// Concurrently send and receive messages from all parties.
    pub async fn exchange_with_all(&mut self, msg: T) -> Result<Vec<(usize, T)>, TransportError> {
        futures::future::try_join_all(self.other_channels().map(|(id, (sink, stream))| {
            let send_future = sink
                .send(msg.clone())
                .then(move |x| async move { x.map_err(|_| TransportError::Send(id)) });
            let recv_future = stream.next().then(move |raw| async move {
                match raw {
                    Some(Ok(msg)) => Ok((id, msg)),
                    _ => Err(TransportError::Recv(id)),
                }
            });
            futures::future::try_join(send_future, recv_future)
                .and_then(|(_, received_msg)| async { Ok(received_msg) })
        }))
        .await
    }
}
