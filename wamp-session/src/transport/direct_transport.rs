use std::{
    pin::Pin,
    task,
};

use anyhow::{
    Error,
    Result,
};
use futures_channel::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded,
};
use futures_util::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
};

use crate::transport::transport::{
    Transport,
    TransportData,
};

/// An in-memory transport connecting two endpoints in the same process.
///
/// Pings are not generated, so every item read is a message. Dropping or closing one end ends
/// the stream on the other.
#[derive(Debug)]
pub struct DirectTransport {
    tx: UnboundedSender<TransportData>,
    rx: UnboundedReceiver<TransportData>,
}

/// Creates two connected [`DirectTransport`] endpoints.
pub fn direct_transport_pair() -> (DirectTransport, DirectTransport) {
    let (a_tx, a_rx) = unbounded();
    let (b_tx, b_rx) = unbounded();
    (
        DirectTransport { tx: a_tx, rx: b_rx },
        DirectTransport { tx: b_tx, rx: a_rx },
    )
}

impl Transport for DirectTransport {}

impl Stream for DirectTransport {
    type Item = Result<TransportData>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        self.rx.poll_next_unpin(cx).map(|data| data.map(Ok))
    }
}

impl Sink<TransportData> for DirectTransport {
    type Error = Error;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.tx.poll_ready_unpin(cx).map_err(Error::new)
    }

    fn start_send(mut self: Pin<&mut Self>, item: TransportData) -> Result<(), Self::Error> {
        self.tx.start_send_unpin(item).map_err(Error::new)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.tx.poll_flush_unpin(cx).map_err(Error::new)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.tx.poll_close_unpin(cx).map_err(Error::new)
    }
}

#[cfg(test)]
mod direct_transport_test {
    use futures_util::{
        SinkExt,
        StreamExt,
    };

    use crate::transport::{
        direct_transport::direct_transport_pair,
        transport::TransportData,
    };

    #[tokio::test]
    async fn delivers_data_in_order_and_ends_on_close() {
        let (mut a, mut b) = direct_transport_pair();
        a.send(TransportData::Message(b"one".to_vec())).await.unwrap();
        a.send(TransportData::Message(b"two".to_vec())).await.unwrap();
        a.close().await.unwrap();
        assert_matches::assert_matches!(b.next().await, Some(Ok(TransportData::Message(data))) => {
            assert_eq!(data, b"one");
        });
        assert_matches::assert_matches!(b.next().await, Some(Ok(TransportData::Message(data))) => {
            assert_eq!(data, b"two");
        });
        assert_matches::assert_matches!(b.next().await, None);
    }
}
