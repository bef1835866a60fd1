use std::{
    pin::Pin,
    task,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
};

use crate::{
    message::message::Message,
    serializer::serializer::Serializer,
    transport::transport::{
        Transport,
        TransportData,
    },
};

/// An item read from or written to a [`MessageStream`].
#[derive(Debug)]
pub enum StreamMessage {
    /// A health check that should be answered immediately.
    Ping(Vec<u8>),
    /// A well-formed WAMP message.
    Message(Message),
    /// A frame that could not be decoded into a message.
    ///
    /// Malformed frames do not end the stream.
    Malformed(Error),
}

/// A stream of WAMP messages over a transport.
///
/// Frames are decoded with the serializer negotiated for the connection.
pub struct MessageStream {
    transport: Box<dyn Transport>,
    serializer: Box<dyn Serializer>,
}

impl MessageStream {
    pub fn new(transport: Box<dyn Transport>, serializer: Box<dyn Serializer>) -> Self {
        Self {
            transport,
            serializer,
        }
    }
}

impl Stream for MessageStream {
    type Item = Result<StreamMessage>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        let item = match futures_util::ready!(self.transport.poll_next_unpin(cx)) {
            Some(Ok(TransportData::Ping(data))) => Some(Ok(StreamMessage::Ping(data))),
            Some(Ok(TransportData::Message(data))) => match self.serializer.deserialize(&data) {
                Ok(message) => Some(Ok(StreamMessage::Message(message))),
                Err(err) => Some(Ok(StreamMessage::Malformed(err))),
            },
            Some(Err(err)) => Some(Err(err)),
            None => None,
        };
        task::Poll::Ready(item)
    }
}

impl Sink<StreamMessage> for MessageStream {
    type Error = Error;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.transport.poll_ready_unpin(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: StreamMessage) -> Result<(), Self::Error> {
        let data = match item {
            StreamMessage::Ping(data) => TransportData::Ping(data),
            StreamMessage::Message(message) => {
                TransportData::Message(self.serializer.serialize(&message)?)
            }
            StreamMessage::Malformed(err) => return Err(err.context("cannot send malformed data")),
        };
        self.transport.start_send_unpin(data)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.transport.poll_flush_unpin(cx)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Result<(), Self::Error>> {
        self.transport.poll_close_unpin(cx)
    }
}
