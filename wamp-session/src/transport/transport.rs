use std::fmt::Debug;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    Stream,
};

/// Data read from or written to a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportData {
    /// A health check that should be sent straight back.
    Ping(Vec<u8>),
    /// One complete serialized WAMP message.
    Message(Vec<u8>),
}

/// A duplex, message-oriented channel over which serialized WAMP messages travel.
///
/// Every item read is one complete application message. The stream ending means the connection
/// closed.
pub trait Transport:
    Send + Stream<Item = Result<TransportData>> + Sink<TransportData, Error = Error> + Unpin + Debug
{
}
