use std::fmt::Debug;

use anyhow::Result;

use crate::{
    core::{
        error::ValidationError,
        uri::Uri,
    },
    message::message::Message,
    serializer::{
        json::JsonSerializer,
        message_pack::MessagePackSerializer,
    },
};

/// The type of serializer used on a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SerializerType {
    /// Serializes messages to and from compact JSON text.
    Json,
    /// Serializes messages to and from the MessagePack format.
    MessagePack,
}

impl SerializerType {
    /// The sub-protocol URI used during protocol negotiation.
    pub fn uri(&self) -> Uri {
        match self {
            Self::Json => Uri::from_known("wamp.2.json"),
            Self::MessagePack => Uri::from_known("wamp.2.msgpack"),
        }
    }

    /// Checks if messages are sent as binary data.
    pub fn binary(&self) -> bool {
        match self {
            Self::Json => false,
            Self::MessagePack => true,
        }
    }
}

impl TryFrom<&str> for SerializerType {
    type Error = ValidationError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "wamp.2.json" => Ok(Self::Json),
            "wamp.2.msgpack" => Ok(Self::MessagePack),
            _ => Err(ValidationError::new(format!(
                "unsupported serializer: {value}"
            ))),
        }
    }
}

/// Serializes and deserializes WAMP messages for the wire.
///
/// Does not implement message batching.
pub trait Serializer: Send + Debug {
    /// Serializes the given message to bytes.
    fn serialize(&self, value: &Message) -> Result<Vec<u8>>;

    /// Deserializes bytes to a message.
    ///
    /// Fails with a protocol error if the bytes do not describe a known message.
    fn deserialize(&self, bytes: &[u8]) -> Result<Message>;
}

/// Creates a new [`Serializer`] for the given type.
pub fn new_serializer(serializer_type: SerializerType) -> Box<dyn Serializer> {
    match serializer_type {
        SerializerType::Json => Box::new(JsonSerializer::default()),
        SerializerType::MessagePack => Box::new(MessagePackSerializer::default()),
    }
}
