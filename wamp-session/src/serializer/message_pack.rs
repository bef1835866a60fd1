use anyhow::Result;

use crate::{
    core::{
        error::ProtocolError,
        types::List,
    },
    message::message::Message,
    serializer::serializer::Serializer,
};

/// A serializer for MessagePack.
#[derive(Debug, Default)]
pub struct MessagePackSerializer {}

impl Serializer for MessagePackSerializer {
    fn serialize(&self, value: &Message) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&value.clone().to_wire())?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        let wire: List = rmp_serde::from_slice(bytes).map_err(|err| {
            ProtocolError::new(format!("message is not a MessagePack array: {err}"))
        })?;
        Message::from_wire(wire)
    }
}
