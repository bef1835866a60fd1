use anyhow::Result;

use crate::{
    core::{
        error::ProtocolError,
        types::List,
    },
    message::message::Message,
    serializer::serializer::Serializer,
};

/// A serializer for compact, UTF-8 JSON.
#[derive(Debug, Default)]
pub struct JsonSerializer {}

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&value.clone().to_wire())?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        let wire: List = serde_json::from_slice(bytes)
            .map_err(|err| ProtocolError::new(format!("message is not a JSON array: {err}")))?;
        Message::from_wire(wire)
    }
}

#[cfg(test)]
mod json_serializer_test {
    use crate::{
        core::{
            error::ProtocolError,
            types::Dictionary,
            uri::Uri,
        },
        message::message::{
            HelloMessage,
            Message,
        },
        serializer::{
            json::JsonSerializer,
            serializer::Serializer,
        },
    };

    #[test]
    fn serializes_without_whitespace() {
        let serializer = JsonSerializer::default();
        let message = Message::Hello(HelloMessage {
            realm: Uri::try_from("com.example").unwrap(),
            details: Dictionary::default(),
        });
        assert_matches::assert_matches!(serializer.serialize(&message), Ok(bytes) => {
            assert_eq!(String::from_utf8(bytes).unwrap(), r#"[1,"com.example",{}]"#);
        });
    }

    #[test]
    fn deserializes_message() {
        let serializer = JsonSerializer::default();
        assert_matches::assert_matches!(
            serializer.deserialize(br#"[2, 1234, {"roles": {"dealer": {}}}]"#),
            Ok(Message::Welcome(message)) => {
                assert_eq!(message.session.value(), 1234);
            }
        );
    }

    #[test]
    fn rejects_non_array_data() {
        let serializer = JsonSerializer::default();
        assert_matches::assert_matches!(serializer.deserialize(b"{\"a\": 1}"), Err(err) => {
            assert!(err.is::<ProtocolError>());
        });
        assert_matches::assert_matches!(serializer.deserialize(b"not json"), Err(err) => {
            assert!(err.is::<ProtocolError>());
        });
    }
}
