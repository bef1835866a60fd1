use std::time::Duration;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    SinkExt,
    StreamExt,
};
use tokio::sync::mpsc::UnboundedReceiver;
use wamp_session::{
    core::{
        id::Id,
        types::{
            Dictionary,
            Value,
        },
    },
    message::message::{
        GoodbyeMessage,
        HelloMessage,
        Message,
        WelcomeMessage,
    },
    peer::{
        DirectConnection,
        DirectConnector,
        direct_connector,
    },
    serializer::serializer::{
        Serializer,
        SerializerType,
        new_serializer,
    },
    transport::{
        direct_transport::DirectTransport,
        transport::TransportData,
    },
};

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// A router whose every message is written by the test.
///
/// Useful for delivering responses out of order, late, or malformed.
pub struct ScriptedRouter {
    acceptor_rx: UnboundedReceiver<DirectConnection>,
}

impl ScriptedRouter {
    pub fn start() -> (Self, DirectConnector) {
        let (connector, acceptor_rx) = direct_connector(SerializerType::Json);
        (Self { acceptor_rx }, connector)
    }

    /// Waits for the next session to connect.
    pub async fn accept(&mut self) -> Result<ScriptedConnection> {
        let connection = tokio::time::timeout(RECEIVE_TIMEOUT, self.acceptor_rx.recv())
            .await?
            .ok_or_else(|| Error::msg("connector dropped"))?;
        Ok(ScriptedConnection {
            transport: connection.transport,
            serializer: new_serializer(connection.serializer),
        })
    }
}

/// The router end of one connection to a [`ScriptedRouter`].
pub struct ScriptedConnection {
    transport: DirectTransport,
    serializer: Box<dyn Serializer>,
}

impl ScriptedConnection {
    /// Receives the next message from the session.
    pub async fn receive(&mut self) -> Result<Message> {
        loop {
            let data = tokio::time::timeout(RECEIVE_TIMEOUT, self.transport.next())
                .await?
                .ok_or_else(|| Error::msg("connection closed"))??;
            if let TransportData::Message(data) = data {
                return self.serializer.deserialize(&data);
            }
        }
    }

    /// Checks that the session closed the connection.
    pub async fn closed(&mut self) -> Result<()> {
        match tokio::time::timeout(RECEIVE_TIMEOUT, self.transport.next()).await? {
            None => Ok(()),
            Some(data) => Err(Error::msg(format!(
                "expected connection to close, got {data:?}"
            ))),
        }
    }

    pub async fn send(&mut self, message: Message) -> Result<()> {
        let data = self.serializer.serialize(&message)?;
        self.transport.send(TransportData::Message(data)).await
    }

    /// Sends a raw JSON frame, such as `[50,1,{},["hello"]]`.
    pub async fn send_raw(&mut self, json: &str) -> Result<()> {
        self.transport
            .send(TransportData::Message(json.as_bytes().to_vec()))
            .await
    }

    /// Answers HELLO with WELCOME.
    pub async fn establish(&mut self, session: u64) -> Result<HelloMessage> {
        let hello = match self.receive().await? {
            Message::Hello(hello) => hello,
            message => {
                return Err(Error::msg(format!(
                    "expected HELLO, got {}",
                    message.message_name()
                )));
            }
        };
        self.send(Message::Welcome(WelcomeMessage {
            session: Id::try_from(session)?,
            details: Dictionary::from_iter([(
                "roles".to_owned(),
                Value::Dictionary(Dictionary::from_iter([(
                    "dealer".to_owned(),
                    Value::Dictionary(Dictionary::default()),
                )])),
            )]),
        }))
        .await?;
        Ok(hello)
    }

    /// Answers GOODBYE with `wamp.close.goodbye_and_out`.
    pub async fn echo_goodbye(&mut self) -> Result<GoodbyeMessage> {
        let goodbye = match self.receive().await? {
            Message::Goodbye(goodbye) => goodbye,
            message => {
                return Err(Error::msg(format!(
                    "expected GOODBYE, got {}",
                    message.message_name()
                )));
            }
        };
        self.send_raw(r#"[6,{},"wamp.close.goodbye_and_out"]"#)
            .await?;
        Ok(goodbye)
    }

    /// Closes the connection without any closing handshake.
    pub async fn close(mut self) {
        self.transport.close().await.ok();
    }
}
