use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::{
    UnboundedReceiver,
    UnboundedSender,
    unbounded_channel,
};

use crate::{
    core::error::ConnectionError,
    peer::{
        config::SessionConfig,
        connector::connector::{
            Connection,
            Connector,
        },
    },
    serializer::serializer::SerializerType,
    transport::direct_transport::{
        DirectTransport,
        direct_transport_pair,
    },
};

/// The router end of a connection opened by a [`DirectConnector`].
#[derive(Debug)]
pub struct DirectConnection {
    pub transport: DirectTransport,
    pub serializer: SerializerType,
}

/// Connects to a router running in the same process.
///
/// Each connection creates a new in-memory transport pair and hands the router end to the
/// acceptor channel.
#[derive(Debug, Clone)]
pub struct DirectConnector {
    serializer: SerializerType,
    acceptor_tx: UnboundedSender<DirectConnection>,
}

/// Creates a connector along with the channel on which its connections are accepted.
pub fn direct_connector(
    serializer: SerializerType,
) -> (DirectConnector, UnboundedReceiver<DirectConnection>) {
    let (acceptor_tx, acceptor_rx) = unbounded_channel();
    (
        DirectConnector {
            serializer,
            acceptor_tx,
        },
        acceptor_rx,
    )
}

#[async_trait]
impl Connector for DirectConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Connection> {
        if !config.serializers.contains(&self.serializer) {
            return Err(ConnectionError::new(format!(
                "router only accepts {}",
                self.serializer.uri()
            ))
            .into());
        }
        let (client, router) = direct_transport_pair();
        self.acceptor_tx
            .send(DirectConnection {
                transport: router,
                serializer: self.serializer,
            })
            .map_err(|_| ConnectionError::new("router is not accepting connections"))?;
        Ok(Connection {
            transport: Box::new(client),
            serializer: self.serializer,
        })
    }
}

#[cfg(test)]
mod direct_connector_test {
    use crate::{
        core::error::ConnectionError,
        peer::{
            config::SessionConfig,
            connector::{
                Connector,
                direct_connector,
            },
        },
        serializer::serializer::SerializerType,
    };

    #[tokio::test]
    async fn hands_router_end_to_acceptor() {
        let (connector, mut acceptor) = direct_connector(SerializerType::MessagePack);
        assert_matches::assert_matches!(connector.connect(&SessionConfig::default()).await, Ok(connection) => {
            assert_eq!(connection.serializer, SerializerType::MessagePack);
        });
        assert_matches::assert_matches!(acceptor.try_recv(), Ok(connection) => {
            assert_eq!(connection.serializer, SerializerType::MessagePack);
        });
    }

    #[tokio::test]
    async fn fails_without_acceptor_or_shared_serializer() {
        let (connector, acceptor) = direct_connector(SerializerType::Json);
        let config = SessionConfig {
            serializers: vec![SerializerType::MessagePack],
            ..Default::default()
        };
        assert_matches::assert_matches!(connector.connect(&config).await, Err(err) => {
            assert!(err.is::<ConnectionError>());
        });
        drop(acceptor);
        assert_matches::assert_matches!(connector.connect(&SessionConfig::default()).await, Err(err) => {
            assert!(err.is::<ConnectionError>());
        });
    }
}
