use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        ClientRequestBuilder,
        http::header::SEC_WEBSOCKET_PROTOCOL,
    },
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
    transport::web_socket_transport::WebSocketTransport,
};

/// Connects to a router over WebSocket.
///
/// Every allowed serializer is offered as a sub-protocol, and the router picks one.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    uri: String,
}

impl WebSocketConnector {
    pub fn new<S>(uri: S) -> Self
    where
        S: Into<String>,
    {
        Self { uri: uri.into() }
    }

    async fn connect_web_socket(&self, config: &SessionConfig) -> Result<Connection> {
        let mut request = ClientRequestBuilder::new(self.uri.as_str().try_into()?);
        if !config.agent.is_empty() {
            request = request.with_header("User-Agent", &config.agent);
        }
        for serializer in &config.serializers {
            request = request.with_sub_protocol(serializer.uri().to_string());
        }
        if let Some(web_socket) = &config.web_socket {
            for (key, value) in &web_socket.headers {
                request = request.with_header(key, value);
            }
        }

        let (stream, response) = connect_async(request).await?;
        let serializer = match response.headers().get(SEC_WEBSOCKET_PROTOCOL) {
            Some(protocol) => SerializerType::try_from(protocol.to_str()?)?,
            None => return Err(Error::msg("handshake did not produce a sub-protocol")),
        };
        Ok(Connection {
            transport: Box::new(WebSocketTransport::new(stream, serializer)),
            serializer,
        })
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &SessionConfig) -> Result<Connection> {
        self.connect_web_socket(config).await.map_err(|err| {
            ConnectionError::new(format!("failed to connect to {}: {err:#}", self.uri)).into()
        })
    }
}

#[cfg(test)]
mod web_socket_connector_test {
    use crate::{
        core::error::ConnectionError,
        peer::{
            config::SessionConfig,
            connector::{
                connector::Connector,
                web_socket_connector::WebSocketConnector,
            },
        },
    };

    #[tokio::test]
    async fn connect_failure_is_connection_error() {
        let config = SessionConfig::default();
        for uri in ["not a uri", "ws://127.0.0.1:1"] {
            assert_matches::assert_matches!(
                WebSocketConnector::new(uri).connect(&config).await,
                Err(err) => {
                    assert_matches::assert_matches!(err.downcast_ref::<ConnectionError>(), Some(_));
                    assert!(err.to_string().contains(uri), "{err}");
                }
            );
        }
    }
}
