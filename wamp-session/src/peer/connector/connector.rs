use anyhow::Result;
use async_trait::async_trait;

use crate::{
    peer::config::SessionConfig,
    serializer::serializer::SerializerType,
    transport::transport::Transport,
};

/// A connection to a WAMP router produced by a [`Connector`].
#[derive(Debug)]
pub struct Connection {
    pub transport: Box<dyn Transport>,
    pub serializer: SerializerType,
}

/// A type for opening a connection to a router.
///
/// A connector is reused for every session a client begins.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &SessionConfig) -> Result<Connection>;
}
