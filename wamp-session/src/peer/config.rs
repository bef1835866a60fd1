use std::time::Duration;

use anyhow::Result;

use crate::{
    auth::credential::Credential,
    core::{
        error::ValidationError,
        roles::PeerRole,
        types::{
            HashMap,
            HashSet,
        },
    },
    serializer::serializer::SerializerType,
};

const DEFAULT_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION"));

/// Configuration for WebSocket connections.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConfig {
    /// Additional headers to include in the WebSocket upgrade request.
    pub headers: HashMap<String, String>,
}

/// Configuration for a [`Session`][`crate::peer::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of the session, for logging.
    pub name: String,
    /// Agent name, communicated to the router.
    pub agent: String,
    /// Roles announced to the router.
    pub roles: HashSet<PeerRole>,
    /// Allowed serializers, in order of preference.
    pub serializers: Vec<SerializerType>,
    /// Default deadline for procedure calls.
    pub call_timeout: Duration,
    /// Deadline for every other correlated round trip, including the opening handshake.
    pub handshake_timeout: Duration,
    /// Deadline for the router to echo GOODBYE.
    pub goodbye_timeout: Duration,
    /// Credential used to answer a CHALLENGE.
    pub credential: Option<Credential>,
    /// Additional configuration for WebSocket connections.
    pub web_socket: Option<WebSocketConfig>,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.serializers.is_empty() {
            return Err(ValidationError::new("at least one serializer is required").into());
        }
        if self.roles.is_empty() {
            return Err(ValidationError::new("at least one role is required").into());
        }
        if self.call_timeout.is_zero()
            || self.handshake_timeout.is_zero()
            || self.goodbye_timeout.is_zero()
        {
            return Err(ValidationError::new("timeouts must be positive").into());
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT.to_owned(),
            agent: DEFAULT_AGENT.to_owned(),
            roles: HashSet::from_iter(PeerRole::ALL),
            serializers: vec![SerializerType::Json, SerializerType::MessagePack],
            call_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            goodbye_timeout: Duration::from_secs(5),
            credential: None,
            web_socket: None,
        }
    }
}

#[cfg(test)]
mod config_test {
    use std::time::Duration;

    use crate::{
        core::error::ValidationError,
        peer::config::SessionConfig,
    };

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert_matches::assert_matches!(config.validate(), Ok(()));
        assert_eq!(config.call_timeout, Duration::from_secs(10));
        assert_eq!(config.goodbye_timeout, Duration::from_secs(5));
        assert_eq!(config.roles.len(), 4);
    }

    #[test]
    fn rejects_missing_serializers_and_zero_timeouts() {
        let config = SessionConfig {
            serializers: Vec::new(),
            ..Default::default()
        };
        assert_matches::assert_matches!(config.validate(), Err(err) => {
            assert!(err.is::<ValidationError>());
        });
        let config = SessionConfig {
            call_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_matches::assert_matches!(config.validate(), Err(err) => {
            assert!(err.is::<ValidationError>());
        });
    }
}
