use std::fmt::Display;

use crate::core::error::ValidationError;

/// Authentication methods a client can answer a CHALLENGE with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    /// The client sends a shared ticket in the clear.
    Ticket,
    /// WAMP Challenge-Response Authentication.
    ///
    /// The client signs the router's challenge with a shared secret.
    WampCra,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::WampCra => "wampcra",
        }
    }
}

impl Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AuthMethod {
    type Error = ValidationError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ticket" => Ok(Self::Ticket),
            "wampcra" => Ok(Self::WampCra),
            _ => Err(ValidationError::new(format!("invalid auth method: {value}"))),
        }
    }
}
