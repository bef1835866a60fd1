use std::fmt::Display;

use crate::core::{
    error::ValidationError,
    types::{
        Dictionary,
        Value,
    },
};

/// A role a client peer can take on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Calls procedures.
    Caller,
    /// Registers procedures.
    Callee,
    /// Publishes events to topics.
    Publisher,
    /// Subscribes to topics.
    Subscriber,
}

impl PeerRole {
    pub const ALL: [PeerRole; 4] = [
        PeerRole::Caller,
        PeerRole::Callee,
        PeerRole::Publisher,
        PeerRole::Subscriber,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Callee => "callee",
            Self::Publisher => "publisher",
            Self::Subscriber => "subscriber",
        }
    }
}

impl Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PeerRole {
    type Error = ValidationError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or_else(|| ValidationError::new(format!("invalid peer role: {value}")))
    }
}

/// A role a router can take on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouterRole {
    /// Routes calls.
    Dealer,
    /// Routes events.
    Broker,
}

impl RouterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dealer => "dealer",
            Self::Broker => "broker",
        }
    }
}

impl Display for RouterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RouterRole {
    type Error = ValidationError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "dealer" => Ok(Self::Dealer),
            "broker" => Ok(Self::Broker),
            _ => Err(ValidationError::new(format!("invalid router role: {value}"))),
        }
    }
}

/// Builds the `roles` entry of HELLO details.
///
/// Each role maps to an empty feature dictionary.
pub fn roles_details<'a, I>(roles: I) -> Value
where
    I: IntoIterator<Item = &'a PeerRole>,
{
    Value::Dictionary(
        roles
            .into_iter()
            .map(|role| (role.to_string(), Value::Dictionary(Dictionary::default())))
            .collect(),
    )
}

/// Reads the router roles announced in WELCOME details.
///
/// Unknown roles are ignored.
pub fn router_roles_from_details(details: &Dictionary) -> Vec<RouterRole> {
    let mut roles = details
        .get("roles")
        .and_then(|roles| roles.as_dictionary())
        .map(|roles| {
            roles
                .keys()
                .filter_map(|role| RouterRole::try_from(role.as_str()).ok())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    roles.sort_by_key(|role| role.as_str());
    roles
}

#[cfg(test)]
mod roles_test {
    use crate::core::{
        roles::{
            PeerRole,
            RouterRole,
            roles_details,
            router_roles_from_details,
        },
        types::{
            Dictionary,
            Value,
        },
    };

    #[test]
    fn builds_roles_details() {
        let details = roles_details(&[PeerRole::Caller, PeerRole::Subscriber]);
        assert_matches::assert_matches!(details, Value::Dictionary(roles) => {
            assert_eq!(roles.len(), 2);
            assert!(roles.contains_key("caller"));
            assert!(roles.contains_key("subscriber"));
        });
    }

    #[test]
    fn reads_router_roles() {
        let details = Dictionary::from_iter([(
            "roles".to_owned(),
            Value::Dictionary(Dictionary::from_iter([
                ("dealer".to_owned(), Value::Dictionary(Dictionary::default())),
                ("broker".to_owned(), Value::Dictionary(Dictionary::default())),
                ("mystery".to_owned(), Value::Dictionary(Dictionary::default())),
            ])),
        )]);
        pretty_assertions::assert_eq!(
            router_roles_from_details(&details),
            vec![RouterRole::Broker, RouterRole::Dealer]
        );
    }

    #[test]
    fn parses_peer_roles() {
        assert_matches::assert_matches!(PeerRole::try_from("callee"), Ok(PeerRole::Callee));
        assert_matches::assert_matches!(PeerRole::try_from("dealer"), Err(_));
    }
}
