use anyhow::Result;

use crate::{
    auth::{
        auth_method::AuthMethod,
        wampcra,
    },
    core::{
        error::ProtocolError,
        types::{
            Dictionary,
            List,
            Value,
        },
    },
    message::message::{
        AuthenticateMessage,
        ChallengeMessage,
    },
};

/// A credential a session authenticates with when the router challenges it.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Ticket { id: String, ticket: String },
    WampCra { id: String, secret: String },
}

impl Credential {
    pub fn auth_method(&self) -> AuthMethod {
        match self {
            Self::Ticket { .. } => AuthMethod::Ticket,
            Self::WampCra { .. } => AuthMethod::WampCra,
        }
    }

    /// The authentication ID announced in HELLO.
    pub fn id(&self) -> &str {
        match self {
            Self::Ticket { id, .. } | Self::WampCra { id, .. } => id,
        }
    }

    /// Adds `authmethods` and `authid` to HELLO details.
    pub fn write_hello_details(&self, details: &mut Dictionary) {
        details.insert(
            "authmethods".to_owned(),
            Value::List(List::from_iter([Value::from(self.auth_method().as_str())])),
        );
        details.insert("authid".to_owned(), Value::from(self.id()));
    }

    /// Answers a CHALLENGE for this credential's method.
    pub fn authenticate(&self, challenge: &ChallengeMessage) -> Result<AuthenticateMessage> {
        if challenge.auth_method != self.auth_method().as_str() {
            return Err(ProtocolError::new(format!(
                "challenged with {}, but credential is for {}",
                challenge.auth_method,
                self.auth_method()
            ))
            .into());
        }
        let signature = match self {
            Self::Ticket { ticket, .. } => ticket.clone(),
            Self::WampCra { secret, .. } => wampcra::sign_challenge(secret, &challenge.extra)?,
        };
        Ok(AuthenticateMessage {
            signature,
            extra: Dictionary::default(),
        })
    }
}

/// Secrets are never written to logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("auth_method", &self.auth_method())
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod credential_test {
    use crate::{
        auth::credential::Credential,
        core::{
            error::ProtocolError,
            types::{
                Dictionary,
                Value,
            },
        },
        message::message::ChallengeMessage,
    };

    #[test]
    fn ticket_signature_is_the_ticket() {
        let credential = Credential::Ticket {
            id: "joe".to_owned(),
            ticket: "secret!!!".to_owned(),
        };
        let challenge = ChallengeMessage {
            auth_method: "ticket".to_owned(),
            extra: Dictionary::default(),
        };
        assert_matches::assert_matches!(credential.authenticate(&challenge), Ok(message) => {
            assert_eq!(message.signature, "secret!!!");
        });
    }

    #[test]
    fn rejects_challenge_for_other_method() {
        let credential = Credential::Ticket {
            id: "joe".to_owned(),
            ticket: "secret!!!".to_owned(),
        };
        let challenge = ChallengeMessage {
            auth_method: "wampcra".to_owned(),
            extra: Dictionary::default(),
        };
        assert_matches::assert_matches!(credential.authenticate(&challenge), Err(err) => {
            assert!(err.is::<ProtocolError>());
        });
    }

    #[test]
    fn writes_hello_details_without_secret() {
        let credential = Credential::WampCra {
            id: "peter".to_owned(),
            secret: "secret".to_owned(),
        };
        let mut details = Dictionary::default();
        credential.write_hello_details(&mut details);
        assert_eq!(details.get("authid"), Some(&Value::from("peter")));
        assert_eq!(
            details.get("authmethods"),
            Some(&Value::List(vec![Value::from("wampcra")]))
        );
        assert!(!format!("{credential:?}").contains("secret\""));
    }
}
