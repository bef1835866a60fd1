use std::time::Duration;

use anyhow::Result;

use crate::{
    core::{
        error::{
            ProcedureNotFoundError,
            ValidationError,
        },
        id::Id,
        types::{
            Dictionary,
            HashSet,
            List,
            Value,
        },
        uri::Uri,
    },
    peer::session::{
        PublishedEvent,
        RpcCall,
        Session,
    },
};

/// A procedure call, built argument by argument.
///
/// ```no_run
/// # async fn example(session: &wamp_session::peer::Session) -> anyhow::Result<()> {
/// use wamp_session::peer::Call;
///
/// let greeting = Call::new("com.example.say_hello")
///     .arg("Simon")
///     .send(session)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Call {
    procedure: String,
    rpc_call: RpcCall,
}

impl Call {
    pub fn new<S>(procedure: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            procedure: procedure.into(),
            rpc_call: RpcCall::default(),
        }
    }

    pub fn arg<V>(mut self, value: V) -> Self
    where
        V: Into<Value>,
    {
        self.rpc_call.arguments.push(value.into());
        self
    }

    pub fn kwarg<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.rpc_call
            .arguments_keyword
            .insert(key.into(), value.into());
        self
    }

    /// Overrides the session's call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.rpc_call.timeout = Some(timeout);
        self
    }

    /// Sends the call and returns the first positional result.
    ///
    /// A result with no positional values produces [`Value::Null`]. An ERROR response fails with
    /// [`RemoteError`][`crate::core::error::RemoteError`].
    pub async fn send(self, session: &Session) -> Result<Value> {
        let result = session.call(&self.procedure, self.rpc_call).await?;
        Ok(result.arguments.into_iter().next().unwrap_or_default())
    }
}

/// A proxy for calling procedures by name, guarded by the names known when it was created.
///
/// The guard is a local convenience. The router remains the authority on which procedures exist.
pub struct Rpc<'s> {
    session: &'s Session,
    procedures: HashSet<Uri>,
}

impl<'s> Rpc<'s> {
    pub fn new(session: &'s Session, procedures: HashSet<Uri>) -> Self {
        Self {
            session,
            procedures,
        }
    }

    /// Procedure names this proxy accepts.
    pub fn procedures(&self) -> &HashSet<Uri> {
        &self.procedures
    }

    /// Starts a call to a known procedure.
    pub fn procedure(&self, name: &str) -> Result<Call> {
        let known = Uri::try_from(name)
            .map(|uri| self.procedures.contains(&uri))
            .unwrap_or(false);
        if !known {
            return Err(ProcedureNotFoundError::new(name).into());
        }
        Ok(Call::new(name))
    }

    /// Calls a known procedure and returns its first positional result.
    pub async fn call(
        &self,
        name: &str,
        arguments: List,
        arguments_keyword: Dictionary,
    ) -> Result<Value> {
        let mut call = self.procedure(name)?;
        call.rpc_call.arguments = arguments;
        call.rpc_call.arguments_keyword = arguments_keyword;
        call.send(self.session).await
    }
}

/// An event publication, built argument by argument.
///
/// Events carry keyword arguments only. Sending fails with a [`ValidationError`] if any positional
/// argument was added or if no keyword argument was.
#[derive(Debug, Clone)]
pub struct Publish {
    topic: String,
    event: PublishedEvent,
}

impl Publish {
    pub fn new<S>(topic: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            topic: topic.into(),
            event: PublishedEvent::default(),
        }
    }

    pub fn arg<V>(mut self, value: V) -> Self
    where
        V: Into<Value>,
    {
        self.event.arguments.push(value.into());
        self
    }

    pub fn kwarg<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.event
            .arguments_keyword
            .insert(key.into(), value.into());
        self
    }

    /// Waits for the router to confirm the publication.
    pub fn acknowledge(mut self, acknowledge: bool) -> Self {
        self.event.acknowledge = acknowledge;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.event.arguments.is_empty() {
            return Err(ValidationError::new(format!(
                "cannot publish positional arguments to {}",
                self.topic
            ))
            .into());
        }
        if self.event.arguments_keyword.is_empty() {
            return Err(ValidationError::new(format!(
                "publication to {} has no payload",
                self.topic
            ))
            .into());
        }
        Ok(())
    }

    /// Publishes the event.
    ///
    /// Returns the publication ID if the publication was acknowledged.
    pub async fn send(self, session: &Session) -> Result<Option<Id>> {
        self.validate()?;
        session.publish(&self.topic, self.event).await
    }
}

#[cfg(test)]
mod proxy_test {
    use assert_matches::assert_matches;

    use crate::{
        core::{
            error::{
                ProcedureNotFoundError,
                ValidationError,
            },
            types::HashSet,
            uri::Uri,
        },
        peer::{
            config::SessionConfig,
            connector::direct_connector,
            proxy::{
                Publish,
                Rpc,
            },
            session::Session,
        },
        serializer::serializer::SerializerType,
    };

    fn session() -> Session {
        let (connector, _) = direct_connector(SerializerType::Json);
        Session::new(SessionConfig::default(), Box::new(connector)).unwrap()
    }

    #[test]
    fn publish_requires_keyword_payload_only() {
        assert_matches!(
            Publish::new("foo").validate().unwrap_err().downcast::<ValidationError>(),
            Ok(_)
        );
        assert_matches!(
            Publish::new("foo")
                .arg("foobar")
                .kwarg("message", "foobar")
                .validate()
                .unwrap_err()
                .downcast::<ValidationError>(),
            Ok(_)
        );
        assert_matches!(Publish::new("foo").kwarg("message", "foobar").validate(), Ok(()));
    }

    #[test]
    fn rpc_rejects_unknown_procedures() {
        let session = session();
        let rpc = Rpc::new(
            &session,
            HashSet::from_iter([Uri::try_from("say_hello").unwrap()]),
        );
        assert_matches!(rpc.procedure("say_hello"), Ok(_));
        assert_matches!(
            rpc.procedure("say_goodbye").unwrap_err().downcast::<ProcedureNotFoundError>(),
            Ok(err) => {
                pretty_assertions::assert_eq!(err.to_string(), "procedure say_goodbye is not registered");
            }
        );
        assert_matches!(
            rpc.procedure("not a uri").unwrap_err().downcast::<ProcedureNotFoundError>(),
            Ok(_)
        );
    }
}
