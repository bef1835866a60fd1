use std::time::Duration;

use anyhow::Error;
use thiserror::Error;

use crate::core::{
    types::{
        Dictionary,
        List,
        Value,
    },
    uri::Uri,
};

/// A transport-level failure.
///
/// Fatal to the session. Every request waiting on the session fails with this error when the
/// connection is lost.
#[derive(Debug, Error)]
#[error("connection error: {msg}")]
pub struct ConnectionError {
    msg: String,
}

impl ConnectionError {
    pub fn new<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self { msg: msg.into() }
    }
}

/// An error for the session lifecycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The router rejected the session with an ABORT message.
    #[error("session aborted by router ({reason}): {message}")]
    Aborted { reason: Uri, message: String },
    /// The session was used while it was not active.
    #[error("session is not active")]
    NotActive,
    /// The session was started while it was already active or being established.
    #[error("session is already active")]
    AlreadyActive,
    /// The router challenged the session with an authentication method that has no configured
    /// credential.
    #[error("router challenged with auth method {0}, but no matching credential is configured")]
    ChallengeUnanswered(String),
}

/// A malformed or unexpected message shape, code, or sequence.
#[derive(Debug, Error)]
#[error("protocol violation: {msg}")]
pub struct ProtocolError {
    msg: String,
}

impl ProtocolError {
    pub fn new<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self { msg: msg.into() }
    }

    /// The error description, without the common prefix.
    pub fn message(&self) -> &str {
        &self.msg
    }
}

/// A correlated round trip that did not complete within its deadline.
#[derive(Debug, Error)]
#[error("{operation} timed out after {timeout:?}")]
pub struct TimeoutError {
    /// The round trip that timed out, such as `CALL 1234`.
    pub operation: String,
    pub timeout: Duration,
}

impl TimeoutError {
    pub fn new<S>(operation: S, timeout: Duration) -> Self
    where
        S: Into<String>,
    {
        Self {
            operation: operation.into(),
            timeout,
        }
    }
}

/// An application-level ERROR reported by the router or callee in response to a request.
///
/// Carries the error URI and diagnostic arguments verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct RemoteError {
    pub error: Uri,
    pub details: Dictionary,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

impl RemoteError {
    /// The human-readable message, if the remote side included one.
    ///
    /// Looks at the first positional argument, then at the `message` detail.
    pub fn message(&self) -> Option<&str> {
        self.arguments
            .first()
            .and_then(|value| value.as_str())
            .or_else(|| self.details.get("message").and_then(|value| value.as_str()))
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(message) = self.details.get("message").and_then(|value| value.as_str()) {
            // Invocation errors repeat the message as the first argument.
            if self.arguments.first().and_then(|value| value.as_str()) != Some(message) {
                write!(f, ": {message}")?;
            }
        }
        if !self.arguments.is_empty() {
            write!(f, " {}", Value::List(self.arguments.clone()))?;
        }
        if !self.arguments_keyword.is_empty() {
            write!(f, " {}", Value::Dictionary(self.arguments_keyword.clone()))?;
        }
        Ok(())
    }
}

/// A procedure name was not known locally when building an RPC proxy call.
///
/// Distinct from the router reporting `wamp.error.no_such_procedure`.
#[derive(Debug, Error)]
#[error("procedure {procedure} is not registered")]
pub struct ProcedureNotFoundError {
    pub procedure: String,
}

impl ProcedureNotFoundError {
    pub fn new<S>(procedure: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            procedure: procedure.into(),
        }
    }
}

/// Local misuse of an API.
#[derive(Debug, Error)]
#[error("{msg}")]
pub struct ValidationError {
    msg: String,
}

impl ValidationError {
    pub fn new<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self { msg: msg.into() }
    }
}

/// An error a procedure handler can return to control the error URI reported to the caller.
///
/// Any other error returned by a handler is reported as `wamp.error.runtime_error`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct InvocationError {
    pub error: Uri,
    pub message: String,
}

impl InvocationError {
    pub fn new<S>(error: Uri, message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            error,
            message: message.into(),
        }
    }
}

/// The error URI to report for an error produced locally.
pub fn uri_for_error(error: &Error) -> Uri {
    if let Some(error) = error.downcast_ref::<InvocationError>() {
        return error.error.clone();
    }
    if error.is::<ProtocolError>() {
        return Uri::from_known("wamp.error.protocol_violation");
    }
    if error.is::<ValidationError>() {
        return Uri::from_known("wamp.error.invalid_argument");
    }
    Uri::from_known("wamp.error.runtime_error")
}

/// A short name describing the kind of a locally-produced error.
pub fn error_kind(error: &Error) -> &'static str {
    if error.is::<InvocationError>() {
        "InvocationError"
    } else if error.is::<ProtocolError>() {
        "ProtocolError"
    } else if error.is::<ValidationError>() {
        "ValidationError"
    } else if error.is::<TimeoutError>() {
        "TimeoutError"
    } else if error.is::<RemoteError>() {
        "RemoteError"
    } else {
        "Error"
    }
}
