use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::{
    id::Id,
    types::{
        Dictionary,
        List,
        Value,
    },
    uri::Uri,
};

/// An invocation of a procedure registered by this session.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// The INVOCATION request ID, as assigned by the router.
    pub id: Id,
    pub registration: Id,
    pub procedure: Uri,
    pub details: Dictionary,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

impl Invocation {
    /// Looks up an argument that may be passed either positionally or by keyword.
    pub fn argument(&self, index: usize, name: &str) -> Option<&Value> {
        self.arguments
            .get(index)
            .or_else(|| self.arguments_keyword.get(name))
    }

    /// Looks up a string argument that may be passed either positionally or by keyword.
    pub fn str_argument(&self, index: usize, name: &str) -> Option<&str> {
        self.argument(index, name).and_then(|value| value.as_str())
    }
}

/// A procedure that produces a single result for each invocation.
///
/// Each invocation runs on its own task. Returning an error sends ERROR to the caller; return an
/// [`InvocationError`][`crate::core::error::InvocationError`] to choose the error URI.
#[async_trait]
pub trait Procedure: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> Result<Value>;
}

/// An event received for a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: Uri,
    pub subscription: Id,
    pub publication: Id,
    pub details: Dictionary,
    pub arguments: List,
    /// Keyword arguments, including the `_meta` entry describing the subscription.
    pub arguments_keyword: Dictionary,
}

/// A subscription that receives events for a single topic.
///
/// Events are handled in the order they are received, and the session does not process other
/// messages until the handler returns. Errors are logged and otherwise ignored.
#[async_trait]
pub trait Subscription: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<()>;
}

struct ProcedureFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Procedure for ProcedureFn<F>
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn invoke(&self, invocation: Invocation) -> Result<Value> {
        (self.f)(invocation).await
    }
}

/// Wraps an async closure as a [`Procedure`].
pub fn procedure_fn<F, Fut>(f: F) -> Arc<dyn Procedure>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(ProcedureFn { f })
}

struct SubscriptionFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Subscription for SubscriptionFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn handle_event(&self, event: Event) -> Result<()> {
        (self.f)(event).await
    }
}

/// Wraps an async closure as a [`Subscription`].
pub fn subscription_fn<F, Fut>(f: F) -> Arc<dyn Subscription>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(SubscriptionFn { f })
}

#[cfg(test)]
mod handler_test {
    use crate::{
        core::{
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
            uri::Uri,
        },
        peer::handler::{
            Invocation,
            procedure_fn,
        },
    };

    fn invocation(arguments: List, arguments_keyword: Dictionary) -> Invocation {
        Invocation {
            id: Id::default(),
            registration: Id::default(),
            procedure: Uri::try_from("say_greeting").unwrap(),
            details: Dictionary::default(),
            arguments,
            arguments_keyword,
        }
    }

    #[test]
    fn reads_positional_then_keyword_arguments() {
        let invocation = invocation(
            List::from_iter([Value::from("Simon")]),
            Dictionary::from_iter([
                ("name".to_owned(), Value::from("ignored")),
                ("greeting".to_owned(), Value::from("goodbye")),
            ]),
        );
        assert_eq!(invocation.str_argument(0, "name"), Some("Simon"));
        assert_eq!(invocation.str_argument(1, "greeting"), Some("goodbye"));
        assert_eq!(invocation.argument(2, "missing"), None);
    }

    #[tokio::test]
    async fn wraps_closures_as_procedures() {
        let procedure = procedure_fn(|invocation: Invocation| async move {
            Ok::<_, anyhow::Error>(Value::from(format!(
                "Hello {}",
                invocation.str_argument(0, "name").unwrap_or_default()
            )))
        });
        let result = procedure
            .invoke(invocation(
                List::default(),
                Dictionary::from_iter([("name".to_owned(), Value::from("Simon"))]),
            ))
            .await;
        assert_matches::assert_matches!(result, Ok(Value::String(value)) => {
            assert_eq!(value, "Hello Simon");
        });
    }
}
