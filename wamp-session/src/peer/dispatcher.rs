use std::{
    any::Any,
    ops::ControlFlow,
    panic::AssertUnwindSafe,
    sync::Arc,
};

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use futures_util::FutureExt;
use log::{
    debug,
    error,
    info,
    warn,
};
use tokio::sync::{
    Mutex,
    mpsc::{
        UnboundedSender,
        unbounded_channel,
    },
};

use crate::{
    core::{
        error::ProtocolError,
        id::Id,
        service::MessageHandler,
        types::{
            Dictionary,
            Value,
        },
    },
    message::{
        common::{
            error_for_invocation,
            goodbye_and_out,
            no_such_registration,
        },
        message::{
            EventMessage,
            InvocationMessage,
            Message,
            Payload,
            YieldMessage,
        },
    },
    peer::{
        handler::{
            Event,
            Invocation,
        },
        state::{
            EventDelivery,
            PendingHandler,
            RegistrationEntry,
            SessionState,
            SharedState,
            SubscriptionEntry,
        },
    },
};

/// Keyword argument injected into every event, describing the subscription it arrived on.
pub const EVENT_METADATA_KEY: &str = "_meta";

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Routes every message received on a session's connection.
///
/// Responses are correlated with pending requests, invocations are run on their own tasks, and
/// events are handed to subscription handlers in order.
pub(crate) struct Dispatcher {
    name: String,
    connection: u64,
    state: Arc<Mutex<SharedState>>,
    message_tx: UnboundedSender<Message>,
}

impl Dispatcher {
    pub fn new(
        name: String,
        connection: u64,
        state: Arc<Mutex<SharedState>>,
        message_tx: UnboundedSender<Message>,
    ) -> Self {
        Self {
            name,
            connection,
            state,
            message_tx,
        }
    }

    fn send(&self, message: Message) {
        if let Err(err) = self.message_tx.send(message) {
            warn!(
                "Session {} could not send {}: connection is closed",
                self.name,
                err.0.message_name()
            );
        }
    }

    async fn handle_session_message(&mut self, message: Message) -> ControlFlow<()> {
        let mut state = self.state.lock().await;
        match (state.state, &message) {
            (SessionState::Active, Message::Goodbye(goodbye)) => {
                info!(
                    "Session {} closed by router: {}",
                    self.name, goodbye.reason
                );
                self.send(goodbye_and_out());
                state.reset();
                return ControlFlow::Break(());
            }
            (SessionState::Active, Message::Abort(abort)) => {
                error!("Session {} aborted by router: {}", self.name, abort.reason);
                state.reset();
                return ControlFlow::Break(());
            }
            (SessionState::Connecting, Message::Welcome(welcome)) => {
                if let Err(err) = state.transition(SessionState::Active) {
                    error!("Session {} cannot accept WELCOME: {err:#}", self.name);
                    return ControlFlow::Continue(());
                }
                state.session_id = Some(welcome.session);
            }
            (SessionState::Connecting, Message::Challenge(_) | Message::Abort(_))
            | (SessionState::Closing, Message::Goodbye(_) | Message::Abort(_)) => (),
            (current, _) => {
                warn!(
                    "Session {} dropped {}: {:#}",
                    self.name,
                    message.message_name(),
                    Error::from(ProtocolError::new(format!(
                        "unexpected while session is {current:?}"
                    )))
                );
                return ControlFlow::Continue(());
            }
        }

        let ends_connection = matches!(message, Message::Goodbye(_) | Message::Abort(_));
        match state.handshake_tx.take() {
            Some(handshake_tx) => {
                handshake_tx.send(message).ok();
            }
            None => debug!(
                "Session {} dropped {} with no one waiting for it",
                self.name,
                message.message_name()
            ),
        }
        if ends_connection {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    async fn handle_response(&mut self, message: Message) {
        let request_id = match message.request_id() {
            Some(request_id) => request_id,
            None => return,
        };
        let mut state = self.state.lock().await;
        let pending = match state.pending.remove(&request_id) {
            Some(pending) => pending,
            None => {
                if state.forget_abandoned(request_id) {
                    debug!(
                        "Session {} dropped late {} for request {request_id}",
                        self.name,
                        message.message_name()
                    );
                } else {
                    warn!(
                        "Session {} dropped {}: {:#}",
                        self.name,
                        message.message_name(),
                        Error::from(ProtocolError::new(format!(
                            "no pending request {request_id}"
                        )))
                    );
                }
                return;
            }
        };

        if !pending.answered_by(&message) {
            warn!(
                "Session {} dropped {}: {:#}",
                self.name,
                message.message_name(),
                Error::from(ProtocolError::new(format!(
                    "request {request_id} is a {}, which this message does not answer",
                    pending.request.message_name()
                )))
            );
            // The waiter stays pending for a valid response.
            state.pending.insert(request_id, pending);
            return;
        }

        match (&message, &pending.request, pending.handler) {
            (
                Message::Registered(registered),
                _,
                Some(PendingHandler::Procedure { procedure, handler }),
            ) => {
                state.registrations.insert(
                    registered.registration,
                    RegistrationEntry { procedure, handler },
                );
            }
            (
                Message::Subscribed(subscribed),
                _,
                Some(PendingHandler::Subscription { topic, handler }),
            ) => {
                state
                    .subscriptions
                    .entry(subscribed.subscription)
                    .or_insert_with(|| SubscriptionEntry {
                        topic,
                        handlers: Vec::new(),
                        event_tx: spawn_event_delivery(
                            self.name.clone(),
                            subscribed.subscription,
                        ),
                    })
                    .handlers
                    .push(handler);
            }
            (Message::Unregistered(_), Message::Unregister(request), _) => {
                state.registrations.remove(&request.registered_registration);
            }
            (Message::Unsubscribed(_), Message::Unsubscribe(request), _) => {
                state.subscriptions.remove(&request.subscribed_subscription);
            }
            _ => (),
        }

        // Delivered under the lock, so a timed-out waiter sees either the response or no entry.
        if pending.reply_tx.send(message).is_err() {
            debug!(
                "Session {} dropped response for request {request_id}: waiter is gone",
                self.name
            );
        }
    }

    async fn handle_invocation(&mut self, message: InvocationMessage) {
        let registration = {
            let state = self.state.lock().await;
            state
                .registrations
                .get(&message.registered_registration)
                .map(|entry| (entry.procedure.clone(), entry.handler.clone()))
        };
        let (procedure, handler) = match registration {
            Some(registration) => registration,
            None => {
                warn!(
                    "Session {} received INVOCATION for unknown registration {}",
                    self.name, message.registered_registration
                );
                self.send(no_such_registration(
                    message.request,
                    message.registered_registration,
                ));
                return;
            }
        };

        let (arguments, arguments_keyword) = message.payload.into_parts();
        let invocation = Invocation {
            id: message.request,
            registration: message.registered_registration,
            procedure,
            details: message.details,
            arguments,
            arguments_keyword,
        };
        let name = self.name.clone();
        let message_tx = self.message_tx.clone();
        tokio::spawn(async move {
            let request = invocation.id;
            let procedure = invocation.procedure.clone();
            let call_arguments = invocation.arguments.clone();
            let call_arguments_keyword = invocation.arguments_keyword.clone();
            let result = match AssertUnwindSafe(handler.invoke(invocation))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(Error::msg(format!(
                    "procedure panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            let reply = match result {
                Ok(value) => Message::Yield(YieldMessage {
                    invocation_request: request,
                    options: Dictionary::default(),
                    payload: Payload::Arguments(vec![value]),
                }),
                Err(err) => {
                    warn!("Session {name} procedure {procedure} failed: {err:#}");
                    error_for_invocation(request, &err, call_arguments, call_arguments_keyword)
                }
            };
            if message_tx.send(reply).is_err() {
                warn!(
                    "Session {name} could not reply to invocation {request} of {procedure}: connection is closed"
                );
            }
        });
    }

    async fn handle_event(&mut self, message: EventMessage) {
        let state = self.state.lock().await;
        let entry = match state.subscriptions.get(&message.subscribed_subscription) {
            Some(entry) => entry,
            None => {
                debug!(
                    "Session {} dropped EVENT for unknown subscription {}",
                    self.name, message.subscribed_subscription
                );
                return;
            }
        };

        let (arguments, mut arguments_keyword) = message.payload.into_parts();
        arguments_keyword.insert(
            EVENT_METADATA_KEY.to_owned(),
            Value::Dictionary(Dictionary::from_iter([
                ("topic".to_owned(), Value::from(entry.topic.as_ref())),
                (
                    "subscription_id".to_owned(),
                    Value::from(message.subscribed_subscription),
                ),
            ])),
        );
        let event = Event {
            topic: entry.topic.clone(),
            subscription: message.subscribed_subscription,
            publication: message.published_publication,
            details: message.details,
            arguments,
            arguments_keyword,
        };
        if entry.event_tx.send((event, entry.handlers.clone())).is_err() {
            warn!(
                "Session {} dropped EVENT for subscription {}: delivery task is gone",
                self.name, message.subscribed_subscription
            );
        }
    }
}

/// Starts the task that runs a subscription's handlers.
///
/// Handlers run off the service task, so they may make requests on the session. Events on one
/// subscription are handled one at a time, in the order they arrived. The task ends once the
/// subscription is removed.
fn spawn_event_delivery(name: String, subscription: Id) -> UnboundedSender<EventDelivery> {
    let (event_tx, mut event_rx) = unbounded_channel::<EventDelivery>();
    tokio::spawn(async move {
        while let Some((event, handlers)) = event_rx.recv().await {
            for handler in handlers {
                let result: Result<()> = match AssertUnwindSafe(handler.handle_event(event.clone()))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => Err(Error::msg(format!(
                        "subscription handler panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                };
                if let Err(err) = result {
                    error!(
                        "Session {name} failed to handle event {} on {}: {err:#}",
                        event.publication, event.topic
                    );
                }
            }
        }
        debug!("Session {name} stopped delivering events for subscription {subscription}");
    });
    event_tx
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle_message(&mut self, message: Message) -> ControlFlow<()> {
        match message {
            Message::Welcome(_) | Message::Challenge(_) | Message::Abort(_) | Message::Goodbye(_) => {
                return self.handle_session_message(message).await;
            }
            Message::Result(_)
            | Message::Error(_)
            | Message::Published(_)
            | Message::Registered(_)
            | Message::Unregistered(_)
            | Message::Subscribed(_)
            | Message::Unsubscribed(_) => self.handle_response(message).await,
            Message::Invocation(message) => self.handle_invocation(message).await,
            Message::Event(message) => self.handle_event(message).await,
            message => warn!(
                "Session {} dropped {}: {:#}",
                self.name,
                message.message_name(),
                Error::from(ProtocolError::new("message is only sent by clients"))
            ),
        }
        ControlFlow::Continue(())
    }

    async fn handle_end(&mut self, result: Result<()>) {
        let mut state = self.state.lock().await;
        if state.connection != self.connection || state.state == SessionState::Disconnected {
            return;
        }
        match result {
            Ok(()) => debug!("Session {} connection ended", self.name),
            Err(err) => error!("Session {} lost connection: {err:#}", self.name),
        }
        state.reset();
    }
}
