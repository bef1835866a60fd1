use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::{
    Context,
    Result,
};
use log::{
    debug,
    info,
    warn,
};
use tokio::sync::{
    Mutex,
    oneshot,
};

use crate::{
    core::{
        close::CloseReason,
        error::{
            ConnectionError,
            ProtocolError,
            RemoteError,
            SessionError,
            TimeoutError,
            ValidationError,
        },
        id::{
            Id,
            IdAllocator,
            RandomIdAllocator,
        },
        invocation_policy::InvocationPolicy,
        roles::{
            RouterRole,
            roles_details,
            router_roles_from_details,
        },
        service::{
            Service,
            ServiceHandle,
        },
        types::{
            Dictionary,
            HashMap,
            List,
            Value,
        },
        uri::Uri,
    },
    message::{
        common::{
            abort_message,
            goodbye_with_close_reason,
        },
        message::{
            CallMessage,
            ErrorMessage,
            HelloMessage,
            Message,
            Payload,
            PublishMessage,
            RegisterMessage,
            SubscribeMessage,
            UnregisterMessage,
            UnsubscribeMessage,
        },
    },
    peer::{
        config::SessionConfig,
        connector::Connector,
        dispatcher::Dispatcher,
        handler::{
            Procedure,
            Subscription,
        },
        state::{
            PendingHandler,
            PendingRequest,
            SessionState,
            SharedState,
        },
    },
    serializer::serializer::new_serializer,
};

/// Information about a session, as given by the router in WELCOME.
#[derive(Debug, Clone, PartialEq)]
pub struct WelcomeInfo {
    pub session_id: Id,
    pub realm: Uri,
    pub details: Dictionary,
    pub router_roles: Vec<RouterRole>,
}

/// Options for registering a procedure.
#[derive(Debug, Default, Clone)]
pub struct ProcedureOptions {
    /// How the router selects a callee when the procedure is registered more than once.
    pub invocation_policy: InvocationPolicy,
}

/// A procedure call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcCall {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    /// Overrides the configured call timeout.
    pub timeout: Option<Duration>,
}

/// A result of a procedure call.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RpcResult {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    pub details: Dictionary,
}

/// An event to publish.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PublishedEvent {
    pub arguments: List,
    pub arguments_keyword: Dictionary,
    /// Waits for the router to confirm the publication.
    pub acknowledge: bool,
}

fn parse_uri(value: &str) -> Result<Uri> {
    Uri::try_from(value).map_err(|err| ValidationError::new(err.to_string()).into())
}

fn error_message(error: &ErrorMessage) -> String {
    error
        .details
        .get("message")
        .and_then(|value| value.as_str())
        .or_else(|| {
            error
                .payload
                .arguments()
                .first()
                .and_then(|value| value.as_str())
        })
        .unwrap_or_default()
        .to_owned()
}

fn remote_error(error: ErrorMessage) -> RemoteError {
    let (arguments, arguments_keyword) = error.payload.into_parts();
    RemoteError {
        error: error.error,
        details: error.details,
        arguments,
        arguments_keyword,
    }
}

fn rejected(request: &str, target: &str, error: &ErrorMessage) -> ProtocolError {
    ProtocolError::new(format!(
        "router rejected {request} for {target}: {} {}",
        error.error,
        error_message(error)
    ))
}

fn unexpected_response(request: &str, response: &Message) -> ProtocolError {
    ProtocolError::new(format!(
        "{} does not answer {request}",
        response.message_name()
    ))
}

/// A WAMP session with a router.
///
/// The session owns one connection at a time. A spawned service task reads every message from
/// the connection and dispatches it; the methods here send requests and wait for their
/// correlated responses.
pub struct Session {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    id_allocator: Box<dyn IdAllocator>,
    state: Arc<Mutex<SharedState>>,
    service: Mutex<Option<ServiceHandle>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a new session, which is not yet connected.
    pub fn new(config: SessionConfig, connector: Box<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            id_allocator: Box::new(RandomIdAllocator::default()),
            state: Arc::new(Mutex::new(SharedState::default())),
            service: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The session ID, assigned by the router, if the session is active.
    pub async fn session_id(&self) -> Option<Id> {
        self.state.lock().await.session_id
    }

    /// The realm the session is active on.
    pub async fn realm(&self) -> Option<Uri> {
        let state = self.state.lock().await;
        match state.state {
            SessionState::Active => state.realm.clone(),
            _ => None,
        }
    }

    /// Checks if the session is active.
    pub async fn active(&self) -> bool {
        self.state.lock().await.state == SessionState::Active
    }

    /// The current state of the connection.
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.state
    }

    /// Confirmed registrations, by registration ID.
    pub async fn registrations(&self) -> HashMap<Id, Uri> {
        self.state
            .lock()
            .await
            .registrations
            .iter()
            .map(|(id, entry)| (*id, entry.procedure.clone()))
            .collect()
    }

    /// Confirmed subscriptions, by subscription ID.
    pub async fn subscriptions(&self) -> HashMap<Id, Uri> {
        self.state
            .lock()
            .await
            .subscriptions
            .iter()
            .map(|(id, entry)| (*id, entry.topic.clone()))
            .collect()
    }

    /// Opens a connection and joins the realm.
    ///
    /// A CHALLENGE is answered with the configured credential. Fails with
    /// [`SessionError::Aborted`] if the router rejects the session.
    pub async fn begin(&self, realm: &str) -> Result<WelcomeInfo> {
        let realm = parse_uri(realm)?;
        {
            let mut state = self.state.lock().await;
            if state.state != SessionState::Disconnected {
                return Err(SessionError::AlreadyActive.into());
            }
            state.transition(SessionState::Connecting)?;
            state.connection += 1;
            state.realm = Some(realm.clone());
        }
        match self.establish(realm).await {
            Ok(welcome) => {
                info!(
                    "Session {} joined realm {} as {}",
                    self.config.name, welcome.realm, welcome.session_id
                );
                Ok(welcome)
            }
            Err(err) => {
                self.teardown().await;
                Err(err)
            }
        }
    }

    async fn establish(&self, realm: Uri) -> Result<WelcomeInfo> {
        let connection = self.connector.connect(&self.config).await?;
        debug!(
            "Session {} connected with serializer {}",
            self.config.name,
            connection.serializer.uri()
        );

        let service = Service::new(
            self.config.name.clone(),
            connection.transport,
            new_serializer(connection.serializer),
        );
        let message_tx = service.message_tx();
        let dispatcher = {
            let mut state = self.state.lock().await;
            state.message_tx = Some(message_tx.clone());
            Dispatcher::new(
                self.config.name.clone(),
                state.connection,
                self.state.clone(),
                message_tx,
            )
        };
        *self.service.lock().await = Some(service.start(Box::new(dispatcher)));

        let mut details = Dictionary::from_iter([
            ("agent".to_owned(), Value::from(self.config.agent.as_str())),
            ("roles".to_owned(), roles_details(&self.config.roles)),
        ]);
        if let Some(credential) = &self.config.credential {
            credential.write_hello_details(&mut details);
        }
        let mut reply = self
            .handshake(Message::Hello(HelloMessage {
                realm: realm.clone(),
                details,
            }))
            .await?;
        loop {
            match reply {
                Message::Welcome(welcome) => {
                    let router_roles = router_roles_from_details(&welcome.details);
                    return Ok(WelcomeInfo {
                        session_id: welcome.session,
                        realm,
                        details: welcome.details,
                        router_roles,
                    });
                }
                Message::Abort(abort) => {
                    let message = abort
                        .details
                        .get("message")
                        .and_then(|value| value.as_str())
                        .unwrap_or_default()
                        .to_owned();
                    return Err(SessionError::Aborted {
                        reason: abort.reason,
                        message,
                    }
                    .into());
                }
                Message::Challenge(challenge) => {
                    let credential = self.config.credential.as_ref().filter(|credential| {
                        credential.auth_method().as_str() == challenge.auth_method
                    });
                    let credential = match credential {
                        Some(credential) => credential,
                        None => {
                            self.send(abort_message(
                                Uri::from_known("wamp.error.cannot_authenticate"),
                                &format!("no credential for {}", challenge.auth_method),
                            ))
                            .await
                            .ok();
                            return Err(SessionError::ChallengeUnanswered(challenge.auth_method).into());
                        }
                    };
                    let authenticate = match credential.authenticate(&challenge) {
                        Ok(authenticate) => authenticate,
                        Err(err) => {
                            self.send(abort_message(
                                Uri::from_known("wamp.error.cannot_authenticate"),
                                &err.to_string(),
                            ))
                            .await
                            .ok();
                            return Err(err);
                        }
                    };
                    reply = self.handshake(Message::Authenticate(authenticate)).await?;
                }
                message => return Err(unexpected_response("HELLO", &message).into()),
            }
        }
    }

    /// Sends a session-level message and waits for the next one from the router.
    async fn handshake(&self, message: Message) -> Result<Message> {
        let name = message.message_name();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.state.lock().await.handshake_tx = Some(reply_tx);
        self.send(message).await?;
        match tokio::time::timeout(self.config.handshake_timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ConnectionError::new(format!(
                "connection closed while waiting for reply to {name}"
            ))
            .into()),
            Err(_) => Err(TimeoutError::new(name, self.config.handshake_timeout).into()),
        }
    }

    /// Leaves the realm with a GOODBYE round trip, then closes the connection.
    ///
    /// The router must echo GOODBYE with the same reason or `wamp.close.goodbye_and_out`.
    /// Otherwise, this fails with a protocol error. The session is closed either way.
    pub async fn end(&self, reason: CloseReason) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            if state.state != SessionState::Active {
                return Err(SessionError::NotActive.into());
            }
            state.transition(SessionState::Closing)?;
            state.handshake_tx = Some(reply_tx);
        }
        let result = match self.send(goodbye_with_close_reason(reason)).await {
            Ok(()) => self.wait_for_goodbye(reason, reply_rx).await,
            Err(err) => Err(err),
        };
        self.teardown().await;
        match &result {
            Ok(()) => info!("Session {} left realm", self.config.name),
            Err(err) => warn!(
                "Session {} did not close cleanly: {err:#}",
                self.config.name
            ),
        }
        result
    }

    async fn wait_for_goodbye(
        &self,
        reason: CloseReason,
        reply_rx: oneshot::Receiver<Message>,
    ) -> Result<()> {
        match tokio::time::timeout(self.config.goodbye_timeout, reply_rx).await {
            Ok(Ok(Message::Goodbye(goodbye))) => {
                if reason.accepts_echo(&goodbye.reason) {
                    Ok(())
                } else {
                    Err(ProtocolError::new(format!(
                        "router echoed GOODBYE with {}, expected {}",
                        goodbye.reason,
                        reason.uri()
                    ))
                    .into())
                }
            }
            Ok(Ok(message)) => Err(unexpected_response("GOODBYE", &message).into()),
            Ok(Err(_)) => Err(ProtocolError::new(
                "connection closed before the router echoed GOODBYE",
            )
            .into()),
            Err(_) => Err(ProtocolError::new(format!(
                "router did not echo GOODBYE within {:?}",
                self.config.goodbye_timeout
            ))
            .into()),
        }
    }

    /// Stops the service and clears all connection state.
    async fn teardown(&self) {
        if let Some(service) = self.service.lock().await.take() {
            service.cancel();
            if let Err(err) = service.join().await {
                warn!(
                    "Session {} service did not stop cleanly: {err:#}",
                    self.config.name
                );
            }
        }
        self.state.lock().await.reset();
    }

    async fn send(&self, message: Message) -> Result<()> {
        let message_tx = self
            .state
            .lock()
            .await
            .message_tx
            .clone()
            .ok_or_else(|| ConnectionError::new("session has no connection"))?;
        message_tx
            .send(message)
            .map_err(|_| ConnectionError::new("connection is closed").into())
    }

    async fn ensure_active(&self) -> Result<()> {
        if self.active().await {
            Ok(())
        } else {
            Err(SessionError::NotActive.into())
        }
    }

    /// Generates a request ID that is not in use by any outstanding request.
    pub async fn next_request_id(&self) -> Id {
        let state = self.state.lock().await;
        self.allocate_request_id(&state).await
    }

    async fn allocate_request_id(&self, state: &SharedState) -> Id {
        loop {
            let id = self.id_allocator.generate_id().await;
            if state.request_id_available(id) {
                return id;
            }
        }
    }

    /// Sends a request and waits for the response correlated with its request ID.
    ///
    /// Fails with a [`TimeoutError`] if no response arrives in time; a response arriving later is
    /// dropped.
    pub async fn send_and_wait(&self, message: Message, timeout: Duration) -> Result<Message> {
        let request = message.request_id().ok_or_else(|| {
            ValidationError::new(format!(
                "{} is not a correlated request",
                message.message_name()
            ))
        })?;
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            if state.state != SessionState::Active {
                return Err(SessionError::NotActive.into());
            }
            if !state.request_id_available(request) {
                return Err(
                    ProtocolError::new(format!("request {request} is already pending")).into(),
                );
            }
            state.pending.insert(
                request,
                PendingRequest {
                    request: message.clone(),
                    handler: None,
                    reply_tx,
                },
            );
        }
        self.complete_round_trip(request, message, reply_rx, timeout)
            .await
    }

    /// Builds a request with a fresh request ID and waits for its response.
    async fn round_trip<F>(
        &self,
        build: F,
        handler: Option<PendingHandler>,
        timeout: Duration,
    ) -> Result<Message>
    where
        F: FnOnce(Id) -> Message,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let (request, message) = {
            let mut state = self.state.lock().await;
            if state.state != SessionState::Active {
                return Err(SessionError::NotActive.into());
            }
            let request = self.allocate_request_id(&state).await;
            let message = build(request);
            state.pending.insert(
                request,
                PendingRequest {
                    request: message.clone(),
                    handler,
                    reply_tx,
                },
            );
            (request, message)
        };
        self.complete_round_trip(request, message, reply_rx, timeout)
            .await
    }

    async fn complete_round_trip(
        &self,
        request: Id,
        message: Message,
        mut reply_rx: oneshot::Receiver<Message>,
        timeout: Duration,
    ) -> Result<Message> {
        let name = message.message_name();
        if let Err(err) = self.send(message).await {
            self.state.lock().await.pending.remove(&request);
            return Err(err);
        }
        match tokio::time::timeout(timeout, &mut reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ConnectionError::new(format!(
                "session ended before {name} {request} was answered"
            ))
            .into()),
            Err(_) => {
                let abandoned = self.state.lock().await.abandon(request);
                if !abandoned {
                    // The response was delivered while the lock was contended.
                    if let Ok(reply) = reply_rx.try_recv() {
                        return Ok(reply);
                    }
                }
                Err(TimeoutError::new(format!("{name} {request}"), timeout).into())
            }
        }
    }

    /// Registers a procedure with default options.
    pub async fn register(&self, procedure: &str, handler: Arc<dyn Procedure>) -> Result<Id> {
        self.register_with_options(procedure, ProcedureOptions::default(), handler)
            .await
    }

    /// Registers a procedure.
    ///
    /// Invocations are routed to the handler once the router confirms the registration.
    pub async fn register_with_options(
        &self,
        procedure: &str,
        options: ProcedureOptions,
        handler: Arc<dyn Procedure>,
    ) -> Result<Id> {
        let procedure = parse_uri(procedure)?;
        let request_options = Dictionary::from_iter([(
            "invoke".to_owned(),
            Value::from(options.invocation_policy.as_str()),
        )]);
        let reply = self
            .round_trip(
                |request| {
                    Message::Register(RegisterMessage {
                        request,
                        options: request_options,
                        procedure: procedure.clone(),
                    })
                },
                Some(PendingHandler::Procedure {
                    procedure: procedure.clone(),
                    handler,
                }),
                self.config.handshake_timeout,
            )
            .await
            .with_context(|| format!("failed to register {procedure}"))?;
        match reply {
            Message::Registered(registered) => {
                debug!(
                    "Session {} registered {procedure} as {}",
                    self.config.name, registered.registration
                );
                Ok(registered.registration)
            }
            Message::Error(error) => {
                Err(rejected("REGISTER", procedure.as_ref(), &error).into())
            }
            message => Err(unexpected_response("REGISTER", &message).into()),
        }
    }

    /// Removes a registration.
    pub async fn unregister(&self, registration: Id) -> Result<()> {
        let reply = self
            .round_trip(
                |request| {
                    Message::Unregister(UnregisterMessage {
                        request,
                        registered_registration: registration,
                    })
                },
                None,
                self.config.handshake_timeout,
            )
            .await?;
        match reply {
            Message::Unregistered(_) => Ok(()),
            Message::Error(error) => {
                Err(rejected("UNREGISTER", &registration.to_string(), &error).into())
            }
            message => Err(unexpected_response("UNREGISTER", &message).into()),
        }
    }

    /// Subscribes to a topic.
    ///
    /// Subscribing to the same topic more than once shares one subscription ID, and every
    /// handler receives each event.
    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn Subscription>) -> Result<Id> {
        let topic = parse_uri(topic)?;
        let reply = self
            .round_trip(
                |request| {
                    Message::Subscribe(SubscribeMessage {
                        request,
                        options: Dictionary::default(),
                        topic: topic.clone(),
                    })
                },
                Some(PendingHandler::Subscription {
                    topic: topic.clone(),
                    handler,
                }),
                self.config.handshake_timeout,
            )
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
        match reply {
            Message::Subscribed(subscribed) => {
                debug!(
                    "Session {} subscribed to {topic} as {}",
                    self.config.name, subscribed.subscription
                );
                Ok(subscribed.subscription)
            }
            Message::Error(error) => Err(rejected("SUBSCRIBE", topic.as_ref(), &error).into()),
            message => Err(unexpected_response("SUBSCRIBE", &message).into()),
        }
    }

    /// Removes a subscription, along with all of its handlers.
    pub async fn unsubscribe(&self, subscription: Id) -> Result<()> {
        let reply = self
            .round_trip(
                |request| {
                    Message::Unsubscribe(UnsubscribeMessage {
                        request,
                        subscribed_subscription: subscription,
                    })
                },
                None,
                self.config.handshake_timeout,
            )
            .await?;
        match reply {
            Message::Unsubscribed(_) => Ok(()),
            Message::Error(error) => {
                Err(rejected("UNSUBSCRIBE", &subscription.to_string(), &error).into())
            }
            message => Err(unexpected_response("UNSUBSCRIBE", &message).into()),
        }
    }

    /// Calls a procedure and waits for its result.
    ///
    /// An ERROR from the router or callee fails with [`RemoteError`].
    pub async fn call(&self, procedure: &str, rpc_call: RpcCall) -> Result<RpcResult> {
        let procedure = parse_uri(procedure)?;
        let timeout = rpc_call.timeout.unwrap_or(self.config.call_timeout);
        let options = Dictionary::from_iter([(
            "timeout".to_owned(),
            Value::Integer(timeout.as_millis().try_into().unwrap_or(i64::MAX)),
        )]);
        let payload = Payload::new(rpc_call.arguments, rpc_call.arguments_keyword);
        let reply = self
            .round_trip(
                |request| {
                    Message::Call(CallMessage {
                        request,
                        options,
                        procedure,
                        payload,
                    })
                },
                None,
                timeout,
            )
            .await?;
        match reply {
            Message::Result(result) => {
                let (arguments, arguments_keyword) = result.payload.into_parts();
                Ok(RpcResult {
                    arguments,
                    arguments_keyword,
                    details: result.details,
                })
            }
            Message::Error(error) => Err(remote_error(error).into()),
            message => Err(unexpected_response("CALL", &message).into()),
        }
    }

    /// Publishes an event to a topic.
    ///
    /// Without acknowledgement, returns as soon as the event is queued. With acknowledgement,
    /// waits for the router to confirm and returns the publication ID.
    pub async fn publish(&self, topic: &str, event: PublishedEvent) -> Result<Option<Id>> {
        let topic = parse_uri(topic)?;
        let payload = Payload::new(event.arguments, event.arguments_keyword);
        if !event.acknowledge {
            self.ensure_active().await?;
            let request = self.next_request_id().await;
            self.send(Message::Publish(PublishMessage {
                request,
                options: Dictionary::default(),
                topic,
                payload,
            }))
            .await?;
            return Ok(None);
        }

        let options = Dictionary::from_iter([("acknowledge".to_owned(), Value::Bool(true))]);
        let reply = self
            .round_trip(
                |request| {
                    Message::Publish(PublishMessage {
                        request,
                        options,
                        topic,
                        payload,
                    })
                },
                None,
                self.config.handshake_timeout,
            )
            .await?;
        match reply {
            Message::Published(published) => Ok(Some(published.publication)),
            Message::Error(error) => Err(remote_error(error).into()),
            message => Err(unexpected_response("PUBLISH", &message).into()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(service) = self.service.get_mut() {
            service.abort();
        }
    }
}
