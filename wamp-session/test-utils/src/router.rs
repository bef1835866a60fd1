use std::sync::Arc;

use anyhow::Result;
use futures_util::{
    SinkExt,
    StreamExt,
};
use log::{
    debug,
    warn,
};
use tokio::{
    sync::{
        Mutex,
        broadcast,
        mpsc::{
            UnboundedReceiver,
            UnboundedSender,
            unbounded_channel,
        },
    },
    task::JoinHandle,
};
use wamp_session::{
    auth::{
        auth_method::AuthMethod,
        wampcra,
    },
    core::{
        id::{
            Id,
            IdAllocator,
            SequentialIdAllocator,
        },
        stream::{
            MessageStream,
            StreamMessage,
        },
        types::{
            Dictionary,
            HashMap,
            HashSet,
            Value,
        },
        uri::Uri,
    },
    message::message::{
        AbortMessage,
        ChallengeMessage,
        ErrorMessage,
        EventMessage,
        GoodbyeMessage,
        InvocationMessage,
        Message,
        MessageCode,
        Payload,
        PublishedMessage,
        RegisteredMessage,
        ResultMessage,
        SubscribedMessage,
        UnregisteredMessage,
        UnsubscribedMessage,
        WelcomeMessage,
    },
    peer::{
        DirectConnection,
        DirectConnector,
        direct_connector,
    },
    serializer::serializer::{
        SerializerType,
        new_serializer,
    },
};

/// How the mock router challenges new sessions.
#[derive(Debug, Clone)]
pub enum MockAuthentication {
    Ticket {
        ticket: String,
    },
    WampCra {
        secret: String,
        /// Salt, iterations, and key length for a derived key.
        salt: Option<(String, u32, usize)>,
    },
}

#[derive(Debug, Clone)]
pub struct MockRouterConfig {
    pub realm: String,
    /// Echo GOODBYE when a session leaves.
    pub echo_goodbye: bool,
    /// Reason used in the GOODBYE echo, instead of `wamp.close.goodbye_and_out`.
    pub goodbye_reason: Option<String>,
    pub authentication: Option<MockAuthentication>,
}

impl Default for MockRouterConfig {
    fn default() -> Self {
        Self {
            realm: "com.example.test".to_owned(),
            echo_goodbye: true,
            goodbye_reason: None,
            authentication: None,
        }
    }
}

struct Registration {
    procedure: Uri,
    session: Id,
}

struct TopicSubscription {
    id: Id,
    sessions: HashSet<Id>,
}

struct PendingInvocation {
    caller: Id,
    call_request: Id,
}

#[derive(Default)]
struct RouterState {
    ids: SequentialIdAllocator,
    sessions: HashMap<Id, UnboundedSender<Message>>,
    registrations: HashMap<Id, Registration>,
    subscriptions: HashMap<Uri, TopicSubscription>,
    invocations: HashMap<Id, PendingInvocation>,
}

impl RouterState {
    fn send_to(&self, session: Id, message: Message) {
        match self.sessions.get(&session) {
            Some(message_tx) => {
                message_tx.send(message).ok();
            }
            None => debug!("Mock router dropped message for closed session {session}"),
        }
    }

    fn remove_session(&mut self, session: Id) {
        self.sessions.remove(&session);
        self.registrations
            .retain(|_, registration| registration.session != session);
        for subscription in self.subscriptions.values_mut() {
            subscription.sessions.remove(&session);
        }
        self.subscriptions
            .retain(|_, subscription| !subscription.sessions.is_empty());
    }
}

fn uri(value: &str) -> Uri {
    Uri::try_from(value).unwrap_or_default()
}

fn error(request_type: MessageCode, request: Id, error: &str) -> Message {
    Message::Error(ErrorMessage {
        request_type,
        request,
        details: Dictionary::default(),
        error: uri(error),
        payload: Payload::Empty,
    })
}

fn abort(reason: &str) -> Message {
    Message::Abort(AbortMessage {
        details: Dictionary::default(),
        reason: uri(reason),
    })
}

enum ConnectionState {
    AwaitingHello,
    AwaitingAuthenticate { expected_signature: String },
    Established { session: Id },
    Closed,
}

/// An in-process router with a dealer and a broker, for exercising sessions end to end.
///
/// Sessions connect through the [`DirectConnector`] returned by [`MockRouter::start`]. Every
/// message is JSON encoded on its way through the transport.
pub struct MockRouter {
    state: Arc<Mutex<RouterState>>,
    disconnect_tx: broadcast::Sender<()>,
    accept_handle: JoinHandle<()>,
}

impl MockRouter {
    pub fn start(config: MockRouterConfig) -> (Self, DirectConnector) {
        let (connector, acceptor_rx) = direct_connector(SerializerType::Json);
        let state = Arc::new(Mutex::new(RouterState::default()));
        let (disconnect_tx, _) = broadcast::channel(1);
        let accept_handle = tokio::spawn(Self::accept(
            config,
            state.clone(),
            disconnect_tx.clone(),
            acceptor_rx,
        ));
        (
            Self {
                state,
                disconnect_tx,
                accept_handle,
            },
            connector,
        )
    }

    /// Drops every open connection without any closing handshake.
    pub fn disconnect_all(&self) {
        self.disconnect_tx.send(()).ok();
    }

    /// Number of sessions currently established.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    /// Procedures currently registered.
    pub async fn procedures(&self) -> HashSet<Uri> {
        self.state
            .lock()
            .await
            .registrations
            .values()
            .map(|registration| registration.procedure.clone())
            .collect()
    }

    async fn accept(
        config: MockRouterConfig,
        state: Arc<Mutex<RouterState>>,
        disconnect_tx: broadcast::Sender<()>,
        mut acceptor_rx: UnboundedReceiver<DirectConnection>,
    ) {
        while let Some(connection) = acceptor_rx.recv().await {
            let connection_handler = ConnectionHandler {
                config: config.clone(),
                state: state.clone(),
                connection: ConnectionState::AwaitingHello,
            };
            tokio::spawn(connection_handler.run(connection, disconnect_tx.subscribe()));
        }
    }
}

impl Drop for MockRouter {
    fn drop(&mut self) {
        self.disconnect_all();
        self.accept_handle.abort();
    }
}

struct ConnectionHandler {
    config: MockRouterConfig,
    state: Arc<Mutex<RouterState>>,
    connection: ConnectionState,
}

impl ConnectionHandler {
    async fn run(
        mut self,
        connection: DirectConnection,
        mut disconnect_rx: broadcast::Receiver<()>,
    ) {
        let mut stream = MessageStream::new(
            Box::new(connection.transport),
            new_serializer(connection.serializer),
        );
        let (message_tx, mut message_rx) = unbounded_channel();
        loop {
            tokio::select! {
                message = stream.next() => {
                    match message {
                        Some(Ok(StreamMessage::Message(message))) => {
                            if let Err(err) = self.handle_message(message, &message_tx).await {
                                warn!("Mock router failed to handle message: {err:#}");
                            }
                        }
                        Some(Ok(_)) => (),
                        Some(Err(_)) | None => break,
                    }
                }
                message = message_rx.recv() => {
                    if let Some(message) = message {
                        if stream.send(StreamMessage::Message(message)).await.is_err() {
                            break;
                        }
                    }
                }
                _ = disconnect_rx.recv() => break,
            }
            if let ConnectionState::Closed = self.connection {
                // Flush the final reply before closing.
                while let Ok(message) = message_rx.try_recv() {
                    stream.send(StreamMessage::Message(message)).await.ok();
                }
                break;
            }
        }
        if let ConnectionState::Established { session } = self.connection {
            self.state.lock().await.remove_session(session);
        }
        stream.close().await.ok();
    }

    async fn handle_message(
        &mut self,
        message: Message,
        message_tx: &UnboundedSender<Message>,
    ) -> Result<()> {
        match (&self.connection, message) {
            (ConnectionState::AwaitingHello, Message::Hello(hello)) => {
                if hello.realm.as_ref() != self.config.realm {
                    message_tx.send(abort("wamp.error.no_such_realm"))?;
                    self.connection = ConnectionState::Closed;
                    return Ok(());
                }
                match self.config.authentication.clone() {
                    None => self.welcome(message_tx).await?,
                    Some(authentication) => {
                        self.challenge(authentication, &hello.details, message_tx)?
                    }
                }
            }
            (
                ConnectionState::AwaitingAuthenticate { expected_signature },
                Message::Authenticate(authenticate),
            ) => {
                if authenticate.signature == *expected_signature {
                    self.welcome(message_tx).await?;
                } else {
                    message_tx.send(abort("wamp.error.authentication_failed"))?;
                    self.connection = ConnectionState::Closed;
                }
            }
            (ConnectionState::AwaitingAuthenticate { .. }, Message::Abort(_))
            | (ConnectionState::AwaitingHello, Message::Abort(_)) => {
                self.connection = ConnectionState::Closed;
            }
            (ConnectionState::Established { session }, message) => {
                let session = *session;
                self.handle_session_message(session, message, message_tx)
                    .await?;
            }
            (_, message) => {
                warn!(
                    "Mock router received unexpected {}",
                    message.message_name()
                );
                message_tx.send(abort("wamp.error.protocol_violation"))?;
                self.connection = ConnectionState::Closed;
            }
        }
        Ok(())
    }

    fn challenge(
        &mut self,
        authentication: MockAuthentication,
        hello_details: &Dictionary,
        message_tx: &UnboundedSender<Message>,
    ) -> Result<()> {
        let auth_method = match &authentication {
            MockAuthentication::Ticket { .. } => AuthMethod::Ticket,
            MockAuthentication::WampCra { .. } => AuthMethod::WampCra,
        };
        let offered = hello_details
            .get("authmethods")
            .and_then(|methods| methods.as_list())
            .is_some_and(|methods| {
                methods
                    .iter()
                    .any(|method| method.as_str() == Some(auth_method.as_str()))
            });
        if !offered {
            debug!("Mock router challenging a session that did not offer {auth_method}");
        }
        let auth_id = hello_details
            .get("authid")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_owned();
        let (extra, expected_signature) = match authentication {
            MockAuthentication::Ticket { ticket } => (Dictionary::default(), ticket),
            MockAuthentication::WampCra { secret, salt } => {
                let challenge = Value::Dictionary(Dictionary::from_iter([
                    ("authid".to_owned(), Value::from(auth_id)),
                    ("authmethod".to_owned(), Value::from(auth_method.as_str())),
                    ("nonce".to_owned(), Value::from("mock-router-nonce")),
                ]))
                .to_string();
                let mut extra =
                    Dictionary::from_iter([("challenge".to_owned(), Value::from(challenge))]);
                if let Some((salt, iterations, key_len)) = salt {
                    extra.insert("salt".to_owned(), Value::from(salt));
                    extra.insert("iterations".to_owned(), Value::from(iterations));
                    extra.insert("keylen".to_owned(), Value::from(key_len as u32));
                }
                let expected_signature = wampcra::sign_challenge(&secret, &extra)?;
                (extra, expected_signature)
            }
        };
        message_tx.send(Message::Challenge(ChallengeMessage {
            auth_method: auth_method.as_str().to_owned(),
            extra,
        }))?;
        self.connection = ConnectionState::AwaitingAuthenticate { expected_signature };
        Ok(())
    }

    async fn welcome(&mut self, message_tx: &UnboundedSender<Message>) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state.ids.generate_id().await;
        state.sessions.insert(session, message_tx.clone());
        message_tx.send(Message::Welcome(WelcomeMessage {
            session,
            details: Dictionary::from_iter([(
                "roles".to_owned(),
                Value::Dictionary(Dictionary::from_iter([
                    ("broker".to_owned(), Value::Dictionary(Dictionary::default())),
                    ("dealer".to_owned(), Value::Dictionary(Dictionary::default())),
                ])),
            )]),
        }))?;
        self.connection = ConnectionState::Established { session };
        Ok(())
    }

    async fn handle_session_message(
        &mut self,
        session: Id,
        message: Message,
        message_tx: &UnboundedSender<Message>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        match message {
            Message::Register(message) => {
                if state
                    .registrations
                    .values()
                    .any(|registration| registration.procedure == message.procedure)
                {
                    message_tx.send(error(
                        MessageCode::Register,
                        message.request,
                        "wamp.error.procedure_already_exists",
                    ))?;
                    return Ok(());
                }
                let registration = state.ids.generate_id().await;
                state.registrations.insert(
                    registration,
                    Registration {
                        procedure: message.procedure,
                        session,
                    },
                );
                message_tx.send(Message::Registered(RegisteredMessage {
                    register_request: message.request,
                    registration,
                }))?;
            }
            Message::Unregister(message) => {
                let owned = state
                    .registrations
                    .get(&message.registered_registration)
                    .is_some_and(|registration| registration.session == session);
                if !owned {
                    message_tx.send(error(
                        MessageCode::Unregister,
                        message.request,
                        "wamp.error.no_such_registration",
                    ))?;
                    return Ok(());
                }
                state.registrations.remove(&message.registered_registration);
                message_tx.send(Message::Unregistered(UnregisteredMessage {
                    unregister_request: message.request,
                }))?;
            }
            Message::Subscribe(message) => {
                let subscription = match state.subscriptions.get_mut(&message.topic) {
                    Some(subscription) => {
                        subscription.sessions.insert(session);
                        subscription.id
                    }
                    None => {
                        let id = state.ids.generate_id().await;
                        state.subscriptions.insert(
                            message.topic,
                            TopicSubscription {
                                id,
                                sessions: HashSet::from_iter([session]),
                            },
                        );
                        id
                    }
                };
                message_tx.send(Message::Subscribed(SubscribedMessage {
                    subscribe_request: message.request,
                    subscription,
                }))?;
            }
            Message::Unsubscribe(message) => {
                let topic = state
                    .subscriptions
                    .iter()
                    .find(|(_, subscription)| {
                        subscription.id == message.subscribed_subscription
                            && subscription.sessions.contains(&session)
                    })
                    .map(|(topic, _)| topic.clone());
                match topic {
                    Some(topic) => {
                        if let Some(subscription) = state.subscriptions.get_mut(&topic) {
                            subscription.sessions.remove(&session);
                            if subscription.sessions.is_empty() {
                                state.subscriptions.remove(&topic);
                            }
                        }
                        message_tx.send(Message::Unsubscribed(UnsubscribedMessage {
                            unsubscribe_request: message.request,
                        }))?;
                    }
                    None => {
                        message_tx.send(error(
                            MessageCode::Unsubscribe,
                            message.request,
                            "wamp.error.no_such_subscription",
                        ))?;
                    }
                }
            }
            Message::Call(message) => {
                let callee = state
                    .registrations
                    .iter()
                    .find(|(_, registration)| registration.procedure == message.procedure)
                    .map(|(id, registration)| (*id, registration.session));
                let (registration, callee) = match callee {
                    Some(callee) => callee,
                    None => {
                        message_tx.send(error(
                            MessageCode::Call,
                            message.request,
                            "wamp.error.no_such_procedure",
                        ))?;
                        return Ok(());
                    }
                };
                let invocation = state.ids.generate_id().await;
                state.invocations.insert(
                    invocation,
                    PendingInvocation {
                        caller: session,
                        call_request: message.request,
                    },
                );
                state.send_to(
                    callee,
                    Message::Invocation(InvocationMessage {
                        request: invocation,
                        registered_registration: registration,
                        details: Dictionary::default(),
                        payload: message.payload,
                    }),
                );
            }
            Message::Yield(message) => {
                if let Some(invocation) = state.invocations.remove(&message.invocation_request) {
                    state.send_to(
                        invocation.caller,
                        Message::Result(ResultMessage {
                            call_request: invocation.call_request,
                            details: Dictionary::default(),
                            payload: message.payload,
                        }),
                    );
                }
            }
            Message::Error(message) if message.request_type == MessageCode::Invocation => {
                if let Some(invocation) = state.invocations.remove(&message.request) {
                    state.send_to(
                        invocation.caller,
                        Message::Error(ErrorMessage {
                            request_type: MessageCode::Call,
                            request: invocation.call_request,
                            details: message.details,
                            error: message.error,
                            payload: message.payload,
                        }),
                    );
                }
            }
            Message::Publish(message) => {
                let publication = state.ids.generate_id().await;
                if let Some(subscription) = state.subscriptions.get(&message.topic) {
                    for subscriber in subscription
                        .sessions
                        .iter()
                        .filter(|subscriber| **subscriber != session)
                    {
                        state.send_to(
                            *subscriber,
                            Message::Event(EventMessage {
                                subscribed_subscription: subscription.id,
                                published_publication: publication,
                                details: Dictionary::default(),
                                payload: message.payload.clone(),
                            }),
                        );
                    }
                }
                let acknowledge = message
                    .options
                    .get("acknowledge")
                    .and_then(|value| value.as_bool())
                    .unwrap_or(false);
                if acknowledge {
                    message_tx.send(Message::Published(PublishedMessage {
                        publish_request: message.request,
                        publication,
                    }))?;
                }
            }
            Message::Goodbye(_) => {
                if self.config.echo_goodbye {
                    let reason = self
                        .config
                        .goodbye_reason
                        .as_deref()
                        .unwrap_or("wamp.close.goodbye_and_out");
                    message_tx.send(Message::Goodbye(GoodbyeMessage {
                        details: Dictionary::default(),
                        reason: uri(reason),
                    }))?;
                }
                state.remove_session(session);
                if self.config.echo_goodbye {
                    self.connection = ConnectionState::Closed;
                }
            }
            Message::Abort(_) => {
                state.remove_session(session);
                self.connection = ConnectionState::Closed;
            }
            message => {
                debug!(
                    "Mock router ignored {} from session {session}",
                    message.message_name()
                );
            }
        }
        Ok(())
    }
}
