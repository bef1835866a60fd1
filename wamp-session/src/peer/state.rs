use std::{
    collections::VecDeque,
    sync::Arc,
};

use anyhow::Result;
use tokio::sync::{
    mpsc::UnboundedSender,
    oneshot,
};

use crate::{
    core::{
        error::ProtocolError,
        id::Id,
        types::{
            HashMap,
            HashSet,
        },
        uri::Uri,
    },
    message::message::Message,
    peer::handler::{
        Event,
        Procedure,
        Subscription,
    },
};

/// Number of timed-out request IDs remembered so that their late responses are recognized.
const ABANDONED_REQUEST_HISTORY: usize = 4096;

/// The state of a session's connection to a router.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// HELLO sent, waiting for WELCOME.
    Connecting,
    Active,
    /// GOODBYE sent, waiting for the echo.
    Closing,
}

impl SessionState {
    fn allowed_transition(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Disconnected, Self::Connecting)
            | (Self::Connecting, Self::Active)
            | (Self::Active, Self::Closing) => true,
            (_, Self::Disconnected) => true,
            _ => false,
        }
    }
}

pub(crate) struct RegistrationEntry {
    pub procedure: Uri,
    pub handler: Arc<dyn Procedure>,
}

/// An event, along with the handlers subscribed when it arrived.
pub(crate) type EventDelivery = (Event, Vec<Arc<dyn Subscription>>);

pub(crate) struct SubscriptionEntry {
    pub topic: Uri,
    pub handlers: Vec<Arc<dyn Subscription>>,
    /// Feeds the task that runs handlers for this subscription, in arrival order.
    pub event_tx: UnboundedSender<EventDelivery>,
}

/// The local handler that becomes active once a request is confirmed.
pub(crate) enum PendingHandler {
    Procedure {
        procedure: Uri,
        handler: Arc<dyn Procedure>,
    },
    Subscription {
        topic: Uri,
        handler: Arc<dyn Subscription>,
    },
}

/// A request waiting for its correlated response.
pub(crate) struct PendingRequest {
    pub request: Message,
    pub handler: Option<PendingHandler>,
    pub reply_tx: oneshot::Sender<Message>,
}

impl PendingRequest {
    /// Checks if the message is a valid response to this request.
    pub fn answered_by(&self, response: &Message) -> bool {
        match (&self.request, response) {
            (Message::Call(_), Message::Result(_))
            | (Message::Publish(_), Message::Published(_))
            | (Message::Register(_), Message::Registered(_))
            | (Message::Unregister(_), Message::Unregistered(_))
            | (Message::Subscribe(_), Message::Subscribed(_))
            | (Message::Unsubscribe(_), Message::Unsubscribed(_)) => true,
            (request, Message::Error(error)) => error.request_type == request.code(),
            _ => false,
        }
    }
}

/// Protocol state shared between a session and its dispatcher.
#[derive(Default)]
pub(crate) struct SharedState {
    pub state: SessionState,
    /// Incremented for every connection, so that a finished connection cannot reset the state of
    /// a newer one.
    pub connection: u64,
    pub session_id: Option<Id>,
    pub realm: Option<Uri>,
    pub registrations: HashMap<Id, RegistrationEntry>,
    pub subscriptions: HashMap<Id, SubscriptionEntry>,
    pub pending: HashMap<Id, PendingRequest>,
    abandoned: HashSet<Id>,
    abandoned_order: VecDeque<Id>,
    /// Slot for the next WELCOME, CHALLENGE, ABORT, or GOODBYE echo.
    pub handshake_tx: Option<oneshot::Sender<Message>>,
    pub message_tx: Option<UnboundedSender<Message>>,
}

impl SharedState {
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.allowed_transition(next) {
            return Err(ProtocolError::new(format!(
                "invalid session state transition from {:?} to {next:?}",
                self.state
            ))
            .into());
        }
        self.state = next;
        Ok(())
    }

    /// Checks if a request ID can be used for a new request.
    pub fn request_id_available(&self, id: Id) -> bool {
        !self.pending.contains_key(&id) && !self.abandoned.contains(&id)
    }

    /// Gives up on a pending request, so that a late response to it is dropped.
    ///
    /// Returns `false` if the request was no longer pending.
    pub fn abandon(&mut self, id: Id) -> bool {
        if self.pending.remove(&id).is_none() {
            return false;
        }
        if self.abandoned_order.len() >= ABANDONED_REQUEST_HISTORY {
            if let Some(oldest) = self.abandoned_order.pop_front() {
                self.abandoned.remove(&oldest);
            }
        }
        self.abandoned.insert(id);
        self.abandoned_order.push_back(id);
        true
    }

    /// Forgets an abandoned request after its late response arrived.
    ///
    /// Returns `false` if the request was not abandoned.
    pub fn forget_abandoned(&mut self, id: Id) -> bool {
        if !self.abandoned.remove(&id) {
            return false;
        }
        self.abandoned_order.retain(|abandoned| *abandoned != id);
        true
    }

    /// Clears all state for the current connection.
    ///
    /// Dropping the reply slots wakes every waiter, which then fails with a connection error.
    pub fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.session_id = None;
        self.realm = None;
        self.registrations.clear();
        self.subscriptions.clear();
        self.pending.clear();
        self.abandoned.clear();
        self.abandoned_order.clear();
        self.handshake_tx = None;
        self.message_tx = None;
    }
}

#[cfg(test)]
mod state_test {
    use tokio::sync::oneshot;

    use crate::{
        core::{
            id::Id,
            types::Dictionary,
            uri::Uri,
        },
        message::message::{
            CallMessage,
            ErrorMessage,
            Message,
            MessageCode,
            Payload,
            RegisteredMessage,
            ResultMessage,
        },
        peer::state::{
            PendingRequest,
            SessionState,
            SharedState,
        },
    };

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn pending_call(request: Id) -> (PendingRequest, oneshot::Receiver<Message>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        (
            PendingRequest {
                request: Message::Call(CallMessage {
                    request,
                    options: Dictionary::default(),
                    procedure: Uri::try_from("say_hello").unwrap(),
                    payload: Payload::Empty,
                }),
                handler: None,
                reply_tx,
            },
            reply_rx,
        )
    }

    #[test]
    fn follows_session_state_machine() {
        let mut state = SharedState::default();
        assert_matches::assert_matches!(state.transition(SessionState::Active), Err(_));
        assert_matches::assert_matches!(state.transition(SessionState::Connecting), Ok(()));
        assert_matches::assert_matches!(state.transition(SessionState::Closing), Err(_));
        assert_matches::assert_matches!(state.transition(SessionState::Active), Ok(()));
        assert_matches::assert_matches!(state.transition(SessionState::Connecting), Err(_));
        assert_matches::assert_matches!(state.transition(SessionState::Closing), Ok(()));
        assert_matches::assert_matches!(state.transition(SessionState::Disconnected), Ok(()));
    }

    #[test]
    fn matches_responses_to_request_kind() {
        let (pending, _) = pending_call(id(1));
        assert!(pending.answered_by(&Message::Result(ResultMessage {
            call_request: id(1),
            details: Dictionary::default(),
            payload: Payload::Empty,
        })));
        assert!(pending.answered_by(&Message::Error(ErrorMessage {
            request_type: MessageCode::Call,
            request: id(1),
            details: Dictionary::default(),
            error: Uri::try_from("wamp.error.no_such_procedure").unwrap(),
            payload: Payload::Empty,
        })));
        assert!(!pending.answered_by(&Message::Error(ErrorMessage {
            request_type: MessageCode::Register,
            request: id(1),
            details: Dictionary::default(),
            error: Uri::try_from("wamp.error.procedure_already_exists").unwrap(),
            payload: Payload::Empty,
        })));
        assert!(!pending.answered_by(&Message::Registered(RegisteredMessage {
            register_request: id(1),
            registration: id(2),
        })));
    }

    #[test]
    fn abandoned_requests_are_not_reused() {
        let mut state = SharedState::default();
        let (pending, _) = pending_call(id(7));
        state.pending.insert(id(7), pending);
        assert!(!state.request_id_available(id(7)));
        assert!(state.abandon(id(7)));
        assert!(!state.abandon(id(7)));
        assert!(!state.request_id_available(id(7)));
        assert!(state.forget_abandoned(id(7)));
        assert!(state.request_id_available(id(7)));
    }

    #[tokio::test]
    async fn reset_wakes_waiters() {
        let mut state = SharedState::default();
        let (pending, reply_rx) = pending_call(id(3));
        state.pending.insert(id(3), pending);
        state.reset();
        assert_matches::assert_matches!(reply_rx.await, Err(_));
        assert_eq!(state.state, SessionState::Disconnected);
    }
}
