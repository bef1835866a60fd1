use anyhow::{
    Error,
    Result,
};

use crate::core::{
    error::ProtocolError,
    id::Id,
    types::{
        Dictionary,
        Integer,
        List,
        Value,
    },
    uri::Uri,
};

/// The fixed integer code at the head of every message on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    Hello = 1,
    Welcome = 2,
    Abort = 3,
    Challenge = 4,
    Authenticate = 5,
    Goodbye = 6,
    Error = 8,
    Publish = 16,
    Published = 17,
    Subscribe = 32,
    Subscribed = 33,
    Unsubscribe = 34,
    Unsubscribed = 35,
    Event = 36,
    Call = 48,
    Result = 50,
    Register = 64,
    Registered = 65,
    Unregister = 66,
    Unregistered = 67,
    Invocation = 68,
    Yield = 70,
}

impl MessageCode {
    const ALL: [MessageCode; 22] = [
        Self::Hello,
        Self::Welcome,
        Self::Abort,
        Self::Challenge,
        Self::Authenticate,
        Self::Goodbye,
        Self::Error,
        Self::Publish,
        Self::Published,
        Self::Subscribe,
        Self::Subscribed,
        Self::Unsubscribe,
        Self::Unsubscribed,
        Self::Event,
        Self::Call,
        Self::Result,
        Self::Register,
        Self::Registered,
        Self::Unregister,
        Self::Unregistered,
        Self::Invocation,
        Self::Yield,
    ];

    /// The integer value of the code.
    pub fn value(&self) -> Integer {
        *self as Integer
    }

    /// The name of the message kind, as written in the protocol.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Welcome => "WELCOME",
            Self::Abort => "ABORT",
            Self::Challenge => "CHALLENGE",
            Self::Authenticate => "AUTHENTICATE",
            Self::Goodbye => "GOODBYE",
            Self::Error => "ERROR",
            Self::Publish => "PUBLISH",
            Self::Published => "PUBLISHED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Subscribed => "SUBSCRIBED",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Unsubscribed => "UNSUBSCRIBED",
            Self::Event => "EVENT",
            Self::Call => "CALL",
            Self::Result => "RESULT",
            Self::Register => "REGISTER",
            Self::Registered => "REGISTERED",
            Self::Unregister => "UNREGISTER",
            Self::Unregistered => "UNREGISTERED",
            Self::Invocation => "INVOCATION",
            Self::Yield => "YIELD",
        }
    }
}

impl TryFrom<Integer> for MessageCode {
    type Error = ProtocolError;
    fn try_from(value: Integer) -> Result<Self, ProtocolError> {
        Self::ALL
            .into_iter()
            .find(|code| code.value() == value)
            .ok_or_else(|| ProtocolError::new(format!("unknown message code {value}")))
    }
}

/// The optional trailing application payload of a message.
///
/// The wire form of a message carrying a payload has three alternative lengths. Each length is a
/// distinct variant, so decoding then encoding a message reproduces the original array.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Arguments(List),
    ArgumentsKeyword(List, Dictionary),
}

/// Trailing payload shapes, probed from longest to shortest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadShape {
    ArgumentsKeyword,
    Arguments,
    Empty,
}

impl PayloadShape {
    const LONGEST_FIRST: [PayloadShape; 3] = [
        PayloadShape::ArgumentsKeyword,
        PayloadShape::Arguments,
        PayloadShape::Empty,
    ];

    fn len(&self) -> usize {
        match self {
            Self::ArgumentsKeyword => 2,
            Self::Arguments => 1,
            Self::Empty => 0,
        }
    }
}

impl Payload {
    /// Creates the most compact payload that carries the given arguments.
    pub fn new(arguments: List, arguments_keyword: Dictionary) -> Self {
        if !arguments_keyword.is_empty() {
            Self::ArgumentsKeyword(arguments, arguments_keyword)
        } else if !arguments.is_empty() {
            Self::Arguments(arguments)
        } else {
            Self::Empty
        }
    }

    /// Positional arguments.
    pub fn arguments(&self) -> &[Value] {
        match self {
            Self::Empty => &[],
            Self::Arguments(arguments) | Self::ArgumentsKeyword(arguments, _) => arguments,
        }
    }

    /// Keyword arguments, if present.
    pub fn arguments_keyword(&self) -> Option<&Dictionary> {
        match self {
            Self::ArgumentsKeyword(_, arguments_keyword) => Some(arguments_keyword),
            _ => None,
        }
    }

    /// Splits the payload into positional and keyword arguments.
    pub fn into_parts(self) -> (List, Dictionary) {
        match self {
            Self::Empty => (List::default(), Dictionary::default()),
            Self::Arguments(arguments) => (arguments, Dictionary::default()),
            Self::ArgumentsKeyword(arguments, arguments_keyword) => (arguments, arguments_keyword),
        }
    }

    fn write(self, out: &mut List) {
        match self {
            Self::Empty => (),
            Self::Arguments(arguments) => out.push(Value::List(arguments)),
            Self::ArgumentsKeyword(arguments, arguments_keyword) => {
                out.push(Value::List(arguments));
                out.push(Value::Dictionary(arguments_keyword));
            }
        }
    }
}

/// A value that occupies one position of a message array.
trait WireField: Sized {
    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Result<Self>;
}

impl WireField for Id {
    fn into_value(self) -> Value {
        self.into()
    }

    fn from_value(value: Value) -> Result<Self> {
        Id::try_from(&value).map_err(Error::new)
    }
}

impl WireField for Uri {
    fn into_value(self) -> Value {
        Value::String(self.into())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(value) => Uri::try_from(value).map_err(Error::new),
            value => Err(Error::msg(format!("expected string, got {value}"))),
        }
    }
}

impl WireField for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(value) => Ok(value),
            value => Err(Error::msg(format!("expected string, got {value}"))),
        }
    }
}

impl WireField for Dictionary {
    fn into_value(self) -> Value {
        Value::Dictionary(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Dictionary(value) => Ok(value),
            value => Err(Error::msg(format!("expected dictionary, got {value}"))),
        }
    }
}

impl WireField for MessageCode {
    fn into_value(self) -> Value {
        Value::Integer(self.value())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(value) => MessageCode::try_from(value).map_err(Error::new),
            value => Err(Error::msg(format!("expected integer, got {value}"))),
        }
    }
}

/// Sequential reader over the fields of one message array, after the code.
struct Fields {
    code: MessageCode,
    values: std::vec::IntoIter<Value>,
    shape: Option<PayloadShape>,
}

impl Fields {
    fn new(code: MessageCode, wire: List, fixed: usize, has_payload: bool) -> Result<Self> {
        let mut values = wire.into_iter();
        let head = values.next().ok_or_else(|| {
            ProtocolError::new(format!("{} message is an empty array", code.name()))
        })?;
        if head.as_integer() != Some(code.value()) {
            return Err(ProtocolError::new(format!(
                "expected {} code {}, got {head}",
                code.name(),
                code.value()
            ))
            .into());
        }
        let len = values.len();
        let shape = if has_payload {
            let shape = PayloadShape::LONGEST_FIRST
                .into_iter()
                .find(|shape| len == fixed + shape.len())
                .ok_or_else(|| Self::arity_error(code, len))?;
            Some(shape)
        } else if len == fixed {
            None
        } else {
            return Err(Self::arity_error(code, len));
        };
        Ok(Self {
            code,
            values,
            shape,
        })
    }

    fn arity_error(code: MessageCode, len: usize) -> Error {
        ProtocolError::new(format!(
            "{} message has unexpected length {}",
            code.name(),
            len + 1
        ))
        .into()
    }

    fn read<T>(&mut self, field: &str) -> Result<T>
    where
        T: WireField,
    {
        let value = self.values.next().ok_or_else(|| {
            ProtocolError::new(format!("{} message is missing {field}", self.code.name()))
        })?;
        T::from_value(value).map_err(|err| {
            ProtocolError::new(format!(
                "{} message has invalid {field}: {err:#}",
                self.code.name()
            ))
            .into()
        })
    }

    fn read_payload(&mut self) -> Result<Payload> {
        match self.shape {
            None | Some(PayloadShape::Empty) => Ok(Payload::Empty),
            Some(PayloadShape::Arguments) => Ok(Payload::Arguments(self.read_arguments()?)),
            Some(PayloadShape::ArgumentsKeyword) => {
                let arguments = self.read_arguments()?;
                let arguments_keyword = self.read("arguments_keyword")?;
                Ok(Payload::ArgumentsKeyword(arguments, arguments_keyword))
            }
        }
    }

    fn read_arguments(&mut self) -> Result<List> {
        match self.values.next() {
            Some(Value::List(arguments)) => Ok(arguments),
            value => Err(ProtocolError::new(format!(
                "{} message has invalid arguments: {}",
                self.code.name(),
                value.unwrap_or_default()
            ))
            .into()),
        }
    }
}

/// A message kind with a fixed code and a fixed positional layout.
pub trait WireMessage: Sized {
    /// The code at the head of the message array.
    const CODE: MessageCode;

    /// Writes the fields following the code, in order.
    fn encode_fields(self, out: &mut List);

    #[doc(hidden)]
    fn decode_fields(wire: List) -> Result<Self>;

    /// Converts the message to its wire array.
    fn to_wire(self) -> List {
        let mut out = List::from_iter([Value::Integer(Self::CODE.value())]);
        self.encode_fields(&mut out);
        out
    }

    /// Parses the message from its wire array.
    ///
    /// Fails with [`ProtocolError`] if the head code does not match the kind or if the array
    /// length is not one of the lengths the kind accepts.
    fn from_wire(wire: List) -> Result<Self> {
        Self::decode_fields(wire)
    }
}

macro_rules! wire_message {
    (
        $(#[$attr:meta])*
        $name:ident($code:ident) {
            $($(#[$field_attr:meta])* $field:ident: $ty:ty),* $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $($(#[$field_attr])* pub $field: $ty,)*
        }

        impl WireMessage for $name {
            const CODE: MessageCode = MessageCode::$code;

            fn encode_fields(self, out: &mut List) {
                $(out.push(WireField::into_value(self.$field));)*
            }

            fn decode_fields(wire: List) -> Result<Self> {
                let fixed = [$(stringify!($field)),*].len();
                let mut fields = Fields::new(Self::CODE, wire, fixed, false)?;
                Ok(Self {
                    $($field: fields.read(stringify!($field))?,)*
                })
            }
        }
    };
    (
        $(#[$attr:meta])*
        $name:ident($code:ident) {
            $($(#[$field_attr:meta])* $field:ident: $ty:ty),* $(,)?
        } + payload
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            $($(#[$field_attr])* pub $field: $ty,)*
            pub payload: Payload,
        }

        impl WireMessage for $name {
            const CODE: MessageCode = MessageCode::$code;

            fn encode_fields(self, out: &mut List) {
                $(out.push(WireField::into_value(self.$field));)*
                self.payload.write(out);
            }

            fn decode_fields(wire: List) -> Result<Self> {
                let fixed = [$(stringify!($field)),*].len();
                let mut fields = Fields::new(Self::CODE, wire, fixed, true)?;
                Ok(Self {
                    $($field: fields.read(stringify!($field))?,)*
                    payload: fields.read_payload()?,
                })
            }
        }
    };
}

wire_message! {
    /// Sent by a client to open a session on a realm.
    HelloMessage(Hello) {
        realm: Uri,
        details: Dictionary,
    }
}

wire_message! {
    /// Sent by the router to accept a session.
    WelcomeMessage(Welcome) {
        session: Id,
        details: Dictionary,
    }
}

wire_message! {
    /// Sent by either side to reject or abruptly end a session.
    AbortMessage(Abort) {
        details: Dictionary,
        reason: Uri,
    }
}

wire_message! {
    /// Sent by the router to request authentication.
    ChallengeMessage(Challenge) {
        auth_method: String,
        extra: Dictionary,
    }
}

wire_message! {
    /// Sent by a client in response to a challenge.
    AuthenticateMessage(Authenticate) {
        signature: String,
        extra: Dictionary,
    }
}

wire_message! {
    /// Sent by either side to close a session, and echoed by the other side.
    GoodbyeMessage(Goodbye) {
        details: Dictionary,
        reason: Uri,
    }
}

wire_message! {
    /// Reports the failure of a request.
    ErrorMessage(Error) {
        /// Code of the message that failed.
        request_type: MessageCode,
        request: Id,
        details: Dictionary,
        error: Uri,
    } + payload
}

wire_message! {
    PublishMessage(Publish) {
        request: Id,
        options: Dictionary,
        topic: Uri,
    } + payload
}

wire_message! {
    PublishedMessage(Published) {
        publish_request: Id,
        publication: Id,
    }
}

wire_message! {
    SubscribeMessage(Subscribe) {
        request: Id,
        options: Dictionary,
        topic: Uri,
    }
}

wire_message! {
    SubscribedMessage(Subscribed) {
        subscribe_request: Id,
        subscription: Id,
    }
}

wire_message! {
    UnsubscribeMessage(Unsubscribe) {
        request: Id,
        subscribed_subscription: Id,
    }
}

wire_message! {
    UnsubscribedMessage(Unsubscribed) {
        unsubscribe_request: Id,
    }
}

wire_message! {
    EventMessage(Event) {
        subscribed_subscription: Id,
        published_publication: Id,
        details: Dictionary,
    } + payload
}

wire_message! {
    CallMessage(Call) {
        request: Id,
        options: Dictionary,
        procedure: Uri,
    } + payload
}

wire_message! {
    ResultMessage(Result) {
        call_request: Id,
        details: Dictionary,
    } + payload
}

wire_message! {
    RegisterMessage(Register) {
        request: Id,
        options: Dictionary,
        procedure: Uri,
    }
}

wire_message! {
    RegisteredMessage(Registered) {
        register_request: Id,
        registration: Id,
    }
}

wire_message! {
    UnregisterMessage(Unregister) {
        request: Id,
        registered_registration: Id,
    }
}

wire_message! {
    UnregisteredMessage(Unregistered) {
        unregister_request: Id,
    }
}

wire_message! {
    InvocationMessage(Invocation) {
        request: Id,
        registered_registration: Id,
        details: Dictionary,
    } + payload
}

wire_message! {
    YieldMessage(Yield) {
        invocation_request: Id,
        options: Dictionary,
    } + payload
}

/// A WAMP message of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(HelloMessage),
    Welcome(WelcomeMessage),
    Abort(AbortMessage),
    Challenge(ChallengeMessage),
    Authenticate(AuthenticateMessage),
    Goodbye(GoodbyeMessage),
    Error(ErrorMessage),
    Publish(PublishMessage),
    Published(PublishedMessage),
    Subscribe(SubscribeMessage),
    Subscribed(SubscribedMessage),
    Unsubscribe(UnsubscribeMessage),
    Unsubscribed(UnsubscribedMessage),
    Event(EventMessage),
    Call(CallMessage),
    Result(ResultMessage),
    Register(RegisterMessage),
    Registered(RegisteredMessage),
    Unregister(UnregisterMessage),
    Unregistered(UnregisteredMessage),
    Invocation(InvocationMessage),
    Yield(YieldMessage),
}

impl Message {
    /// The code of the message kind.
    pub fn code(&self) -> MessageCode {
        match self {
            Self::Hello(_) => MessageCode::Hello,
            Self::Welcome(_) => MessageCode::Welcome,
            Self::Abort(_) => MessageCode::Abort,
            Self::Challenge(_) => MessageCode::Challenge,
            Self::Authenticate(_) => MessageCode::Authenticate,
            Self::Goodbye(_) => MessageCode::Goodbye,
            Self::Error(_) => MessageCode::Error,
            Self::Publish(_) => MessageCode::Publish,
            Self::Published(_) => MessageCode::Published,
            Self::Subscribe(_) => MessageCode::Subscribe,
            Self::Subscribed(_) => MessageCode::Subscribed,
            Self::Unsubscribe(_) => MessageCode::Unsubscribe,
            Self::Unsubscribed(_) => MessageCode::Unsubscribed,
            Self::Event(_) => MessageCode::Event,
            Self::Call(_) => MessageCode::Call,
            Self::Result(_) => MessageCode::Result,
            Self::Register(_) => MessageCode::Register,
            Self::Registered(_) => MessageCode::Registered,
            Self::Unregister(_) => MessageCode::Unregister,
            Self::Unregistered(_) => MessageCode::Unregistered,
            Self::Invocation(_) => MessageCode::Invocation,
            Self::Yield(_) => MessageCode::Yield,
        }
    }

    /// The name of the message kind, for logging.
    pub fn message_name(&self) -> &'static str {
        self.code().name()
    }

    /// The request ID the message is or correlates with, if any.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Published(message) => Some(message.publish_request),
            Self::Subscribe(message) => Some(message.request),
            Self::Subscribed(message) => Some(message.subscribe_request),
            Self::Unsubscribe(message) => Some(message.request),
            Self::Unsubscribed(message) => Some(message.unsubscribe_request),
            Self::Call(message) => Some(message.request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// Converts the message to its wire array.
    pub fn to_wire(self) -> List {
        match self {
            Self::Hello(message) => message.to_wire(),
            Self::Welcome(message) => message.to_wire(),
            Self::Abort(message) => message.to_wire(),
            Self::Challenge(message) => message.to_wire(),
            Self::Authenticate(message) => message.to_wire(),
            Self::Goodbye(message) => message.to_wire(),
            Self::Error(message) => message.to_wire(),
            Self::Publish(message) => message.to_wire(),
            Self::Published(message) => message.to_wire(),
            Self::Subscribe(message) => message.to_wire(),
            Self::Subscribed(message) => message.to_wire(),
            Self::Unsubscribe(message) => message.to_wire(),
            Self::Unsubscribed(message) => message.to_wire(),
            Self::Event(message) => message.to_wire(),
            Self::Call(message) => message.to_wire(),
            Self::Result(message) => message.to_wire(),
            Self::Register(message) => message.to_wire(),
            Self::Registered(message) => message.to_wire(),
            Self::Unregister(message) => message.to_wire(),
            Self::Unregistered(message) => message.to_wire(),
            Self::Invocation(message) => message.to_wire(),
            Self::Yield(message) => message.to_wire(),
        }
    }

    /// Parses any message from its wire array, classifying it by its head code.
    pub fn from_wire(wire: List) -> Result<Self> {
        let code = match wire.first() {
            Some(Value::Integer(code)) => MessageCode::try_from(*code)?,
            Some(value) => {
                return Err(
                    ProtocolError::new(format!("message code must be an integer, got {value}"))
                        .into(),
                );
            }
            None => return Err(ProtocolError::new("message is an empty array").into()),
        };
        let message = match code {
            MessageCode::Hello => Self::Hello(HelloMessage::from_wire(wire)?),
            MessageCode::Welcome => Self::Welcome(WelcomeMessage::from_wire(wire)?),
            MessageCode::Abort => Self::Abort(AbortMessage::from_wire(wire)?),
            MessageCode::Challenge => Self::Challenge(ChallengeMessage::from_wire(wire)?),
            MessageCode::Authenticate => Self::Authenticate(AuthenticateMessage::from_wire(wire)?),
            MessageCode::Goodbye => Self::Goodbye(GoodbyeMessage::from_wire(wire)?),
            MessageCode::Error => Self::Error(ErrorMessage::from_wire(wire)?),
            MessageCode::Publish => Self::Publish(PublishMessage::from_wire(wire)?),
            MessageCode::Published => Self::Published(PublishedMessage::from_wire(wire)?),
            MessageCode::Subscribe => Self::Subscribe(SubscribeMessage::from_wire(wire)?),
            MessageCode::Subscribed => Self::Subscribed(SubscribedMessage::from_wire(wire)?),
            MessageCode::Unsubscribe => Self::Unsubscribe(UnsubscribeMessage::from_wire(wire)?),
            MessageCode::Unsubscribed => Self::Unsubscribed(UnsubscribedMessage::from_wire(wire)?),
            MessageCode::Event => Self::Event(EventMessage::from_wire(wire)?),
            MessageCode::Call => Self::Call(CallMessage::from_wire(wire)?),
            MessageCode::Result => Self::Result(ResultMessage::from_wire(wire)?),
            MessageCode::Register => Self::Register(RegisterMessage::from_wire(wire)?),
            MessageCode::Registered => Self::Registered(RegisteredMessage::from_wire(wire)?),
            MessageCode::Unregister => Self::Unregister(UnregisterMessage::from_wire(wire)?),
            MessageCode::Unregistered => Self::Unregistered(UnregisteredMessage::from_wire(wire)?),
            MessageCode::Invocation => Self::Invocation(InvocationMessage::from_wire(wire)?),
            MessageCode::Yield => Self::Yield(YieldMessage::from_wire(wire)?),
        };
        Ok(message)
    }
}

#[cfg(test)]
mod message_test {
    use anyhow::Error;

    use crate::{
        core::{
            error::ProtocolError,
            id::Id,
            types::{
                Dictionary,
                List,
                Value,
            },
            uri::Uri,
        },
        message::message::{
            AbortMessage,
            AuthenticateMessage,
            CallMessage,
            ChallengeMessage,
            ErrorMessage,
            EventMessage,
            GoodbyeMessage,
            HelloMessage,
            InvocationMessage,
            Message,
            MessageCode,
            Payload,
            PublishMessage,
            PublishedMessage,
            RegisterMessage,
            RegisteredMessage,
            ResultMessage,
            SubscribeMessage,
            SubscribedMessage,
            UnregisterMessage,
            UnregisteredMessage,
            UnsubscribeMessage,
            UnsubscribedMessage,
            WelcomeMessage,
            WireMessage,
            YieldMessage,
        },
    };

    fn wire(json: &str) -> List {
        serde_json::from_str(json).unwrap()
    }

    fn id(value: u64) -> Id {
        Id::try_from(value).unwrap()
    }

    fn uri(value: &str) -> Uri {
        Uri::try_from(value).unwrap()
    }

    fn assert_protocol_error(err: Error) {
        assert!(err.is::<ProtocolError>(), "{err:#}");
    }

    #[test]
    fn encodes_hello_as_flat_array() {
        let message = Message::Hello(HelloMessage {
            realm: uri("com.example"),
            details: Dictionary::default(),
        });
        pretty_assertions::assert_eq!(message.to_wire(), wire(r#"[1, "com.example", {}]"#));
    }

    #[test]
    fn decodes_each_trailing_payload_shape() {
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[48, 7, {}, "say_hello"]"#)),
            Ok(Message::Call(CallMessage { request, payload: Payload::Empty, .. })) => {
                assert_eq!(request, id(7));
            }
        );
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[48, 7, {}, "say_hello", ["Simon"]]"#)),
            Ok(Message::Call(CallMessage { payload: Payload::Arguments(arguments), .. })) => {
                pretty_assertions::assert_eq!(arguments, List::from_iter([Value::from("Simon")]));
            }
        );
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[48, 7, {}, "say_hello", [], {"name": "Simon"}]"#)),
            Ok(Message::Call(CallMessage { payload: Payload::ArgumentsKeyword(arguments, arguments_keyword), .. })) => {
                assert!(arguments.is_empty());
                assert_eq!(arguments_keyword.get("name"), Some(&Value::from("Simon")));
            }
        );
    }

    #[test]
    fn empty_trailing_containers_are_preserved() {
        let message = Message::Result(ResultMessage {
            call_request: id(3),
            details: Dictionary::default(),
            payload: Payload::ArgumentsKeyword(List::default(), Dictionary::default()),
        });
        let encoded = message.clone().to_wire();
        pretty_assertions::assert_eq!(encoded, wire(r#"[50, 3, {}, [], {}]"#));
        pretty_assertions::assert_eq!(Message::from_wire(encoded).unwrap(), message);
    }

    #[test]
    fn decodes_error_with_request_type() {
        assert_matches::assert_matches!(
            Message::from_wire(wire(
                r#"[8, 48, 12, {}, "wamp.error.runtime_error", ["bad input"], {"call_arguments": [1]}]"#
            )),
            Ok(Message::Error(ErrorMessage { request_type, request, error, payload, .. })) => {
                assert_eq!(request_type, MessageCode::Call);
                assert_eq!(request, id(12));
                assert_eq!(error, uri("wamp.error.runtime_error"));
                assert_eq!(payload.arguments(), &[Value::from("bad input")]);
            }
        );
    }

    #[test]
    fn rejects_wrong_code_for_kind() {
        assert_matches::assert_matches!(
            HelloMessage::from_wire(wire(r#"[2, 123, {}]"#)),
            Err(err) => assert_protocol_error(err)
        );
        assert_matches::assert_matches!(
            EventMessage::from_wire(wire(r#"[48, 7, {}, "say_hello"]"#)),
            Err(err) => assert_protocol_error(err)
        );
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[99, 1]"#)),
            Err(err) => assert_protocol_error(err)
        );
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"["hello", 1]"#)),
            Err(err) => assert_protocol_error(err)
        );
        assert_matches::assert_matches!(
            Message::from_wire(List::default()),
            Err(err) => assert_protocol_error(err)
        );
    }

    #[test]
    fn rejects_unexpected_arity() {
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[6, {}]"#)),
            Err(err) => assert_protocol_error(err)
        );
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[70, 1, {}, [], {}, "extra"]"#)),
            Err(err) => assert_protocol_error(err)
        );
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[50]"#)),
            Err(err) => assert_protocol_error(err)
        );
    }

    #[test]
    fn rejects_invalid_field_types() {
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[6, {}, "not a uri"]"#)),
            Err(err) => assert_protocol_error(err)
        );
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[36, 0, 1, {}]"#)),
            Err(err) => assert_protocol_error(err)
        );
        assert_matches::assert_matches!(
            Message::from_wire(wire(r#"[70, 1, {}, {"a": 1}]"#)),
            Err(err) => assert_protocol_error(err)
        );
    }

    fn payloads() -> [Payload; 3] {
        [
            Payload::Empty,
            Payload::Arguments(List::from_iter([Value::from("Hello Simon"), Value::from(2)])),
            Payload::ArgumentsKeyword(
                List::default(),
                Dictionary::from_iter([("message".to_owned(), Value::from("foobar"))]),
            ),
        ]
    }

    fn details() -> Dictionary {
        Dictionary::from_iter([("agent".to_owned(), Value::from("wamp-session"))])
    }

    #[test]
    fn round_trips_every_message_kind_through_wire() {
        let mut messages = vec![
            Message::Hello(HelloMessage {
                realm: uri("com.example"),
                details: details(),
            }),
            Message::Welcome(WelcomeMessage {
                session: id(1),
                details: details(),
            }),
            Message::Abort(AbortMessage {
                details: details(),
                reason: uri("wamp.error.no_such_realm"),
            }),
            Message::Challenge(ChallengeMessage {
                auth_method: "wampcra".to_owned(),
                extra: details(),
            }),
            Message::Authenticate(AuthenticateMessage {
                signature: "c2lnbmF0dXJl".to_owned(),
                extra: Dictionary::default(),
            }),
            Message::Goodbye(GoodbyeMessage {
                details: Dictionary::default(),
                reason: uri("wamp.close.normal"),
            }),
            Message::Published(PublishedMessage {
                publish_request: id(2),
                publication: id(3),
            }),
            Message::Subscribe(SubscribeMessage {
                request: id(4),
                options: Dictionary::default(),
                topic: uri("com.example.topic"),
            }),
            Message::Subscribed(SubscribedMessage {
                subscribe_request: id(4),
                subscription: id(5),
            }),
            Message::Unsubscribe(UnsubscribeMessage {
                request: id(6),
                subscribed_subscription: id(5),
            }),
            Message::Unsubscribed(UnsubscribedMessage {
                unsubscribe_request: id(6),
            }),
            Message::Register(RegisterMessage {
                request: id(7),
                options: Dictionary::from_iter([("invoke".to_owned(), Value::from("single"))]),
                procedure: uri("com.example.say_hello"),
            }),
            Message::Registered(RegisteredMessage {
                register_request: id(7),
                registration: id(8),
            }),
            Message::Unregister(UnregisterMessage {
                request: id(9),
                registered_registration: id(8),
            }),
            Message::Unregistered(UnregisteredMessage {
                unregister_request: id(9),
            }),
        ];
        for payload in payloads() {
            messages.extend([
                Message::Error(ErrorMessage {
                    request_type: MessageCode::Call,
                    request: id(10),
                    details: Dictionary::default(),
                    error: uri("wamp.error.runtime_error"),
                    payload: payload.clone(),
                }),
                Message::Publish(PublishMessage {
                    request: id(11),
                    options: Dictionary::from_iter([("acknowledge".to_owned(), Value::from(true))]),
                    topic: uri("com.example.topic"),
                    payload: payload.clone(),
                }),
                Message::Event(EventMessage {
                    subscribed_subscription: id(5),
                    published_publication: id(12),
                    details: Dictionary::default(),
                    payload: payload.clone(),
                }),
                Message::Call(CallMessage {
                    request: id(13),
                    options: Dictionary::default(),
                    procedure: uri("com.example.say_hello"),
                    payload: payload.clone(),
                }),
                Message::Result(ResultMessage {
                    call_request: id(13),
                    details: Dictionary::default(),
                    payload: payload.clone(),
                }),
                Message::Invocation(InvocationMessage {
                    request: id(14),
                    registered_registration: id(8),
                    details: Dictionary::default(),
                    payload: payload.clone(),
                }),
                Message::Yield(YieldMessage {
                    invocation_request: id(14),
                    options: Dictionary::default(),
                    payload,
                }),
            ]);
        }

        let mut codes = std::collections::HashSet::new();
        for message in messages {
            codes.insert(message.code());
            let encoded = message.clone().to_wire();
            pretty_assertions::assert_eq!(encoded.first(), Some(&Value::Integer(message.code().value())));
            pretty_assertions::assert_eq!(Message::from_wire(encoded).unwrap(), message);
        }
        pretty_assertions::assert_eq!(codes.len(), 22);
    }

    #[test]
    fn compacts_payload() {
        assert_eq!(Payload::new(List::default(), Dictionary::default()), Payload::Empty);
        assert_matches::assert_matches!(
            Payload::new(List::from_iter([Value::from(1)]), Dictionary::default()),
            Payload::Arguments(_)
        );
        assert_matches::assert_matches!(
            Payload::new(
                List::default(),
                Dictionary::from_iter([("a".to_owned(), Value::from(1))])
            ),
            Payload::ArgumentsKeyword(_, _)
        );
    }
}
