use anyhow::Error;

use crate::{
    core::{
        close::CloseReason,
        error::{
            error_kind,
            uri_for_error,
        },
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
        ErrorMessage,
        GoodbyeMessage,
        Message,
        MessageCode,
        Payload,
    },
};

pub fn abort_message(reason: Uri, message: &str) -> Message {
    Message::Abort(AbortMessage {
        details: Dictionary::from_iter([("message".to_owned(), Value::from(message))]),
        reason,
    })
}

pub fn goodbye_with_close_reason(close_reason: CloseReason) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason: close_reason.uri(),
    })
}

pub fn goodbye_and_out() -> Message {
    goodbye_with_close_reason(CloseReason::GoodbyeAndOut)
}

/// The ERROR a callee sends when a procedure fails.
///
/// Echoes the call arguments back to the caller.
pub fn error_for_invocation(
    request: Id,
    error: &Error,
    call_arguments: List,
    call_arguments_keyword: Dictionary,
) -> Message {
    let message = error.to_string();
    Message::Error(ErrorMessage {
        request_type: MessageCode::Invocation,
        request,
        details: Dictionary::from_iter([("message".to_owned(), Value::from(message.as_str()))]),
        error: uri_for_error(error),
        payload: Payload::ArgumentsKeyword(
            List::from_iter([Value::from(message)]),
            Dictionary::from_iter([
                ("error".to_owned(), Value::from(error_kind(error))),
                ("call_arguments".to_owned(), Value::List(call_arguments)),
                (
                    "call_arguments_keyword".to_owned(),
                    Value::Dictionary(call_arguments_keyword),
                ),
            ]),
        ),
    })
}

/// The ERROR a callee sends for an invocation of a registration it does not have.
pub fn no_such_registration(request: Id, registration: Id) -> Message {
    Message::Error(ErrorMessage {
        request_type: MessageCode::Invocation,
        request,
        details: Dictionary::from_iter([(
            "message".to_owned(),
            Value::from(format!("registration {registration} does not exist")),
        )]),
        error: Uri::from_known("wamp.error.no_such_registration"),
        payload: Payload::Empty,
    })
}
