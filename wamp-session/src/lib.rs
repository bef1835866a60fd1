//! Asynchronous client sessions for the Web Application Messaging Protocol (WAMP).
//!
//! A [`Session`][`crate::peer::Session`] owns one connection to a router. Its background service
//! task is the only reader of the connection: responses are correlated with the requests waiting
//! on them, invocations of registered procedures run on their own tasks, and events are handed to
//! subscription handlers in the order they arrive.
//!
//! [`Client`][`crate::peer::Client`] wraps a session with a fixed set of procedures and
//! subscriptions that are activated every time it starts.

pub mod auth;
pub mod core;
pub mod message;
pub mod peer;
pub mod serializer;
pub mod transport;
