mod client;
mod config;
mod connector;
mod dispatcher;
mod handler;
mod proxy;
mod registry;
mod session;
mod state;

pub use client::{
    Client,
    ClientBuilder,
};
pub use config::{
    SessionConfig,
    WebSocketConfig,
};
pub use connector::{
    Connection,
    Connector,
    DirectConnection,
    DirectConnector,
    WebSocketConnector,
    direct_connector,
};
pub use dispatcher::EVENT_METADATA_KEY;
pub use handler::{
    Event,
    Invocation,
    Procedure,
    Subscription,
    procedure_fn,
    subscription_fn,
};
pub use proxy::{
    Call,
    Publish,
    Rpc,
};
pub use registry::Registry;
pub use session::{
    ProcedureOptions,
    PublishedEvent,
    RpcCall,
    RpcResult,
    Session,
    WelcomeInfo,
};
pub use state::SessionState;
