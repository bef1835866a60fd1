mod connector;
mod direct_connector;
mod web_socket_connector;

pub use connector::{
    Connection,
    Connector,
};
pub use direct_connector::{
    DirectConnection,
    DirectConnector,
    direct_connector,
};
pub use web_socket_connector::WebSocketConnector;
