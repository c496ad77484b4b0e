pub mod connection;
pub mod feed;

pub use connection::{ChatRoom, ConnectionState, GatewayError, RoomConfig, TokenSource};
pub use feed::MessageFeed;
