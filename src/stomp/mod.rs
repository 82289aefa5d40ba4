pub mod client;
pub mod config;
pub mod connector;
pub mod frame;

pub use client::{StompClient, StompSubscription};
pub use config::{FeedClientConfig, FeedClientConfigBuilder};
pub use connector::{
    TransportEvent, TransportFactory, TransportHandle, TransportPeer, WebSocketConnector,
};
pub use frame::{StompCommand, StompFrame};
