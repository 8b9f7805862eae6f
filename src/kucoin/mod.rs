//! KuCoin venue: REST market data, stream token and the public match feed

pub mod auth;
pub mod messages;
pub mod rest;
pub mod websocket;

pub use rest::KucoinRestClient;
pub use websocket::{KucoinStreamClient, ReconnectPolicy, StreamHandle};
