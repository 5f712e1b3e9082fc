//! Domain types exchanged between the application and the engine.
//!
//! - [`message`] – the immutable [`Message`] value object and its QoS level.
//! - [`options`] – typed option structures for connect and per-request calls.

pub mod message;
pub mod options;

pub use message::{DestinationType, Message, Qos};
pub use options::{ConnectOptions, RequestOptions, SubscribeOptions};
