//! # jsonmsg-client
//!
//! The json-msg connection engine: a client for a lightweight publish/subscribe
//! protocol carried as JSON frames over one WebSocket connection.
//!
//! # Architecture (Clean Architecture)
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ infrastructure/                                  │
//! │   engine      – Client handle + engine task      │
//! │   transport/  – WebSocket + in-memory transports │
//! │   timer       – one-shot cancellable timers      │
//! ├──────────────────────────────────────────────────┤
//! │ application/                                     │
//! │   connection  – state machine + teardown         │
//! │   dispatcher  – inbound frame routing            │
//! │   keepalive   – liveness monitor                 │
//! │   handler     – ConnectionHandler callbacks      │
//! ├──────────────────────────────────────────────────┤
//! │ domain/                                          │
//! │   config      – ClientConfig, config file        │
//! │   events      – transport and timer events       │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Execution model
//!
//! All protocol state lives in one [`Connection`] owned by a single tokio task.
//! The task pulls caller commands, transport events and timer fires off its
//! queues and handles them one at a time, so no engine code ever needs a lock.
//! Applications talk to the task through the cloneable [`Client`] handle.
//!
//! ```rust,no_run
//! use jsonmsg_client::{Client, ClientConfig, ConnectionHandler};
//! use jsonmsg_core::{ConnectOptions, ConnectionError, Message};
//!
//! struct Printer;
//!
//! impl ConnectionHandler for Printer {
//!     fn on_message_arrived(&mut self, message: Message) -> anyhow::Result<()> {
//!         println!("{}: {}", message.destination_name(), message.payload_string());
//!         Ok(())
//!     }
//!
//!     fn on_connection_lost(&mut self, error: &ConnectionError) {
//!         eprintln!("connection lost: {error}");
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ClientConfig::new("ws://localhost:8080/ws", "c1")?;
//! let (client, _engine) = Client::spawn(config, Printer);
//! client.connect(ConnectOptions::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::connection::{Connection, ConnectionState};
pub use application::handler::ConnectionHandler;
pub use domain::config::{ClientConfig, ConfigError};
pub use infrastructure::engine::Client;
