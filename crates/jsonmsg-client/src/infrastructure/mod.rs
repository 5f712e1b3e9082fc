//! Infrastructure layer: tokio tasks and I/O.
//!
//! # Sub-modules
//!
//! - **`engine`** – The [`Client`](engine::Client) handle and the task that
//!   owns the [`Connection`](crate::Connection).
//!
//! - **`transport`** – The `Connector`/`Transport` traits, the
//!   tokio-tungstenite WebSocket implementation and an in-memory mock.
//!
//! - **`timer`** – One-shot timers that post [`TimerFired`](crate::domain::TimerFired)
//!   events back to the engine queue and cancel themselves when dropped.

pub mod engine;
pub mod timer;
pub mod transport;
