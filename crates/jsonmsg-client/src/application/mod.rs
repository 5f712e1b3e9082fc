//! Application layer: the protocol engine proper.
//!
//! # Sub-modules
//!
//! - **`connection`** – The [`Connection`](connection::Connection) state
//!   machine.  Owns every piece of session state and runs the single teardown
//!   path.
//!
//! - **`dispatcher`** – Decodes inbound frames and routes them to the
//!   connection, checking each against the current state.
//!
//! - **`keepalive`** – Decides between "send a Ping" and "the server is gone"
//!   each time the keepalive timer fires.
//!
//! - **`handler`** – The [`ConnectionHandler`](handler::ConnectionHandler)
//!   trait applications implement to receive messages and connection loss.
//!
//! **Dependency rule**: this layer depends on `domain`, `jsonmsg_core` and the
//! transport and timer *traits and types* in `infrastructure`, never on the
//! engine task itself.

pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod keepalive;
