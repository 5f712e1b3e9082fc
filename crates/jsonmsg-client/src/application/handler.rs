//! Application callbacks for session-wide events.

use jsonmsg_core::{ConnectionError, Message};

/// Receives deliveries and the terminal notification of a connected session.
///
/// Both methods run on the engine task.  They must not block; anything slow
/// should be handed off to another task.  To reconnect from
/// `on_connection_lost`, clone the [`Client`](crate::Client) and call
/// `connect` from a spawned task.
///
/// A panic or an `Err` from `on_message_arrived` is caught by the engine and
/// tears the session down with `INTERNAL_ERROR`.  A panic in
/// `on_connection_lost` is caught and logged; the session is already gone.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionHandler: Send {
    /// A `Send` frame arrived on one of the client's subscriptions.
    fn on_message_arrived(&mut self, message: Message) -> anyhow::Result<()>;

    /// A session that had reached `Connected` has ended.
    ///
    /// Called exactly once per connected session, after all session state has
    /// been released.  `error.code` is `OK` for a caller `disconnect()` and
    /// for a server `Close` with result code 0.
    fn on_connection_lost(&mut self, error: &ConnectionError);
}
