//! The engine task and its [`Client`] handle.
//!
//! [`Client::spawn`] moves a [`Connection`] into a tokio task.  The task
//! selects over two unbounded queues:
//!
//! - **commands** from [`Client`] handles, each carrying a `oneshot` reply,
//! - **events** from the transport and timers.
//!
//! Each item is handled to completion before the next is taken, so caller
//! operations, deliveries and timer fires never interleave.
//!
//! The task exits on [`Client::shutdown`] or once every `Client` clone has
//! been dropped.  Either way a live session is disconnected first.
//!
//! # Reconnecting from a callback
//!
//! Callbacks run on the engine task and must not await it.  To reconnect
//! after a loss, move a `Client` clone into a spawned task:
//!
//! ```rust,ignore
//! fn on_connection_lost(&mut self, _error: &ConnectionError) {
//!     let client = self.client.clone();
//!     tokio::spawn(async move { client.connect(ConnectOptions::new()).await });
//! }
//! ```

use std::sync::Arc;

use jsonmsg_core::{
    ClientError, ConnectOptions, Message, RequestOptions, SubscribeOptions, TraceEntry,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::transport::websocket::WsConnector;
use super::transport::Connector;
use crate::application::connection::{Connection, ConnectionState};
use crate::application::handler::ConnectionHandler;
use crate::domain::config::ClientConfig;
use crate::domain::events::EngineEvent;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Connect {
        options: ConnectOptions,
        reply: Reply<Result<(), ClientError>>,
    },
    Disconnect {
        reply: Reply<Result<(), ClientError>>,
    },
    Subscribe {
        topic: String,
        options: SubscribeOptions,
        reply: Reply<Result<u64, ClientError>>,
    },
    CloseSubscription {
        name: String,
        options: RequestOptions,
        reply: Reply<Result<u64, ClientError>>,
    },
    DestroySubscription {
        name: String,
        options: RequestOptions,
        reply: Reply<Result<u64, ClientError>>,
    },
    Send {
        message: Message,
        options: RequestOptions,
        reply: Reply<Result<u64, ClientError>>,
    },
    StartTrace {
        reply: Reply<()>,
    },
    StopTrace {
        reply: Reply<()>,
    },
    TraceLog {
        reply: Reply<Option<Vec<TraceEntry>>>,
    },
    State {
        reply: Reply<ConnectionState>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle to one engine task.
///
/// Every method returns [`ClientError::EngineStopped`] once the task has
/// exited.
#[derive(Debug, Clone)]
pub struct Client {
    commands: UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Connect { .. } => "Connect",
            Command::Disconnect { .. } => "Disconnect",
            Command::Subscribe { .. } => "Subscribe",
            Command::CloseSubscription { .. } => "CloseSubscription",
            Command::DestroySubscription { .. } => "DestroySubscription",
            Command::Send { .. } => "Send",
            Command::StartTrace { .. } => "StartTrace",
            Command::StopTrace { .. } => "StopTrace",
            Command::TraceLog { .. } => "TraceLog",
            Command::State { .. } => "State",
            Command::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

impl Client {
    /// Starts an engine that connects over WebSocket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<H>(config: ClientConfig, handler: H) -> (Client, JoinHandle<()>)
    where
        H: ConnectionHandler + 'static,
    {
        Self::spawn_with_connector(config, handler, Arc::new(WsConnector))
    }

    /// Starts an engine on a caller-supplied transport.
    pub fn spawn_with_connector<H>(
        config: ClientConfig,
        handler: H,
        connector: Arc<dyn Connector>,
    ) -> (Client, JoinHandle<()>)
    where
        H: ConnectionHandler + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connection = Connection::new(config, connector, Box::new(handler), event_tx);
        let task = tokio::spawn(run_engine(connection, command_rx, event_rx));
        (
            Client {
                commands: command_tx,
            },
            task,
        )
    }

    /// Starts a session.  Completion is reported through the options'
    /// callbacks; this returns as soon as the transport is opening.
    pub async fn connect(&self, options: ConnectOptions) -> Result<(), ClientError> {
        self.call(|reply| Command::Connect { options, reply }).await?
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.call(|reply| Command::Disconnect { reply }).await?
    }

    /// Subscribes to a topic filter.  Returns the request ID.
    pub async fn create_topic_subscription(
        &self,
        topic: impl Into<String>,
        options: SubscribeOptions,
    ) -> Result<u64, ClientError> {
        let topic = topic.into();
        self.call(|reply| Command::Subscribe {
            topic,
            options,
            reply,
        })
        .await?
    }

    pub async fn close_topic_subscription(
        &self,
        name: impl Into<String>,
        options: RequestOptions,
    ) -> Result<u64, ClientError> {
        let name = name.into();
        self.call(|reply| Command::CloseSubscription {
            name,
            options,
            reply,
        })
        .await?
    }

    pub async fn destroy_topic_subscription(
        &self,
        name: impl Into<String>,
        options: RequestOptions,
    ) -> Result<u64, ClientError> {
        let name = name.into();
        self.call(|reply| Command::DestroySubscription {
            name,
            options,
            reply,
        })
        .await?
    }

    /// Publishes a message.  Returns the request ID.
    pub async fn send(&self, message: Message, options: RequestOptions) -> Result<u64, ClientError> {
        self.call(|reply| Command::Send {
            message,
            options,
            reply,
        })
        .await?
    }

    /// Clears the trace buffer and starts recording.
    pub async fn start_trace(&self) -> Result<(), ClientError> {
        self.call(|reply| Command::StartTrace { reply }).await
    }

    pub async fn stop_trace(&self) -> Result<(), ClientError> {
        self.call(|reply| Command::StopTrace { reply }).await
    }

    /// The recorded trace, or `None` while tracing is off.
    pub async fn trace_log(&self) -> Result<Option<Vec<TraceEntry>>, ClientError> {
        self.call(|reply| Command::TraceLog { reply }).await
    }

    pub async fn state(&self) -> Result<ConnectionState, ClientError> {
        self.call(|reply| Command::State { reply }).await
    }

    /// Disconnects any live session and stops the engine task.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.call(|reply| Command::Shutdown { reply }).await
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, ClientError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| ClientError::EngineStopped)?;
        response.await.map_err(|_| ClientError::EngineStopped)
    }
}

async fn run_engine(
    mut connection: Connection,
    mut commands: UnboundedReceiver<Command>,
    mut events: UnboundedReceiver<EngineEvent>,
) {
    info!("engine started for client {}", connection.config().client_id());
    let mut shutdown_reply = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => connection.handle_event(event),
                // The connection holds a sender, so this never closes first.
                None => break,
            },
            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    shutdown_reply = Some(reply);
                    break;
                }
                Some(command) => {
                    debug!("command {command:?}");
                    apply(&mut connection, command);
                }
                None => {
                    debug!("all client handles dropped");
                    break;
                }
            },
        }
    }

    connection.shutdown();
    info!("engine stopped for client {}", connection.config().client_id());
    if let Some(reply) = shutdown_reply {
        let _ = reply.send(());
    }
}

/// Runs one caller command.  A dropped reply receiver is not an error.
fn apply(connection: &mut Connection, command: Command) {
    match command {
        Command::Connect { options, reply } => {
            let _ = reply.send(connection.connect(options));
        }
        Command::Disconnect { reply } => {
            let _ = reply.send(connection.disconnect());
        }
        Command::Subscribe {
            topic,
            options,
            reply,
        } => {
            let _ = reply.send(connection.create_topic_subscription(&topic, options));
        }
        Command::CloseSubscription {
            name,
            options,
            reply,
        } => {
            let _ = reply.send(connection.close_topic_subscription(&name, options));
        }
        Command::DestroySubscription {
            name,
            options,
            reply,
        } => {
            let _ = reply.send(connection.destroy_topic_subscription(&name, options));
        }
        Command::Send {
            message,
            options,
            reply,
        } => {
            let _ = reply.send(connection.send(message, options));
        }
        Command::StartTrace { reply } => {
            connection.start_trace();
            let _ = reply.send(());
        }
        Command::StopTrace { reply } => {
            connection.stop_trace();
            let _ = reply.send(());
        }
        Command::TraceLog { reply } => {
            let _ = reply.send(connection.trace_log());
        }
        Command::State { reply } => {
            let _ = reply.send(connection.state());
        }
        // Handled by the loop.
        Command::Shutdown { reply } => {
            let _ = reply.send(());
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handler::MockConnectionHandler;
    use crate::infrastructure::transport::mock::MockConnector;

    fn spawn_mock() -> (Client, JoinHandle<()>, MockConnector) {
        let connector = MockConnector::new();
        let config = ClientConfig::new("ws://broker/ws", "engine-test").unwrap();
        let (client, task) = Client::spawn_with_connector(
            config,
            MockConnectionHandler::new(),
            Arc::new(connector.clone()),
        );
        (client, task, connector)
    }

    #[tokio::test]
    async fn test_new_engine_is_disconnected() {
        let (client, _task, _connector) = spawn_mock();

        assert_eq!(client.state().await.unwrap(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_opens_one_transport() {
        // Arrange
        let (client, _task, connector) = spawn_mock();

        // Act
        client.connect(ConnectOptions::new()).await.unwrap();

        // Assert
        assert_eq!(connector.open_count(), 1);
        assert_eq!(client.state().await.unwrap(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_misuse_errors_are_returned_to_the_caller() {
        let (client, _task, _connector) = spawn_mock();

        let result = client
            .create_topic_subscription("/a", SubscribeOptions::new())
            .await;

        assert!(matches!(result, Err(ClientError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_task() {
        // Arrange
        let (client, task, _connector) = spawn_mock();

        // Act
        client.shutdown().await.unwrap();
        task.await.unwrap();

        // Assert
        assert_eq!(client.state().await, Err(ClientError::EngineStopped));
    }

    #[tokio::test]
    async fn test_dropping_every_handle_stops_the_task() {
        let (client, task, _connector) = spawn_mock();
        let clone = client.clone();

        drop(client);
        drop(clone);

        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_live_transport() {
        // Arrange
        let (client, task, connector) = spawn_mock();
        client.connect(ConnectOptions::new()).await.unwrap();

        // Act
        client.shutdown().await.unwrap();
        task.await.unwrap();

        // Assert
        assert!(connector.last_socket().unwrap().was_closed());
    }
}
