//! `jsonmsg-client`: command-line publisher and subscriber.
//!
//! # Usage
//!
//! ```text
//! jsonmsg-client --uri ws://broker:8080/ws subscribe '/sensors/#'
//! jsonmsg-client --uri ws://broker:8080/ws publish /sensors/t1 '{"c": 21.5}' --qos 1
//! ```
//!
//! Settings are resolved in this order, first match wins:
//!
//! 1. command-line flags,
//! 2. `JSONMSG_*` environment variables,
//! 3. the TOML file given with `--config`,
//! 4. built-in defaults.
//!
//! Received messages are printed to stdout as one JSON object per line.
//! Logs go to stderr; set `RUST_LOG` to change the level.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jsonmsg_client::domain::FileConfig;
use jsonmsg_client::{Client, ClientConfig, ConnectionHandler};
use jsonmsg_core::{
    ClientError, ConnectOptions, ConnectionError, Message, Qos, RequestFailure, RequestOptions,
    SubscribeOptions,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// json-msg WebSocket client.
#[derive(Debug, Parser)]
#[command(
    name = "jsonmsg-client",
    about = "Publish and subscribe over a json-msg WebSocket broker",
    version
)]
struct Cli {
    /// Broker URI, `ws://host:port/path`.
    #[arg(long, env = "JSONMSG_URI")]
    uri: Option<String>,

    /// Client ID sent in the Connect frame.  Generated when absent.
    #[arg(long, env = "JSONMSG_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "JSONMSG_USER")]
    user: Option<String>,

    #[arg(long, env = "JSONMSG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Keepalive interval in seconds; 0 disables keepalive.
    #[arg(long, env = "JSONMSG_KEEP_ALIVE")]
    keep_alive: Option<u32>,

    /// Seconds to wait for the Connected frame.
    #[arg(long, env = "JSONMSG_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// TOML file with default settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump the protocol trace to stderr on exit.
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Subscribe and print messages until Ctrl+C or connection loss.
    Subscribe {
        /// Topic filter.
        topic: String,

        /// Subscription name; defaults to the topic.
        #[arg(long)]
        name: Option<String>,
    },

    /// Publish one message.
    Publish {
        topic: String,

        /// JSON body.  Anything that is not valid JSON is sent as a string.
        body: String,

        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=2))]
        qos: u8,

        /// Seconds to wait for the server's Ack.
        #[arg(long)]
        ack_timeout: Option<u64>,
    },
}

/// Fully resolved settings.
#[derive(Debug)]
struct Settings {
    config: ClientConfig,
    user: Option<String>,
    password: Option<String>,
    keep_alive: u32,
    connect_timeout: Duration,
    log_level: String,
}

impl Cli {
    /// Merges the command line over the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if no URI is configured or the URI or client ID is
    /// invalid.
    fn resolve(&self, file: FileConfig) -> anyhow::Result<Settings> {
        let uri = self.uri.clone().or(file.uri).context(
            "no broker URI: pass --uri, set JSONMSG_URI or add `uri` to the config file",
        )?;
        let config = match self.client_id.clone().or(file.client_id) {
            Some(id) => ClientConfig::new(uri, id)?,
            None => ClientConfig::with_generated_id(uri)?,
        };
        Ok(Settings {
            config,
            user: self.user.clone().or(file.user),
            password: self.password.clone().or(file.password),
            keep_alive: self.keep_alive.unwrap_or(file.keep_alive),
            connect_timeout: Duration::from_secs(
                self.connect_timeout.unwrap_or(file.connect_timeout),
            ),
            log_level: file.log_level,
        })
    }

    fn load_file(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }
}

impl Settings {
    fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new()
            .keep_alive_interval(self.keep_alive)
            .timeout(self.connect_timeout);
        if let Some(user) = &self.user {
            options = options.user(user.clone());
        }
        if let Some(password) = &self.password {
            options = options.password(password.clone());
        }
        options
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// Prints each message as a JSON line and reports connection loss once.
struct PrintHandler {
    lost: Option<oneshot::Sender<ConnectionError>>,
}

impl ConnectionHandler for PrintHandler {
    fn on_message_arrived(&mut self, message: Message) -> anyhow::Result<()> {
        let line = message_line(&message);
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }

    fn on_connection_lost(&mut self, error: &ConnectionError) {
        if let Some(tx) = self.lost.take() {
            let _ = tx.send(error.clone());
        }
    }
}

fn message_line(message: &Message) -> Value {
    json!({
        "topic": message.destination_name(),
        "subscription": message.subscription_name(),
        "qos": u8::from(message.qos()),
        "retained": message.is_retained(),
        "body": message.payload(),
    })
}

/// Parses a command-line body as JSON, falling back to a plain string.
fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

// ── Completion plumbing ───────────────────────────────────────────────────────

/// A one-shot sender shared by a success and a failure callback.
type Slot<T> = Arc<Mutex<Option<oneshot::Sender<T>>>>;

fn slot<T>() -> (Slot<T>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    (Arc::new(Mutex::new(Some(tx))), rx)
}

fn complete<T>(slot: &Slot<T>, value: T) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(tx) = sender {
        let _ = tx.send(value);
    }
}

/// Connects and waits for the handshake to finish.
async fn connect(client: &Client, settings: &Settings) -> anyhow::Result<()> {
    let (done, finished) = slot::<Result<(), ConnectionError>>();
    let on_ok = Arc::clone(&done);
    let options = settings
        .connect_options()
        .on_success(move || complete(&on_ok, Ok(())))
        .on_failure(move |e| complete(&done, Err(e.clone())));

    client.connect(options).await?;
    match finished.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow!("connect to {} failed: {e}", settings.config.uri())),
        Err(_) => bail!("engine stopped before the connect completed"),
    }
}

async fn wait_for_ack(acked: oneshot::Receiver<Result<(), RequestFailure>>) -> anyhow::Result<()> {
    match acked.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(failure)) => Err(anyhow!("request failed: {failure}")),
        Err(_) => bail!("engine stopped before the request completed"),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn run_subscribe(
    client: &Client,
    lost: oneshot::Receiver<ConnectionError>,
    topic: String,
    name: Option<String>,
) -> anyhow::Result<()> {
    let (done, acked) = slot();
    let on_ok = Arc::clone(&done);
    let mut options = SubscribeOptions::new()
        .on_success(move |_| complete(&on_ok, Ok(())))
        .on_failure(move |_, failure| complete(&done, Err(failure.clone())));
    if let Some(name) = name {
        options = options.name(name);
    }

    let id = client.create_topic_subscription(topic.clone(), options).await?;
    wait_for_ack(acked)
        .await
        .with_context(|| format!("subscribe to {topic} (request {id})"))?;
    info!("subscribed to {topic}; press Ctrl+C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("received Ctrl+C, disconnecting");
        }
        error = lost => {
            if let Ok(error) = error {
                if !error.is_ok() {
                    bail!("connection lost: {error}");
                }
                info!("connection closed: {error}");
            }
        }
    }
    Ok(())
}

async fn run_publish(
    client: &Client,
    topic: String,
    body: String,
    qos: u8,
    ack_timeout: Option<u64>,
) -> anyhow::Result<()> {
    let qos = Qos::try_from(qos).map_err(anyhow::Error::msg)?;
    let message = Message::new(topic.clone(), parse_body(&body)).with_qos(qos);

    let (done, acked) = slot();
    let on_ok = Arc::clone(&done);
    let mut options = RequestOptions::new()
        .on_success(move |_| complete(&on_ok, Ok(())))
        .on_failure(move |_, failure| complete(&done, Err(failure.clone())));
    if let Some(secs) = ack_timeout {
        options = options.timeout(Duration::from_secs(secs));
    }

    let id = client.send(message, options).await?;
    wait_for_ack(acked)
        .await
        .with_context(|| format!("publish to {topic} (request {id})"))?;
    info!("published to {topic} at QoS {}", u8::from(qos));
    Ok(())
}

async fn dump_trace(client: &Client) -> anyhow::Result<()> {
    let Some(entries) = client.trace_log().await? else {
        return Ok(());
    };
    let mut stderr = std::io::stderr().lock();
    for entry in entries {
        let at = entry
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        writeln!(stderr, "{at:.3} {}", entry.text)?;
    }
    Ok(())
}

async fn run(
    client: &Client,
    settings: &Settings,
    command: Command,
    lost: oneshot::Receiver<ConnectionError>,
) -> anyhow::Result<()> {
    connect(client, settings).await?;
    match command {
        Command::Subscribe { topic, name } => run_subscribe(client, lost, topic, name).await,
        Command::Publish {
            topic,
            body,
            qos,
            ack_timeout,
        } => run_publish(client, topic, body, qos, ack_timeout).await,
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = cli.load_file()?;
    let settings = cli.resolve(file)?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .init();

    info!(
        "jsonmsg-client {} connecting to {} as {}",
        env!("CARGO_PKG_VERSION"),
        settings.config.uri(),
        settings.config.client_id()
    );

    let (lost_tx, lost_rx) = oneshot::channel();
    let (client, engine) = Client::spawn(
        settings.config.clone(),
        PrintHandler {
            lost: Some(lost_tx),
        },
    );
    if cli.trace {
        client.start_trace().await?;
    }

    let result = run(&client, &settings, cli.command, lost_rx).await;

    match client.disconnect().await {
        Ok(()) | Err(ClientError::InvalidState(_)) => {}
        Err(e) => warn!("disconnect failed: {e}"),
    }
    if cli.trace {
        dump_trace(&client).await?;
    }
    client.shutdown().await?;
    engine.await.context("engine task failed")?;

    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────
