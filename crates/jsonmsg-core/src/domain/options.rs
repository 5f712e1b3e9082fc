//! Typed option structures for `connect`, subscribe and per-request calls.
//!
//! Options are built with consuming builder methods and checked with
//! `validate()` before the engine acts on them.  Inconsistent combinations
//! (a password without a user, a request timeout nobody is listening for)
//! are rejected with [`ClientError::InvalidArgument`] at the call site rather
//! than discovered later on the wire.

use std::fmt;
use std::time::Duration;

use crate::error::{ClientError, ConnectionError};
use crate::protocol::correlation::{FailureCallback, RequestFailure, RequestTarget, SuccessCallback};

/// Default time allowed for the transport to open and the server to answer
/// the `Connect` frame.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default keepalive interval advertised in the `Connect` frame, in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u32 = 60;

/// Invoked once when the `Connected` frame arrives.
pub type ConnectSuccessCallback = Box<dyn FnOnce() + Send>;

/// Invoked once if the session ends before `Connected` was reached.
pub type ConnectFailureCallback = Box<dyn FnOnce(&ConnectionError) + Send>;

// ── ConnectOptions ────────────────────────────────────────────────────────────

/// Options for a single `connect` attempt.
///
/// ```rust
/// use std::time::Duration;
/// use jsonmsg_core::ConnectOptions;
///
/// let opts = ConnectOptions::new()
///     .user("alice")
///     .password("secret")
///     .keep_alive_interval(20)
///     .timeout(Duration::from_secs(5));
/// assert!(opts.validate().is_ok());
/// ```
pub struct ConnectOptions {
    user: Option<String>,
    password: Option<String>,
    keep_alive_interval: u32,
    timeout: Duration,
    on_success: Option<ConnectSuccessCallback>,
    on_failure: Option<ConnectFailureCallback>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Keepalive interval in seconds.  `0` disables liveness checking.
    pub fn keep_alive_interval(mut self, secs: u32) -> Self {
        self.keep_alive_interval = secs;
        self
    }

    /// Connect timeout covering both the transport open and the handshake.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn on_success(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl FnOnce(&ConnectionError) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password_value(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn keep_alive_secs(&self) -> u32 {
        self.keep_alive_interval
    }

    pub fn connect_timeout(&self) -> Duration {
        self.timeout
    }

    /// Moves the success callback out, leaving `None` behind.
    pub fn take_on_success(&mut self) -> Option<ConnectSuccessCallback> {
        self.on_success.take()
    }

    /// Moves the failure callback out, leaving `None` behind.
    pub fn take_on_failure(&mut self) -> Option<ConnectFailureCallback> {
        self.on_failure.take()
    }

    /// Checks the option combination.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] if a password is given without
    /// a user, the user name is empty, or the timeout is zero.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.password.is_some() && self.user.is_none() {
            return Err(ClientError::InvalidArgument(
                "a password requires a user name".to_string(),
            ));
        }
        if self.user.as_deref() == Some("") {
            return Err(ClientError::InvalidArgument(
                "user name must not be empty".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidArgument(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_SECS,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            on_success: None,
            on_failure: None,
        }
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "******"))
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("timeout", &self.timeout)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

// ── RequestOptions ────────────────────────────────────────────────────────────

/// Callbacks and timeout for one correlated request.
#[derive(Default)]
pub struct RequestOptions {
    timeout: Option<Duration>,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the request with [`RequestFailure::Timeout`] if no `Ack`
    /// arrives within `timeout`.  Requires an `on_failure` handler.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(&RequestTarget) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure(
        mut self,
        f: impl FnOnce(&RequestTarget, &RequestFailure) + Send + 'static,
    ) -> Self {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Checks the option combination.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidArgument`] for a zero timeout, or a
    /// timeout without an `on_failure` handler to report it to.
    pub fn validate(&self) -> Result<(), ClientError> {
        match self.timeout {
            Some(t) if t.is_zero() => Err(ClientError::InvalidArgument(
                "request timeout must be greater than zero".to_string(),
            )),
            Some(_) if self.on_failure.is_none() => Err(ClientError::InvalidArgument(
                "a request timeout requires an on_failure handler".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn into_parts(
        self,
    ) -> (
        Option<Duration>,
        Option<SuccessCallback>,
        Option<FailureCallback>,
    ) {
        (self.timeout, self.on_success, self.on_failure)
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("timeout", &self.timeout)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

// ── SubscribeOptions ──────────────────────────────────────────────────────────

/// Options for `create_topic_subscription`.
///
/// The subscription `name` defaults to the topic filter when not given.
#[derive(Debug, Default)]
pub struct SubscribeOptions {
    name: Option<String>,
    request: RequestOptions,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request = self.request.timeout(timeout);
        self
    }

    pub fn on_success(mut self, f: impl FnOnce(&RequestTarget) + Send + 'static) -> Self {
        self.request = self.request.on_success(f);
        self
    }

    pub fn on_failure(
        mut self,
        f: impl FnOnce(&RequestTarget, &RequestFailure) + Send + 'static,
    ) -> Self {
        self.request = self.request.on_failure(f);
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.as_deref() == Some("") {
            return Err(ClientError::InvalidArgument(
                "subscription name must not be empty".to_string(),
            ));
        }
        self.request.validate()
    }

    pub fn into_parts(self) -> (Option<String>, RequestOptions) {
        (self.name, self.request)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
