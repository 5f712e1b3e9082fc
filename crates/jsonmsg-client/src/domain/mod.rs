//! Domain layer: configuration and the events the engine reacts to.

pub mod config;
pub mod events;

pub use config::{ClientConfig, ConfigError, FileConfig};
pub use events::{EngineEvent, TimerFired, TimerKind, TransportEvent};
