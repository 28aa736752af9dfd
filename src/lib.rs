//! Mutual-TLS terminating TCP proxy with zero-downtime reload.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::StartupConfig;
pub use error::ProxyError;
pub use lifecycle::{launch, DrainOutcome, ProxyHandle, Shutdown};
