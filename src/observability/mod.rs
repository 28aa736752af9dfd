//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems emit `tracing` events with structured fields
//!     → logging.rs installs one subscriber at startup
//!     → stderr (default) or the system log (`--syslog`)
//! ```
//!
//! # Design Decisions
//! - The subscriber is configured once, in `main`; library code never
//!   touches logger state and runs unchanged under tests
//! - Every event sits under a `proxy{pid=..}` span so parent and child lines
//!   can be told apart during a reload

pub mod logging;
