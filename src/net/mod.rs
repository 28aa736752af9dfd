//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! "host:port" (address.rs)
//!     → listener.rs (port-sharing bind)
//!     → relay.rs (accept loop)
//!         → tls.rs (handshake, client certificate + OU policy)
//!         → connection.rs (live-connection tracking)
//!         → backend TCP connection, bidirectional copy
//!
//! Connection States:
//!     Accepted → Handshaking → Relaying → Closed
//! ```
//!
//! # Design Decisions
//! - Each connection tracked for graceful shutdown
//! - TLS terminates here; the backend leg is plain TCP

pub mod address;
pub mod connection;
pub mod listener;
pub mod relay;
pub mod tls;
