//! Port-sharing TCP listener.
//!
//! # Responsibilities
//! - Resolve the listen address without blocking the runtime
//! - Bind it so that a sibling process can bind it too
//! - Hand the bound socket to Tokio
//!
//! # Design Decisions
//! - Concurrent bind is a platform capability (`SharedPortBinder`); the
//!   implementation here relies on `SO_REUSEPORT`, so the crate is Unix-only
//! - During a reload the old and the new process each own an independent
//!   listener on the same port, so the port is never unbound

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;

use crate::error::ProxyError;
use crate::net::address::NetAddress;

/// Pending-connection queue length passed to `listen(2)`.
const LISTEN_BACKLOG: i32 = 1024;

/// A listener factory whose sockets tolerate concurrent binds of the same
/// address by independent processes.
pub trait SharedPortBinder: Send + Sync {
    /// Bind a listening socket on `addr`. Must be called from within a
    /// Tokio runtime.
    fn bind(&self, addr: SocketAddr) -> Result<TcpListener, ProxyError>;
}

/// `SO_REUSEPORT` based binder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReusePortBinder;

impl SharedPortBinder for ReusePortBinder {
    fn bind(&self, addr: SocketAddr) -> Result<TcpListener, ProxyError> {
        let bind_err = |e| ProxyError::bind(addr.to_string(), e);

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.set_reuse_port(true).map_err(bind_err)?;
        if let SocketAddr::V6(v6) = addr {
            if v6.ip().is_unspecified() {
                socket.set_only_v6(false).map_err(bind_err)?;
            }
        }
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;

        let listener = TcpListener::from_std(socket.into()).map_err(bind_err)?;

        tracing::debug!(address = %addr, "Bound port-sharing listener");
        Ok(listener)
    }
}

/// Resolve a listen address to the first socket address it names.
///
/// IP literals resolve without a lookup; hostnames go through Tokio's
/// resolver off the runtime threads.
pub async fn resolve(address: &NetAddress) -> Result<SocketAddr, ProxyError> {
    let mut addrs = tokio::net::lookup_host(address.as_str())
        .await
        .map_err(|e| ProxyError::bind(address.as_str(), e))?;
    let addr = addrs.next().ok_or_else(|| {
        ProxyError::bind(
            address.as_str(),
            std::io::Error::new(std::io::ErrorKind::NotFound, "address did not resolve"),
        )
    })?;

    tracing::debug!(address = %address, family = %address.family(), resolved = %addr, "Resolved listen address");
    Ok(addr)
}
