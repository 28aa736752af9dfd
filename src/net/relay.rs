//! Accept loop and per-connection relay.
//!
//! # Data Flow
//! ```text
//! accept (counts the connection)
//!     → spawn connection task
//!         → TLS handshake (client certificate + OU policy)
//!         → connect to backend (plain TCP)
//!         → client→backend and backend→client copies run concurrently
//!     → first direction to close or fail ends the relay, both legs closed
//!     → guard dropped (connection released)
//! ```
//!
//! # Design Decisions
//! - Every failure after accept is scoped to its own connection
//! - No per-connection deadline: a connection lives until one of its legs closes
//! - The loop owns the listener; it drops it when shutdown is signalled

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::lifecycle::ShutdownSignal;
use crate::net::address::NetAddress;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::tls::ClientIdentity;

/// Why the accept loop stopped.
#[derive(Debug)]
pub enum AcceptLoopExit {
    /// The lifecycle closed the listener.
    Shutdown,
    /// `accept` failed for a reason other than shutdown.
    Failed(io::Error),
}

/// Byte counts of a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// Owns the TLS-wrapped listener and forwards every accepted connection to
/// one backend address.
pub struct RelayEngine {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    backend: NetAddress,
    tracker: ConnectionTracker,
    shutdown: ShutdownSignal,
}

impl RelayEngine {
    pub fn new(
        listener: TcpListener,
        acceptor: TlsAcceptor,
        backend: NetAddress,
        tracker: ConnectionTracker,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            listener,
            acceptor,
            backend,
            tracker,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until shutdown or a fatal accept error.
    ///
    /// The listener is dropped (closed) when this returns; connections
    /// already accepted keep running in their own tasks.
    pub async fn run(self) -> AcceptLoopExit {
        let RelayEngine {
            listener,
            acceptor,
            backend,
            tracker,
            mut shutdown,
        } = self;

        let exit = loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => break AcceptLoopExit::Shutdown,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let guard = tracker.track();
                        tracing::debug!(
                            connection_id = %guard.id(),
                            peer = %peer,
                            active = tracker.active_count(),
                            "Connection accepted"
                        );
                        let span = tracing::info_span!("conn", id = %guard.id(), peer = %peer);
                        let connection = handle_connection(stream, acceptor.clone(), backend.clone(), guard);
                        tokio::spawn(connection.instrument(span));
                    }
                    Err(e) if is_connection_error(&e) => {
                        tracing::debug!(error = %e, "Pending connection failed before accept");
                    }
                    Err(e) => break AcceptLoopExit::Failed(e),
                },
            }
        };

        match &exit {
            AcceptLoopExit::Shutdown => tracing::info!("Listener closed, no longer accepting connections"),
            AcceptLoopExit::Failed(e) => tracing::error!(error = %e, "Accept loop failed, no longer accepting connections"),
        }
        exit
    }
}

/// Accept errors that concern only the one pending connection.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

async fn handle_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    backend: NetAddress,
    _guard: ConnectionGuard,
) {
    let client = match acceptor.accept(stream).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "TLS handshake failed, connection rejected");
            return;
        }
    };

    let identity = client
        .get_ref()
        .1
        .peer_certificates()
        .and_then(ClientIdentity::from_chain)
        .unwrap_or_default();
    tracing::info!(
        client_cn = identity.common_name.as_deref().unwrap_or("-"),
        client_ou = ?identity.organizational_units,
        "Client authenticated"
    );

    let upstream = match TcpStream::connect(backend.as_str()).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!(backend = %backend, error = %e, "Backend unreachable, closing connection");
            return;
        }
    };

    match relay(client, upstream).await {
        Ok(stats) => tracing::info!(
            bytes_up = stats.client_to_backend,
            bytes_down = stats.backend_to_client,
            "Connection closed"
        ),
        Err(e) => tracing::info!(error = %e, "Connection closed with error"),
    }
}

/// Copy bytes in both directions until either side closes or fails.
///
/// The first direction to reach EOF or an error ends the relay: both write
/// halves get a best-effort shutdown and both streams are dropped. Byte
/// counts include the partial progress of the direction that was cut off.
pub async fn relay<C, B>(client: C, backend: B) -> io::Result<RelayStats>
where
    C: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut backend_read, mut backend_write) = tokio::io::split(backend);
    let mut stats = RelayStats::default();

    let finished = tokio::select! {
        result = pipe(&mut client_read, &mut backend_write, &mut stats.client_to_backend) => result,
        result = pipe(&mut backend_read, &mut client_write, &mut stats.backend_to_client) => result,
    };

    // A peer that stopped reading must not keep the connection alive.
    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        let _ = tokio::join!(backend_write.shutdown(), client_write.shutdown());
    })
    .await;

    finished.map(|()| stats)
}

/// Upper bound on the close handshake once a relay has ended.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

const COPY_BUFFER_SIZE: usize = 16 * 1024;

async fn pipe<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *copied += n as u64;
    }
}
