//! Shared utilities for integration testing.
//!
//! Builds a throwaway PKI (CA, server certificate, client certificates with
//! organizational units), an echo backend, and mutual-TLS test clients.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use mtls_proxy::config::{StartupConfig, TlsSettings};
use mtls_proxy::error::ProxyError;
use mtls_proxy::lifecycle::{EventSender, ProcessControl};
use mtls_proxy::net::address::NetAddress;
use mtls_proxy::net::tls::crypto_provider;

static TRACING: Once = Once::new();

/// Route proxy logs to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A CA plus the server key pair it issued, written out as PEM files.
pub struct TestPki {
    dir: TempDir,
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.distinguished_name.push(DnType::CommonName, "mtls-proxy test ca");
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let mut server_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        server_params.distinguished_name.push(DnType::CommonName, "localhost");
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_cert = server_params.signed_by(&server_key, &ca_cert, &ca_key).unwrap();

        std::fs::write(dir.path().join("ca.pem"), ca_cert.pem()).unwrap();
        std::fs::write(dir.path().join("cert.pem"), server_cert.pem()).unwrap();
        std::fs::write(dir.path().join("key.pem"), server_key.serialize_pem()).unwrap();

        Self { dir, ca_cert, ca_key }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn tls_settings(&self, allowed_ous: &[&str]) -> TlsSettings {
        TlsSettings {
            key_path: self.path("key.pem"),
            cert_path: self.path("cert.pem"),
            ca_bundle_path: self.path("ca.pem"),
            allowed_ous: allowed_ous.iter().map(|ou| ou.to_string()).collect(),
        }
    }

    /// Connector presenting a client certificate with the given OU
    /// (or with none when `ou` is `None`).
    pub fn client_with_ou(&self, ou: Option<&str>) -> TlsConnector {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, "test client");
        if let Some(ou) = ou {
            params.distinguished_name.push(DnType::OrganizationalUnitName, ou);
        }
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let cert = params.signed_by(&key, &self.ca_cert, &self.ca_key).unwrap();

        let config = self
            .client_config()
            .with_client_auth_cert(
                vec![cert.der().clone()],
                PrivatePkcs8KeyDer::from(key.serialize_der()).into(),
            )
            .unwrap();
        TlsConnector::from(Arc::new(config))
    }

    /// Connector that offers no client certificate at all.
    pub fn client_without_cert(&self) -> TlsConnector {
        let config = self.client_config().with_no_client_auth();
        TlsConnector::from(Arc::new(config))
    }

    fn client_config(&self) -> rustls::ConfigBuilder<ClientConfig, rustls::client::WantsClientCert> {
        let mut roots = RootCertStore::empty();
        let ca: CertificateDer<'static> = self.ca_cert.der().clone();
        roots.add(ca).unwrap();

        ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
    }
}

/// Startup settings for a proxy on an ephemeral loopback port.
pub fn startup_config(pki: &TestPki, target: SocketAddr, allowed_ous: &[&str]) -> StartupConfig {
    StartupConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        target: target.to_string().parse::<NetAddress>().unwrap(),
        tls: pki.tls_settings(allowed_ous),
        syslog: false,
        graceful_child: false,
        drain_timeout: None,
    }
}

/// Echo server counting the connections it accepted.
pub struct EchoBackend {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl EchoBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let (mut reader, mut writer) = socket.split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                    let _ = writer.shutdown().await;
                });
            }
        });

        Self { addr, accepted }
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Backend that accepts and reads but never writes or closes.
pub async fn silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut sink = [0u8; 1024];
                while matches!(socket.read(&mut sink).await, Ok(n) if n > 0) {}
                // Keep the socket open after EOF.
                std::future::pending::<()>().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Open a mutual-TLS connection to the proxy.
pub async fn connect(
    connector: &TlsConnector,
    proxy: SocketAddr,
) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(proxy).await?;
    let name = ServerName::try_from("localhost").unwrap();
    connector.connect(name, tcp).await
}

/// Send `payload` and read back as many bytes.
pub async fn round_trip(stream: &mut TlsStream<TcpStream>, payload: &[u8]) -> Vec<u8> {
    stream.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("echo within deadline")
        .unwrap();
    buf
}

/// Whether the proxy dropped the connection without relaying anything.
///
/// With TLS 1.3 a rejected client certificate surfaces on the first read,
/// not during `connect`.
pub async fn is_refused(result: std::io::Result<TlsStream<TcpStream>>) -> bool {
    let mut stream = match result {
        Ok(stream) => stream,
        Err(_) => return true,
    };
    let _ = stream.write_all(b"hello").await;
    let mut buf = [0u8; 16];
    match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) => false,
        Err(_) => panic!("proxy neither relayed nor closed the connection"),
    }
}

/// Poll `condition` until it holds or the deadline passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Process control for a proxy that never reloads.
#[derive(Debug, Default, Clone)]
pub struct NoReload;

impl ProcessControl for NoReload {
    fn spawn_replacement(&self, _events: &EventSender) -> Result<u32, ProxyError> {
        Err(ProxyError::Spawn(std::io::Error::other("reload disabled in tests")))
    }

    fn announce_ready(&self) -> Result<(), ProxyError> {
        Ok(())
    }
}
