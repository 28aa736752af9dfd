//! TLS policy: key material loading and client-certificate authorization.
//!
//! # Responsibilities
//! - Load the server key pair and the client CA bundle from PEM files
//! - Require a client certificate chaining to the CA bundle
//! - Authorize the client by organizational unit (OU)
//!
//! # Design Decisions
//! - Chain verification is delegated to webpki; the OU check wraps it and
//!   only runs once the chain is known to be trusted
//! - The policy is built once and is immutable; new certificate material
//!   is picked up by spawning a replacement process, never by swapping in place

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::WebPkiClientVerifier;
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, RootCertStore, ServerConfig, SignatureScheme};
use tokio_rustls::TlsAcceptor;
use x509_parser::parse_x509_certificate;

use crate::config::TlsSettings;
use crate::error::ProxyError;

/// Immutable server-side TLS policy shared by every handshake.
#[derive(Clone)]
pub struct TlsPolicy {
    acceptor: TlsAcceptor,
    allowed_ous: Arc<BTreeSet<String>>,
}

impl TlsPolicy {
    /// Load key material and assemble the server configuration.
    pub fn build(settings: &TlsSettings) -> Result<Self, ProxyError> {
        let provider = crypto_provider();

        let certs = load_certificates(&settings.cert_path)?;
        let key = load_private_key(&settings.key_path)?;
        let roots = load_trust_store(&settings.ca_bundle_path)?;

        let allowed_ous = Arc::new(settings.allowed_ous.clone());
        let webpki = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
            .build()
            .map_err(|e| ProxyError::TrustStore {
                path: settings.ca_bundle_path.clone(),
                reason: e.to_string(),
            })?;
        let verifier = OrgUnitVerifier {
            inner: webpki,
            allowed_ous: Arc::clone(&allowed_ous),
        };

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ProxyError::Tls(e.to_string()))?
            .with_client_cert_verifier(Arc::new(verifier))
            .with_single_cert(certs, key)
            .map_err(|e| ProxyError::KeyMaterial {
                path: settings.key_path.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            cert = %settings.cert_path.display(),
            ca_bundle = %settings.ca_bundle_path.display(),
            allowed_ous = ?allowed_ous,
            "TLS policy loaded"
        );

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
            allowed_ous,
        })
    }

    /// Acceptor performing the server side of the handshake.
    pub fn acceptor(&self) -> TlsAcceptor {
        self.acceptor.clone()
    }

    pub fn allowed_ous(&self) -> &BTreeSet<String> {
        &self.allowed_ous
    }
}

/// Subject fields of a verified client, used for audit logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    pub common_name: Option<String>,
    pub organizational_units: Vec<String>,
}

impl ClientIdentity {
    /// Read the subject of the client's leaf certificate.
    pub fn from_chain(chain: &[CertificateDer<'_>]) -> Option<Self> {
        let (_, cert) = parse_x509_certificate(chain.first()?.as_ref()).ok()?;
        let subject = cert.subject();
        let identity = Self {
            common_name: subject
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string),
            organizational_units: subject
                .iter_organizational_unit()
                .filter_map(|ou| ou.as_str().ok())
                .map(str::to_string)
                .collect(),
        };
        Some(identity)
    }
}

/// Client verifier: webpki chain validation followed by the OU allow-list.
#[derive(Debug)]
struct OrgUnitVerifier {
    inner: Arc<dyn ClientCertVerifier>,
    allowed_ous: Arc<BTreeSet<String>>,
}

impl ClientCertVerifier for OrgUnitVerifier {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        self.inner.root_hint_subjects()
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        let verified = self.inner.verify_client_cert(end_entity, intermediates, now)?;

        if chain_has_allowed_ou(end_entity, intermediates, &self.allowed_ous) {
            Ok(verified)
        } else {
            tracing::warn!(
                client = ?ClientIdentity::from_chain(std::slice::from_ref(end_entity)),
                "Client certificate rejected: no accepted organizational unit"
            );
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// True when the leaf or any intermediate names an OU from `allowed`.
pub fn chain_has_allowed_ou(
    end_entity: &CertificateDer<'_>,
    intermediates: &[CertificateDer<'_>],
    allowed: &BTreeSet<String>,
) -> bool {
    cert_has_allowed_ou(end_entity, allowed)
        || intermediates.iter().any(|cert| cert_has_allowed_ou(cert, allowed))
}

// Certificates that fail to parse simply do not match.
fn cert_has_allowed_ou(der: &CertificateDer<'_>, allowed: &BTreeSet<String>) -> bool {
    parse_x509_certificate(der.as_ref())
        .map(|(_, cert)| {
            cert.subject()
                .iter_organizational_unit()
                .filter_map(|ou| ou.as_str().ok())
                .any(|ou| allowed.contains(ou))
        })
        .unwrap_or(false)
}

/// Load a certificate chain from a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProxyError> {
    let key_err = |reason: String| ProxyError::KeyMaterial {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| key_err(format!("failed to open certificate chain: {e}")))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| key_err(format!("failed to parse certificate chain: {e}")))?;

    if certs.is_empty() {
        return Err(key_err("no certificates found".into()));
    }

    tracing::debug!(path = %path.display(), count = certs.len(), "Loaded certificate chain");
    Ok(certs)
}

/// Load a private key (PKCS#1, PKCS#8 or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ProxyError> {
    let key_err = |reason: String| ProxyError::KeyMaterial {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| key_err(format!("failed to open private key: {e}")))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| key_err(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| key_err("no private key found".into()))
}

/// Load the client CA bundle into a trust pool.
pub fn load_trust_store(path: &Path) -> Result<RootCertStore, ProxyError> {
    let trust_err = |reason: String| ProxyError::TrustStore {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| trust_err(format!("failed to open CA bundle: {e}")))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| trust_err(format!("failed to parse CA bundle: {e}")))?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(trust_err("CA bundle contains no usable certificates".into()));
    }
    if ignored > 0 {
        tracing::warn!(path = %path.display(), ignored, "Ignored unparsable CA certificates");
    }

    tracing::debug!(path = %path.display(), count = added, "Loaded CA bundle");
    Ok(roots)
}

/// Crypto provider backing every TLS configuration in the crate.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};
    use std::io::Write;

    fn cert_with_ous(ous: &[&str]) -> CertificateDer<'static> {
        let mut params = CertificateParams::new(vec!["client.test".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "client");
        for ou in ous {
            params.distinguished_name.push(DnType::OrganizationalUnitName, *ou);
        }
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    fn allow(ous: &[&str]) -> BTreeSet<String> {
        ous.iter().map(|s| s.to_string()).collect()
    }

    fn pem_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn matching_ou_is_accepted() {
        let cert = cert_with_ous(&["ops"]);
        assert!(chain_has_allowed_ou(&cert, &[], &allow(&["ops", "dev"])));
    }

    #[test]
    fn disjoint_ou_is_rejected() {
        let cert = cert_with_ous(&["guest"]);
        assert!(!chain_has_allowed_ou(&cert, &[], &allow(&["ops"])));
    }

    #[test]
    fn any_certificate_in_chain_may_match() {
        let leaf = cert_with_ous(&["guest"]);
        let intermediate = cert_with_ous(&["ops"]);
        assert!(chain_has_allowed_ou(&leaf, &[intermediate], &allow(&["ops"])));
    }

    #[test]
    fn certificate_without_ou_is_rejected() {
        let cert = cert_with_ous(&[]);
        assert!(!chain_has_allowed_ou(&cert, &[], &allow(&["ops"])));
    }

    #[test]
    fn garbage_der_does_not_match() {
        let junk = CertificateDer::from(vec![0x30, 0x03, 0x02, 0x01, 0x00]);
        assert!(!chain_has_allowed_ou(&junk, &[], &allow(&["ops"])));
    }

    #[test]
    fn identity_reads_subject() {
        let cert = cert_with_ous(&["ops"]);
        let identity = ClientIdentity::from_chain(&[cert]).unwrap();
        assert_eq!(identity.common_name.as_deref(), Some("client"));
        assert_eq!(identity.organizational_units, vec!["ops"]);
    }

    #[test]
    fn missing_key_file_is_key_material_error() {
        let err = load_private_key(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(matches!(err, ProxyError::KeyMaterial { .. }));
    }

    #[test]
    fn pem_without_key_is_key_material_error() {
        let file = pem_file("not a pem file\n");
        let err = load_private_key(file.path()).unwrap_err();
        assert!(matches!(err, ProxyError::KeyMaterial { .. }));
    }

    #[test]
    fn empty_ca_bundle_is_trust_store_error() {
        let file = pem_file("");
        let err = load_trust_store(file.path()).unwrap_err();
        assert!(matches!(err, ProxyError::TrustStore { .. }));
    }

    #[test]
    fn ca_bundle_loads_certificates() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "test ca");
        let ca = params.self_signed(&key).unwrap();

        let file = pem_file(&ca.pem());
        let roots = load_trust_store(file.path()).unwrap();
        assert_eq!(roots.len(), 1);
    }
}
