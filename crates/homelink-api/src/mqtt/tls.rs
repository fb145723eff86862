// ── Broker TLS ──
//
// The broker is trusted through a pinned root CA embedded in the binary.
// Certificates are always checked against the broker's canonical host
// name, even when the connection is dialed through an address (IP,
// alias) that the certificate does not name.

use std::io::Cursor;
use std::sync::Arc;

use rumqttc::tokio_rustls::rustls;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use crate::error::Error;

/// DigiCert Global Root G2, the anchor of the deployed broker's chain.
pub const PINNED_ROOT_PEM: &[u8] = include_bytes!("../../certs/digicert-global-root-g2.pem");

/// Client config trusting only the CA(s) in `ca_pem`.
pub fn pinned_client_config(ca_pem: &[u8], canonical_host: &str) -> Result<Arc<ClientConfig>, Error> {
    let mut roots = RootCertStore::empty();
    for cert in parse_pem(ca_pem)? {
        roots
            .add(cert)
            .map_err(|e| Error::Tls(format!("pinned CA rejected: {e}")))?;
    }
    if roots.is_empty() {
        return Err(Error::Tls("no certificates in pinned CA bundle".into()));
    }
    build(roots, canonical_host)
}

/// Client config trusting the platform's native trust store.
pub fn native_client_config(canonical_host: &str) -> Result<Arc<ClientConfig>, Error> {
    let native = rustls_native_certs::load_native_certs()
        .map_err(|e| Error::Tls(format!("failed to load native certificates: {e}")))?;
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(native);
    debug!(added, ignored, "loaded native trust store");
    if added == 0 {
        return Err(Error::Tls("native trust store is empty".into()));
    }
    build(roots, canonical_host)
}

fn parse_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    rustls_pemfile::certs(&mut Cursor::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("invalid PEM: {e}")))
}

fn build(roots: RootCertStore, canonical_host: &str) -> Result<Arc<ClientConfig>, Error> {
    let verifier = CanonicalNameVerifier::new(roots, canonical_host)?;
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// WebPKI verification pinned to one server name.
#[derive(Debug)]
struct CanonicalNameVerifier {
    inner: Arc<WebPkiServerVerifier>,
    server_name: ServerName<'static>,
}

impl CanonicalNameVerifier {
    fn new(roots: RootCertStore, canonical_host: &str) -> Result<Self, Error> {
        let server_name = ServerName::try_from(canonical_host)
            .map_err(|e| Error::Tls(format!("invalid broker host name `{canonical_host}`: {e}")))?
            .to_owned();
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| Error::Tls(format!("failed to build certificate verifier: {e}")))?;
        Ok(Self { inner, server_name })
    }
}

impl ServerCertVerifier for CanonicalNameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        dialed: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let result = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            &self.server_name,
            ocsp_response,
            now,
        );
        if let Err(e) = &result {
            warn!(dialed = ?dialed, expected = ?self.server_name, error = %e, "broker certificate rejected");
        }
        result
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
