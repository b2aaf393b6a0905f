//! Trusted certificate authorities

use std::fmt;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;

use super::CertificateChain;
use crate::error::{CertificateError, ConfigError, MtlsResult, TrustLoadError};
use crate::tls::crypto_provider;

/// Set of trusted CA certificates, read-only after load
#[derive(Clone)]
pub struct TrustStore {
    roots: Arc<RootCertStore>,
    source: String,
}

impl TrustStore {
    /// Build a store from DER certificates
    ///
    /// Every certificate must be a usable trust anchor, and at least one must
    /// be present.
    pub fn from_certificates(
        certificates: impl IntoIterator<Item = CertificateDer<'static>>,
        source: impl Into<String>,
    ) -> Result<Self, TrustLoadError> {
        let source = source.into();
        let mut roots = RootCertStore::empty();
        for (index, cert) in certificates.into_iter().enumerate() {
            roots.add(cert).map_err(|e| TrustLoadError::Malformed {
                path: source.clone(),
                reason: format!("certificate #{} is not a valid trust anchor: {}", index, e),
            })?;
        }
        if roots.is_empty() {
            return Err(TrustLoadError::Malformed {
                path: source,
                reason: "bundle contains no certificate".to_string(),
            });
        }
        Ok(Self {
            roots: Arc::new(roots),
            source,
        })
    }

    /// Build a store from every `CERTIFICATE` block of a PEM document
    pub fn from_pem(pem: &[u8], source: impl Into<String>) -> Result<Self, TrustLoadError> {
        let source = source.into();
        let certificates = CertificateDer::pem_slice_iter(pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TrustLoadError::Malformed {
                path: source.clone(),
                reason: e.to_string(),
            })?;
        Self::from_certificates(certificates, source)
    }

    pub(crate) fn from_root_store(roots: RootCertStore, source: impl Into<String>) -> Self {
        Self {
            roots: Arc::new(roots),
            source: source.into(),
        }
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }

    /// Where the anchors came from (file path or "native")
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// DER-encoded subject names of every anchor
    pub fn subjects(&self) -> Vec<Vec<u8>> {
        self.roots
            .subjects()
            .iter()
            .map(|name| name.as_ref().to_vec())
            .collect()
    }

    pub fn contains_subject(&self, name: &[u8]) -> bool {
        self.roots
            .subjects()
            .iter()
            .any(|subject| subject.as_ref() == name)
    }

    /// Verify a client certificate chain against the anchors
    pub fn verify_client_chain(&self, chain: &CertificateChain) -> MtlsResult<()> {
        self.verify_client_chain_at(chain, UnixTime::now())
    }

    pub fn verify_client_chain_at(&self, chain: &CertificateChain, now: UnixTime) -> MtlsResult<()> {
        let verifier = WebPkiClientVerifier::builder_with_provider(self.roots(), crypto_provider())
            .build()
            .map_err(|e| ConfigError::Tls {
                reason: e.to_string(),
            })?;

        verifier
            .verify_client_cert(chain.leaf(), chain.intermediates(), now)
            .map_err(|e| CertificateError::Untrusted {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl PartialEq for TrustStore {
    fn eq(&self, other: &Self) -> bool {
        self.subjects() == other.subjects()
    }
}

impl fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustStore")
            .field("source", &self.source)
            .field("anchors", &self.roots.len())
            .finish()
    }
}
