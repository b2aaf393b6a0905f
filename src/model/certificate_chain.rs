//! Client certificate chain, leaf first

use std::fs;
use std::path::Path;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, UnixTime};
use tracing::debug;
use x509_parser::prelude::{FromDer, X509Certificate};

use super::{KeyAlgorithm, PublicKeyMaterial};
use crate::error::CertificateError;

/// Parsed summary of the leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSummary {
    pub subject: String,
    pub issuer: String,
    /// Validity window as Unix seconds
    pub not_before: i64,
    pub not_after: i64,
    pub algorithm: KeyAlgorithm,
    pub public_key: PublicKeyMaterial,
}

/// Ordered certificate chain, leaf first
///
/// Parsed once at construction and immutable afterwards. The HSM cannot store
/// certificates, so the chain is supplied by the application and linked to a
/// key handle by the identity binder.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    certificates: Vec<CertificateDer<'static>>,
    leaf: LeafSummary,
    /// Raw DER issuer name of every certificate in the chain
    issuer_names: Vec<Vec<u8>>,
}

impl CertificateChain {
    pub fn from_der(certificates: Vec<CertificateDer<'static>>) -> Result<Self, CertificateError> {
        if certificates.is_empty() {
            return Err(CertificateError::Empty);
        }

        let mut issuer_names = Vec::with_capacity(certificates.len());
        let mut leaf = None;

        for (index, der) in certificates.iter().enumerate() {
            let (_, cert) = X509Certificate::from_der(der.as_ref()).map_err(|e| {
                CertificateError::Parse {
                    index,
                    reason: e.to_string(),
                }
            })?;
            issuer_names.push(cert.issuer().as_raw().to_vec());

            if index == 0 {
                let (algorithm, public_key) = PublicKeyMaterial::from_spki(cert.public_key())?;
                leaf = Some(LeafSummary {
                    subject: cert.subject().to_string(),
                    issuer: cert.issuer().to_string(),
                    not_before: cert.validity().not_before.timestamp(),
                    not_after: cert.validity().not_after.timestamp(),
                    algorithm,
                    public_key,
                });
            }
        }

        let leaf = leaf.ok_or(CertificateError::Empty)?;
        debug!(
            "Parsed certificate chain of {} for '{}' ({})",
            certificates.len(),
            leaf.subject,
            leaf.algorithm
        );

        Ok(Self {
            certificates,
            leaf,
            issuer_names,
        })
    }

    /// Parse every `CERTIFICATE` block of a PEM document
    pub fn from_pem(pem: &[u8]) -> Result<Self, CertificateError> {
        let certificates = CertificateDer::pem_slice_iter(pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CertificateError::Pem {
                reason: e.to_string(),
            })?;
        Self::from_der(certificates)
    }

    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CertificateError> {
        let path = path.as_ref();
        let pem = fs::read(path).map_err(|e| CertificateError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_pem(&pem)
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.certificates[0]
    }

    pub fn leaf_summary(&self) -> &LeafSummary {
        &self.leaf
    }

    pub fn intermediates(&self) -> &[CertificateDer<'static>] {
        &self.certificates[1..]
    }

    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Whether any certificate in the chain was issued by one of `names`
    ///
    /// Names are DER-encoded X.500 distinguished names, the form servers send
    /// in a CertificateRequest.
    pub fn issued_by_any(&self, names: &[Vec<u8>]) -> bool {
        self.issuer_names
            .iter()
            .any(|issuer| names.iter().any(|name| name == issuer))
    }

    pub fn is_leaf_valid_at(&self, now: UnixTime) -> bool {
        let now = now.as_secs() as i64;
        self.leaf.not_before <= now && now <= self.leaf.not_after
    }
}
