use std::sync::Arc;

use rustls::client::ResolvesClientCert;
use rustls::sign::CertifiedKey;
use rustls::SignatureScheme;
use tracing::debug;

use crate::model::Credential;
use crate::ports::{ClientAuthRequest, CredentialSelector};

/// Answers the server's certificate request from the bound credentials
///
/// rustls calls this once per handshake that requests client authentication.
/// Returning `None` continues the handshake without a client certificate.
#[derive(Debug)]
pub struct CredentialResolver {
    selector: Arc<dyn CredentialSelector>,
    credentials: Vec<Arc<Credential>>,
}

impl CredentialResolver {
    pub fn new(selector: Arc<dyn CredentialSelector>, credentials: Vec<Arc<Credential>>) -> Self {
        Self {
            selector,
            credentials,
        }
    }

    pub fn credentials(&self) -> &[Arc<Credential>] {
        &self.credentials
    }
}

impl ResolvesClientCert for CredentialResolver {
    fn resolve(
        &self,
        root_hint_subjects: &[&[u8]],
        sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        let request = ClientAuthRequest {
            issuers: root_hint_subjects.iter().map(|name| name.to_vec()).collect(),
            schemes: sigschemes.to_vec(),
        };
        debug!(
            "Server requested a client certificate ({} issuers, {} schemes)",
            request.issuers.len(),
            request.schemes.len()
        );

        match self.selector.select(&request, &self.credentials) {
            Some(credential) => {
                debug!("Presenting credential '{}'", credential.alias());
                Some(credential.certified_key())
            }
            None => {
                debug!("No matching credential, continuing without client certificate");
                None
            }
        }
    }

    fn has_certs(&self) -> bool {
        !self.credentials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::IssuerAlgorithmSelector;
    use crate::test_fixtures::{bound_credential, TestCa};
    use rcgen::PKCS_ECDSA_P256_SHA256;

    #[test]
    fn test_resolve_by_root_hint() {
        let ca1 = TestCa::new("ca1");
        let ca2 = TestCa::new("ca2");
        let credential = bound_credential(&ca1, "badssl", &PKCS_ECDSA_P256_SHA256);
        let resolver =
            CredentialResolver::new(Arc::new(IssuerAlgorithmSelector), vec![credential.clone()]);

        let ca1_subject = ca1.subject();
        let resolved = resolver
            .resolve(&[&ca1_subject], &[SignatureScheme::ECDSA_NISTP256_SHA256])
            .unwrap();
        assert!(Arc::ptr_eq(&resolved, &credential.certified_key()));

        let ca2_subject = ca2.subject();
        assert!(resolver
            .resolve(&[&ca2_subject], &[SignatureScheme::ECDSA_NISTP256_SHA256])
            .is_none());
    }

    #[test]
    fn test_has_certs() {
        let empty = CredentialResolver::new(Arc::new(IssuerAlgorithmSelector), vec![]);
        assert!(!empty.has_certs());
        assert!(empty
            .resolve(&[], &[SignatureScheme::ECDSA_NISTP256_SHA256])
            .is_none());
    }
}
