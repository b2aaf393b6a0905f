//! Credential selection strategies

use std::sync::Arc;

use tracing::debug;

use crate::model::{Credential, KeyAlias};
use crate::ports::{ClientAuthRequest, CredentialSelector};

/// Default strategy: match on issuer and signature scheme
///
/// Picks the first credential, in configuration order, whose chain was issued
/// by one of the requested authorities and whose key can produce one of the
/// accepted schemes. A criterion the server left empty is not applied. When
/// the server constrains nothing at all, a lone credential is presented and
/// several are not guessed between.
#[derive(Debug, Default, Clone, Copy)]
pub struct IssuerAlgorithmSelector;

impl CredentialSelector for IssuerAlgorithmSelector {
    fn select(
        &self,
        request: &ClientAuthRequest,
        available: &[Arc<Credential>],
    ) -> Option<Arc<Credential>> {
        if request.is_unconstrained() {
            return match available {
                [only] => Some(Arc::clone(only)),
                _ => None,
            };
        }

        let selected = available
            .iter()
            .find(|credential| {
                (request.issuers.is_empty() || credential.chain().issued_by_any(&request.issuers))
                    && (request.schemes.is_empty() || credential.supports_any(&request.schemes))
            })
            .cloned();

        match &selected {
            Some(credential) => debug!("Selected credential '{}'", credential.alias()),
            None => debug!(
                "No credential among {} matches {} issuers / {} schemes",
                available.len(),
                request.issuers.len(),
                request.schemes.len()
            ),
        }
        selected
    }
}

/// Always present the credential bound to one alias
///
/// Ignores the issuer list; the key must still be able to produce one of the
/// accepted schemes.
#[derive(Debug, Clone)]
pub struct AliasSelector {
    alias: KeyAlias,
}

impl AliasSelector {
    pub fn new(alias: KeyAlias) -> Self {
        Self { alias }
    }

    pub fn alias(&self) -> &KeyAlias {
        &self.alias
    }
}

impl CredentialSelector for AliasSelector {
    fn select(
        &self,
        request: &ClientAuthRequest,
        available: &[Arc<Credential>],
    ) -> Option<Arc<Credential>> {
        available
            .iter()
            .find(|credential| credential.alias() == &self.alias)
            .filter(|credential| {
                request.schemes.is_empty() || credential.supports_any(&request.schemes)
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{bound_credential, TestCa};
    use rcgen::{PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384};
    use rustls::SignatureScheme;

    #[test]
    fn test_select_by_issuer() {
        let ca1 = TestCa::new("ca1");
        let credential = bound_credential(&ca1, "badssl", &PKCS_ECDSA_P256_SHA256);

        let request = ClientAuthRequest {
            issuers: vec![ca1.subject()],
            schemes: vec![],
        };
        let selected = IssuerAlgorithmSelector.select(&request, &[credential.clone()]);

        assert!(Arc::ptr_eq(&selected.unwrap(), &credential));
    }

    #[test]
    fn test_unknown_issuer_selects_nothing() {
        let ca1 = TestCa::new("ca1");
        let ca2 = TestCa::new("ca2");
        let credential = bound_credential(&ca1, "badssl", &PKCS_ECDSA_P256_SHA256);

        let request = ClientAuthRequest {
            issuers: vec![ca2.subject()],
            schemes: vec![SignatureScheme::ECDSA_NISTP256_SHA256],
        };
        assert!(IssuerAlgorithmSelector
            .select(&request, &[credential])
            .is_none());
    }

    #[test]
    fn test_select_by_scheme() {
        let ca = TestCa::new("ca1");
        let p256 = bound_credential(&ca, "p256", &PKCS_ECDSA_P256_SHA256);
        let p384 = bound_credential(&ca, "p384", &PKCS_ECDSA_P384_SHA384);

        let request = ClientAuthRequest {
            issuers: vec![],
            schemes: vec![SignatureScheme::ECDSA_NISTP384_SHA384],
        };
        let selected = IssuerAlgorithmSelector
            .select(&request, &[p256, p384.clone()])
            .unwrap();

        assert!(Arc::ptr_eq(&selected, &p384));
    }

    #[test]
    fn test_first_match_wins_and_is_stable() {
        let ca = TestCa::new("ca1");
        let first = bound_credential(&ca, "first", &PKCS_ECDSA_P256_SHA256);
        let second = bound_credential(&ca, "second", &PKCS_ECDSA_P256_SHA256);
        let available = vec![first.clone(), second];

        let request = ClientAuthRequest {
            issuers: vec![ca.subject()],
            schemes: vec![SignatureScheme::ECDSA_NISTP256_SHA256],
        };
        for _ in 0..10 {
            let selected = IssuerAlgorithmSelector.select(&request, &available).unwrap();
            assert!(Arc::ptr_eq(&selected, &first));
        }
    }

    #[test]
    fn test_unconstrained_request() {
        let ca = TestCa::new("ca1");
        let one = bound_credential(&ca, "one", &PKCS_ECDSA_P256_SHA256);
        let two = bound_credential(&ca, "two", &PKCS_ECDSA_P256_SHA256);
        let request = ClientAuthRequest::default();

        assert!(IssuerAlgorithmSelector
            .select(&request, &[one.clone()])
            .is_some());
        assert!(IssuerAlgorithmSelector.select(&request, &[one, two]).is_none());
        assert!(IssuerAlgorithmSelector.select(&request, &[]).is_none());
    }

    #[test]
    fn test_alias_selector() {
        let ca = TestCa::new("ca1");
        let one = bound_credential(&ca, "one", &PKCS_ECDSA_P256_SHA256);
        let two = bound_credential(&ca, "two", &PKCS_ECDSA_P256_SHA256);
        let selector = AliasSelector::new(KeyAlias::new("two").unwrap());

        let request = ClientAuthRequest {
            issuers: vec![TestCa::new("elsewhere").subject()],
            schemes: vec![SignatureScheme::ECDSA_NISTP256_SHA256],
        };
        let selected = selector.select(&request, &[one.clone(), two.clone()]).unwrap();
        assert!(Arc::ptr_eq(&selected, &two));

        let rsa_only = ClientAuthRequest {
            issuers: vec![],
            schemes: vec![SignatureScheme::RSA_PSS_SHA256],
        };
        assert!(selector.select(&rsa_only, &[one, two]).is_none());
    }
}
