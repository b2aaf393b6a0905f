//! rustls signing key that delegates to the HSM

use std::fmt;
use std::sync::Arc;

use rustls::sign::{Signer, SigningKey};
use rustls::{SignatureAlgorithm, SignatureScheme};
use tracing::debug;

use crate::model::KeyHandle;
use crate::provider::HsmKeyProvider;

/// Signing key whose private half stays in the module
///
/// rustls asks it for a signer once the server's accepted schemes are known;
/// the signer forwards the handshake transcript to the provider.
pub struct HsmSigningKey {
    provider: HsmKeyProvider,
    handle: Arc<KeyHandle>,
}

impl HsmSigningKey {
    pub fn new(provider: HsmKeyProvider, handle: Arc<KeyHandle>) -> Self {
        Self { provider, handle }
    }
}

impl SigningKey for HsmSigningKey {
    fn choose_scheme(&self, offered: &[SignatureScheme]) -> Option<Box<dyn Signer>> {
        let scheme = self.handle.algorithm().choose_scheme(offered)?;
        debug!(
            "Key '{}' will sign the handshake with {:?}",
            self.handle.alias(),
            scheme
        );
        Some(Box::new(HsmSigner {
            provider: self.provider.clone(),
            handle: Arc::clone(&self.handle),
            scheme,
        }))
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        self.handle.algorithm().signature_algorithm()
    }
}

impl fmt::Debug for HsmSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HsmSigningKey")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

struct HsmSigner {
    provider: HsmKeyProvider,
    handle: Arc<KeyHandle>,
    scheme: SignatureScheme,
}

impl Signer for HsmSigner {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, rustls::Error> {
        // Signing errors travel through rustls and are recovered afterwards
        self.provider
            .sign(&self.handle, self.scheme, message)
            .map_err(rustls::Error::from)
    }

    fn scheme(&self) -> SignatureScheme {
        self.scheme
    }
}

impl fmt::Debug for HsmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HsmSigner")
            .field("alias", self.handle.alias())
            .field("scheme", &self.scheme)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HandshakeCause, SigningError};
    use crate::model::{KeyAlias, PublicKeyMaterial};
    use crate::test_fixtures::{ready_provider, rsa_key, ALIAS};
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};
    use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256};

    fn signing_key() -> (HsmSigningKey, KeyPair, Arc<crate::adapters::SoftwareModule>) {
        let key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let (provider, module) = ready_provider(&key);
        let handle = provider.resolve_key(&KeyAlias::new(ALIAS).unwrap()).unwrap();
        (HsmSigningKey::new(provider, handle), key, module)
    }

    #[test]
    fn test_choose_scheme_matches_key() {
        let (key, _, _) = signing_key();

        assert_eq!(key.algorithm(), SignatureAlgorithm::ECDSA);
        assert!(key
            .choose_scheme(&[SignatureScheme::RSA_PSS_SHA256, SignatureScheme::ED25519])
            .is_none());

        let signer = key
            .choose_scheme(&[
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::ECDSA_NISTP256_SHA256,
            ])
            .unwrap();
        assert_eq!(signer.scheme(), SignatureScheme::ECDSA_NISTP256_SHA256);
    }

    #[test]
    fn test_rsa_key_prefers_pss() {
        let (provider, module) = ready_provider(&rsa_key());
        let handle = provider.resolve_key(&KeyAlias::new(ALIAS).unwrap()).unwrap();
        let key = HsmSigningKey::new(provider, handle);

        assert_eq!(key.algorithm(), SignatureAlgorithm::RSA);
        let signer = key
            .choose_scheme(&[
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::RSA_PSS_SHA256,
            ])
            .unwrap();
        assert_eq!(signer.scheme(), SignatureScheme::RSA_PSS_SHA256);
        assert_eq!(signer.sign(b"handshake transcript").unwrap().len(), 256);

        // TLS 1.2 peers may only offer PKCS#1
        let signer = key
            .choose_scheme(&[SignatureScheme::RSA_PKCS1_SHA384])
            .unwrap();
        assert_eq!(signer.scheme(), SignatureScheme::RSA_PKCS1_SHA384);
        assert_eq!(signer.sign(b"handshake transcript").unwrap().len(), 256);

        assert_eq!(module.sign_calls(), 2);
    }

    #[test]
    fn test_signature_verifies_with_certificate_key() {
        let (key, key_pair, _) = signing_key();
        let signer = key
            .choose_scheme(&[SignatureScheme::ECDSA_NISTP256_SHA256])
            .unwrap();

        let signature = signer.sign(b"handshake transcript").unwrap();

        let (_, public_key) = PublicKeyMaterial::from_spki_der(&key_pair.public_key_der()).unwrap();
        let PublicKeyMaterial::Ec { point } = public_key else {
            panic!("expected an EC key");
        };
        let verifying_key = VerifyingKey::from_sec1_bytes(&point).unwrap();
        verifying_key
            .verify(
                b"handshake transcript",
                &Signature::from_der(&signature).unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn test_failure_is_recoverable_from_rustls_error() {
        let (key, _, module) = signing_key();
        module.fail_signing(true);
        let signer = key
            .choose_scheme(&[SignatureScheme::ECDSA_NISTP256_SHA256])
            .unwrap();

        let err = signer.sign(b"x").unwrap_err();
        let cause = HandshakeCause::from_tls(err);
        assert!(matches!(
            cause.signing_error(),
            Some(SigningError::Failed { .. })
        ));
    }
}
