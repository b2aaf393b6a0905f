use std::fmt;
use std::sync::Arc;

use rustls::sign::{CertifiedKey, SigningKey};
use rustls::SignatureScheme;

use super::{CertificateChain, KeyAlgorithm, KeyAlias, KeyHandle};

/// An HSM key handle bound to the certificate chain it was issued for
///
/// Only the identity binder creates credentials, after checking that the
/// chain's leaf belongs to the handle. Immutable once created.
pub struct Credential {
    handle: Arc<KeyHandle>,
    chain: CertificateChain,
    certified_key: Arc<CertifiedKey>,
}

impl Credential {
    pub(crate) fn new(
        handle: Arc<KeyHandle>,
        chain: CertificateChain,
        signing_key: Arc<dyn SigningKey>,
    ) -> Self {
        let certified_key = Arc::new(CertifiedKey::new(chain.certificates().to_vec(), signing_key));
        Self {
            handle,
            chain,
            certified_key,
        }
    }

    pub fn alias(&self) -> &KeyAlias {
        self.handle.alias()
    }

    pub fn handle(&self) -> &Arc<KeyHandle> {
        &self.handle
    }

    pub fn chain(&self) -> &CertificateChain {
        &self.chain
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.handle.algorithm()
    }

    /// Certificate chain plus delegating signing key, as rustls consumes it
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified_key)
    }

    pub fn supports_any(&self, schemes: &[SignatureScheme]) -> bool {
        self.algorithm().choose_scheme(schemes).is_some()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("alias", self.alias())
            .field("algorithm", &self.algorithm())
            .field("subject", &self.chain.leaf_summary().subject)
            .field("chain_len", &self.chain.len())
            .finish()
    }
}
