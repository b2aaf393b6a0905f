//! CredentialSelector trait - picks the client identity for a handshake

use std::fmt::Debug;
use std::sync::Arc;

use rustls::SignatureScheme;

use crate::model::Credential;

/// What the server asked for in its CertificateRequest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientAuthRequest {
    /// DER-encoded distinguished names of acceptable issuers; may be empty
    pub issuers: Vec<Vec<u8>>,
    /// Signature schemes the server accepts; may be empty
    pub schemes: Vec<SignatureScheme>,
}

impl ClientAuthRequest {
    pub fn is_unconstrained(&self) -> bool {
        self.issuers.is_empty() && self.schemes.is_empty()
    }
}

/// Strategy that chooses which credential, if any, to present
///
/// Implementations must be deterministic: the same request and credentials
/// always give the same answer. Returning `None` makes the handshake go on
/// without client authentication.
pub trait CredentialSelector: Debug + Send + Sync {
    fn select(
        &self,
        request: &ClientAuthRequest,
        available: &[Arc<Credential>],
    ) -> Option<Arc<Credential>>;
}
