//! KeySigner trait - capability to sign with a module-resident key

use rustls::SignatureScheme;

use crate::error::MtlsResult;
use crate::model::KeyAlias;

/// Capability to sign data with a key that stays in the module
pub trait KeySigner {
    /// Sign `message` with the key stored under `alias`
    ///
    /// # Arguments
    ///
    /// * `alias` - The key to use
    /// * `scheme` - TLS signature scheme; fixes the hash and padding
    /// * `message` - The data to sign, not yet hashed
    ///
    /// # Returns
    ///
    /// The signature in the encoding TLS expects (DER for ECDSA)
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - The session is not authenticated
    /// - No key carries that alias
    /// - The key cannot produce `scheme`
    /// - The module rejects the operation
    fn sign(&self, alias: &KeyAlias, scheme: SignatureScheme, message: &[u8])
        -> MtlsResult<Vec<u8>>;
}
