use crate::error::MtlsResult;
use crate::model::{KeyAlias, KeyDescriptor};

/// Capability to look up a private key by alias
pub trait KeyLookup {
    /// Describe the private key stored under `alias`
    ///
    /// Only the algorithm and, when the module exposes it, the public key are
    /// returned. The private key never leaves the module.
    ///
    /// # Errors
    ///
    /// Returns `MtlsError::Provider(ProviderError::KeyNotFound)` if no private
    /// key carries that alias.
    fn find_key(&self, alias: &KeyAlias) -> MtlsResult<KeyDescriptor>;
}
