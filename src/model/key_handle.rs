//! Opaque reference to a key that lives inside the module

use std::fmt;

use super::{KeyAlgorithm, KeyAlias, PublicKeyMaterial};

/// What the module tells us about a key
///
/// Modules expose the key type, and usually the public half. Private key
/// material is never part of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub algorithm: KeyAlgorithm,
    /// `None` when the module does not export the public key
    pub public_key: Option<PublicKeyMaterial>,
}

impl KeyDescriptor {
    pub fn new(algorithm: KeyAlgorithm, public_key: Option<PublicKeyMaterial>) -> Self {
        Self {
            algorithm,
            public_key,
        }
    }
}

/// Handle to a non-extractable private key held by the HSM
///
/// A handle is only an alias plus a descriptor. It is deliberately neither
/// `Clone` nor serialisable: one handle exists per resolved key and it is
/// shared as `Arc<KeyHandle>`. The key itself goes away when the module
/// session is closed, not when the handle is dropped.
pub struct KeyHandle {
    alias: KeyAlias,
    descriptor: KeyDescriptor,
}

impl KeyHandle {
    pub(crate) fn new(alias: KeyAlias, descriptor: KeyDescriptor) -> Self {
        Self { alias, descriptor }
    }

    pub fn alias(&self) -> &KeyAlias {
        &self.alias
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.descriptor.algorithm
    }

    pub fn descriptor(&self) -> &KeyDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("alias", &self.alias)
            .field("algorithm", &self.descriptor.algorithm)
            .finish_non_exhaustive()
    }
}
