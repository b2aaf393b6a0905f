use tracing::debug;

use crate::error::BindingError;
use crate::model::{CertificateChain, KeyHandle};

/// Check that the chain's leaf certifies the key behind `handle`
///
/// The algorithms must agree. When the module exposes the public key, it
/// must equal the one in the leaf; otherwise only the algorithm is compared.
pub fn check_key_matches(handle: &KeyHandle, chain: &CertificateChain) -> Result<(), BindingError> {
    let leaf = chain.leaf_summary();
    let mismatch = |reason: String| BindingError::KeyCertificateMismatch {
        alias: handle.alias().to_string(),
        subject: leaf.subject.clone(),
        reason,
    };

    if leaf.algorithm != handle.algorithm() {
        return Err(mismatch(format!(
            "certificate holds a {} key, HSM key is {}",
            leaf.algorithm,
            handle.algorithm()
        )));
    }

    match &handle.descriptor().public_key {
        Some(public_key) if *public_key != leaf.public_key => Err(mismatch(format!(
            "public key {} differs from certificate key {}",
            public_key.fingerprint(),
            leaf.public_key.fingerprint()
        ))),
        Some(_) => Ok(()),
        None => {
            debug!(
                "Module does not expose the public key of '{}', matched on algorithm only",
                handle.alias()
            );
            Ok(())
        }
    }
}
