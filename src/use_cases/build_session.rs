//! Build session use case

use std::sync::Arc;

use crate::error::MtlsResult;
use crate::model::{Credential, TrustStore};
use crate::ports::CredentialSelector;
use crate::tls::{SecureSessionBuilder, SecureSessionConfig};

/// Assemble a secure session from its parts
///
/// `trust_store` is required; without it the session could not authenticate
/// the server and building fails with `ConfigError::MissingTrustStore`.
/// Without a selector the issuer/algorithm strategy is used.
pub fn build_session(
    trust_store: Option<TrustStore>,
    credentials: impl IntoIterator<Item = Arc<Credential>>,
    selector: Option<Arc<dyn CredentialSelector>>,
) -> MtlsResult<SecureSessionConfig> {
    let mut builder = SecureSessionBuilder::new().credentials(credentials);
    if let Some(trust_store) = trust_store {
        builder = builder.trust_store(trust_store);
    }
    if let Some(selector) = selector {
        builder = builder.selector(selector);
    }
    builder.build()
}
