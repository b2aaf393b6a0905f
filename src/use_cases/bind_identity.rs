//! Bind identity use case
//!
//! Links a key held by the HSM to the certificate chain issued for it. The
//! module cannot store certificates, so the application supplies the chain
//! and the binder checks that both halves belong together.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustls::pki_types::UnixTime;
use tracing::{info, warn};

use crate::error::{BindingError, MtlsResult, ProviderError};
use crate::logic::check_key_matches;
use crate::model::{CertificateChain, Credential, KeyAlias, KeyHandle};
use crate::provider::HsmKeyProvider;
use crate::tls::HsmSigningKey;

/// Bind a resolved key handle to its certificate chain
///
/// The resulting credential signs through `provider`.
///
/// # Errors
///
/// - `ProviderError::NotReady` if the provider is not initialised
/// - `BindingError::KeyCertificateMismatch` if the leaf certificate does not
///   certify the HSM key
pub fn bind_identity(
    provider: &HsmKeyProvider,
    handle: Arc<KeyHandle>,
    chain: CertificateChain,
) -> MtlsResult<Credential> {
    if !provider.is_ready() {
        return Err(ProviderError::NotReady.into());
    }

    check_key_matches(&handle, &chain)?;

    let leaf = chain.leaf_summary();
    if !chain.is_leaf_valid_at(UnixTime::now()) {
        // The server decides whether it accepts the certificate
        warn!(
            "Certificate '{}' for key '{}' is outside its validity period",
            leaf.subject,
            handle.alias()
        );
    }

    info!(
        "Bound key '{}' to certificate '{}' issued by '{}'",
        handle.alias(),
        leaf.subject,
        leaf.issuer
    );
    let signing_key = Arc::new(HsmSigningKey::new(provider.clone(), Arc::clone(&handle)));
    Ok(Credential::new(handle, chain, signing_key))
}

/// Resolve `alias` and bind it to `chain` in one step
pub fn link_identity(
    provider: &HsmKeyProvider,
    alias: &KeyAlias,
    chain: CertificateChain,
) -> MtlsResult<Credential> {
    let handle = provider.resolve_key(alias)?;
    bind_identity(provider, handle, chain)
}

/// Binds several identities, each alias at most once
#[derive(Debug)]
pub struct IdentityBinder {
    provider: HsmKeyProvider,
    bound: BTreeSet<KeyAlias>,
    credentials: Vec<Arc<Credential>>,
}

impl IdentityBinder {
    pub fn new(provider: HsmKeyProvider) -> Self {
        Self {
            provider,
            bound: BTreeSet::new(),
            credentials: Vec::new(),
        }
    }

    pub fn bind(
        &mut self,
        handle: Arc<KeyHandle>,
        chain: CertificateChain,
    ) -> MtlsResult<Arc<Credential>> {
        if self.bound.contains(handle.alias()) {
            return Err(BindingError::AlreadyBound {
                alias: handle.alias().to_string(),
            }
            .into());
        }

        let credential = Arc::new(bind_identity(&self.provider, handle, chain)?);
        self.bound.insert(credential.alias().clone());
        self.credentials.push(Arc::clone(&credential));
        Ok(credential)
    }

    pub fn link(&mut self, alias: &KeyAlias, chain: CertificateChain) -> MtlsResult<Arc<Credential>> {
        if self.bound.contains(alias) {
            return Err(BindingError::AlreadyBound {
                alias: alias.to_string(),
            }
            .into());
        }
        let handle = self.provider.resolve_key(alias)?;
        self.bind(handle, chain)
    }

    /// Credentials in binding order
    pub fn credentials(&self) -> &[Arc<Credential>] {
        &self.credentials
    }

    pub fn into_credentials(self) -> Vec<Arc<Credential>> {
        self.credentials
    }
}
