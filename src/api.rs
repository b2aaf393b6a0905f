use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::{Pkcs11Config, Pkcs11Module};
use crate::error::MtlsResult;
use crate::ports::{CredentialSelector, HsmModule};
use crate::provider::{HsmKeyProvider, ProviderSettings};
use crate::tls::SecureSessionConfig;
use crate::use_cases::{build_session, load_native_trust_store, load_trust_store, IdentityBinder};

pub use crate::model::*;

/// Where server trust anchors come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    /// PEM bundle on disk
    Bundle {
        path: PathBuf,
        passphrase: Option<String>,
    },
    /// Platform trust store
    Native,
}

/// HSM key alias plus the certificate file issued for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySource {
    pub alias: KeyAlias,
    pub certificate: PathBuf,
}

pub fn load_trust(source: &TrustSource) -> MtlsResult<TrustStore> {
    match source {
        TrustSource::Bundle { path, passphrase } => load_trust_store(path, passphrase.as_deref()),
        TrustSource::Native => load_native_trust_store(),
    }
}

/// Initialised provider over any module
pub fn open_provider(
    module: Arc<dyn HsmModule>,
    pin: Option<&Pin>,
    settings: ProviderSettings,
) -> MtlsResult<HsmKeyProvider> {
    let provider = HsmKeyProvider::with_settings(module, settings);
    provider.initialize(pin)?;
    Ok(provider)
}

/// Initialised provider over a PKCS#11 module
pub fn open_pkcs11_provider(
    config: Pkcs11Config,
    pin: Option<&Pin>,
    settings: ProviderSettings,
) -> MtlsResult<HsmKeyProvider> {
    open_provider(Arc::new(Pkcs11Module::new(config)), pin, settings)
}

/// Load trust, bind every identity and build the session
pub fn secure_session(
    provider: &HsmKeyProvider,
    trust: &TrustSource,
    identities: &[IdentitySource],
    selector: Option<Arc<dyn CredentialSelector>>,
) -> MtlsResult<SecureSessionConfig> {
    let trust_store = load_trust(trust)?;

    let mut binder = IdentityBinder::new(provider.clone());
    for identity in identities {
        let chain = CertificateChain::from_pem_file(&identity.certificate)?;
        binder.link(&identity.alias, chain)?;
    }

    build_session(Some(trust_store), binder.into_credentials(), selector)
}
