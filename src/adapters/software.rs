//! In-process stand-in for a security module
//!
//! Keeps imported PKCS#8 keys in memory and signs with rustls' ring backend.
//! Behaves like a real module at the port boundary (login required, keys
//! looked up by label, no key export) and can simulate slow or failing
//! hardware. Meant for tests, demos and local development only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::sign::SigningKey;
use rustls::SignatureScheme;
use tracing::{debug, info};

use crate::error::{ModuleError, MtlsError, MtlsResult, ProviderError, SigningError};
use crate::model::{KeyAlias, KeyDescriptor, Pin, PublicKeyMaterial};
use crate::ports::{KeyLookup, KeySigner, ModuleSession};

struct SoftwareKey {
    descriptor: KeyDescriptor,
    signing_key: Arc<dyn SigningKey>,
}

#[derive(Debug, Default, Clone, Copy)]
struct SessionState {
    registered: bool,
    authenticated: bool,
}

/// Software implementation of the `HsmModule` port
pub struct SoftwareModule {
    pin: Option<Pin>,
    session: RwLock<SessionState>,
    keys: RwLock<HashMap<KeyAlias, SoftwareKey>>,
    latency: Duration,
    fail_signing: AtomicBool,
    sign_calls: AtomicUsize,
}

impl SoftwareModule {
    /// Module that accepts any login
    pub fn new() -> Self {
        Self {
            pin: None,
            session: RwLock::new(SessionState::default()),
            keys: RwLock::new(HashMap::new()),
            latency: Duration::ZERO,
            fail_signing: AtomicBool::new(false),
            sign_calls: AtomicUsize::new(0),
        }
    }

    /// Module that only accepts `pin`
    pub fn with_pin(pin: Pin) -> Self {
        Self {
            pin: Some(pin),
            ..Self::new()
        }
    }

    /// Delay every signing operation, like a remote module would
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every following signing operation fail
    pub fn fail_signing(&self, fail: bool) {
        self.fail_signing.store(fail, Ordering::SeqCst);
    }

    /// Number of signing requests received so far
    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Store a key under `alias`
    ///
    /// `pkcs8_der` is the private key, `spki_der` its public half. Importing
    /// twice under the same alias fails, like a token with unique labels.
    pub fn import_key(
        &self,
        alias: KeyAlias,
        pkcs8_der: &[u8],
        spki_der: &[u8],
    ) -> MtlsResult<KeyDescriptor> {
        let (algorithm, public_key) = PublicKeyMaterial::from_spki_der(spki_der)?;

        let private_key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pkcs8_der.to_vec()));
        let signing_key =
            any_supported_type(&private_key).map_err(|e| ModuleError::Session {
                reason: format!("cannot import key '{}': {}", alias, e),
            })?;

        if signing_key.algorithm() != algorithm.signature_algorithm() {
            return Err(ModuleError::Session {
                reason: format!(
                    "private key for '{}' is {:?}, public key is {}",
                    alias,
                    signing_key.algorithm(),
                    algorithm
                ),
            }
            .into());
        }

        let descriptor = KeyDescriptor::new(algorithm, Some(public_key));
        let mut keys = self.write_keys()?;
        if keys.contains_key(&alias) {
            return Err(ModuleError::Session {
                reason: format!("a key labelled '{}' already exists", alias),
            }
            .into());
        }
        keys.insert(
            alias.clone(),
            SoftwareKey {
                descriptor: descriptor.clone(),
                signing_key,
            },
        );

        info!("Imported {} key '{}' into software module", algorithm, alias);
        Ok(descriptor)
    }

    fn state(&self) -> MtlsResult<SessionState> {
        self.session
            .read()
            .map(|state| *state)
            .map_err(|_| poisoned("session"))
    }

    fn write_keys(
        &self,
    ) -> MtlsResult<std::sync::RwLockWriteGuard<'_, HashMap<KeyAlias, SoftwareKey>>> {
        self.keys.write().map_err(|_| poisoned("key table"))
    }

    fn ensure_authenticated(&self) -> MtlsResult<()> {
        if !self.state()?.authenticated {
            return Err(ModuleError::Session {
                reason: "Not authenticated".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for SoftwareModule {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(what: &str) -> MtlsError {
    ModuleError::Session {
        reason: format!("software module {} lock poisoned", what),
    }
    .into()
}

impl ModuleSession for SoftwareModule {
    fn register(&self) -> MtlsResult<()> {
        let mut state = self.session.write().map_err(|_| poisoned("session"))?;
        if !state.registered {
            state.registered = true;
            debug!("Software module registered");
        }
        Ok(())
    }

    fn authenticate(&self, pin: Option<&Pin>) -> MtlsResult<()> {
        let mut state = self.session.write().map_err(|_| poisoned("session"))?;
        if !state.registered {
            return Err(ModuleError::Session {
                reason: "module is not registered".to_string(),
            }
            .into());
        }

        if let Some(expected) = &self.pin {
            if pin != Some(expected) {
                return Err(ModuleError::AuthenticationFailed {
                    reason: "Invalid PIN".to_string(),
                }
                .into());
            }
        }

        state.authenticated = true;
        debug!("Software module session authenticated");
        Ok(())
    }

    fn close(&self) -> MtlsResult<()> {
        let mut state = self.session.write().map_err(|_| poisoned("session"))?;
        *state = SessionState::default();
        debug!("Software module session closed");
        Ok(())
    }
}

impl KeyLookup for SoftwareModule {
    fn find_key(&self, alias: &KeyAlias) -> MtlsResult<KeyDescriptor> {
        self.ensure_authenticated()?;

        let keys = self.keys.read().map_err(|_| poisoned("key table"))?;
        keys.get(alias)
            .map(|key| key.descriptor.clone())
            .ok_or_else(|| {
                ProviderError::KeyNotFound {
                    alias: alias.to_string(),
                }
                .into()
            })
    }
}

impl KeySigner for SoftwareModule {
    fn sign(
        &self,
        alias: &KeyAlias,
        scheme: SignatureScheme,
        message: &[u8],
    ) -> MtlsResult<Vec<u8>> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_authenticated()?;

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        let signing_key = {
            let keys = self.keys.read().map_err(|_| poisoned("key table"))?;
            let key = keys.get(alias).ok_or_else(|| ProviderError::KeyNotFound {
                alias: alias.to_string(),
            })?;
            if !key.descriptor.algorithm.supports(scheme) {
                return Err(SigningError::UnsupportedScheme {
                    alias: alias.to_string(),
                    scheme: format!("{:?}", scheme),
                }
                .into());
            }
            Arc::clone(&key.signing_key)
        };

        if self.fail_signing.load(Ordering::SeqCst) {
            return Err(SigningError::Failed {
                alias: alias.to_string(),
                reason: "simulated module failure".to_string(),
            }
            .into());
        }

        let signer = signing_key
            .choose_scheme(&[scheme])
            .ok_or_else(|| SigningError::UnsupportedScheme {
                alias: alias.to_string(),
                scheme: format!("{:?}", scheme),
            })?;

        debug!(
            "Signing {} bytes with '{}' using {:?}",
            message.len(),
            alias,
            scheme
        );
        signer.sign(message).map_err(|e| {
            SigningError::Failed {
                alias: alias.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}
