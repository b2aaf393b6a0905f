//! PKCS#11 adapter
//!
//! Talks to a vendor module (SoftHSM2, a network HSM client, a smart card
//! middleware) through cryptoki. Keys are identified by their `CKA_LABEL` and
//! looked up on every call; the module keeps the private key.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::mechanism::rsa::{PkcsMgfType, PkcsPssParams};
use cryptoki::mechanism::{Mechanism, MechanismType};
use cryptoki::object::{Attribute, AttributeType, KeyType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::slot::Slot;
use cryptoki::types::AuthPin;
use rustls::SignatureScheme;
use sha2::{Digest, Sha256, Sha384};
use tracing::{debug, info, warn};

use crate::error::{ModuleError, MtlsError, MtlsResult, ProviderError, SigningError};
use crate::model::{KeyAlgorithm, KeyAlias, KeyDescriptor, Pin, PublicKeyMaterial};
use crate::ports::{KeyLookup, KeySigner, ModuleSession};

/// DER OID for secp256r1: 1.2.840.10045.3.1.7
const EC_PARAMS_P256: &[u8] = &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
/// DER OID for secp384r1: 1.3.132.0.34
const EC_PARAMS_P384: &[u8] = &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x22];

/// Where to find the module and which token to use
#[derive(Debug, Clone)]
pub struct Pkcs11Config {
    /// Path to the vendor's PKCS#11 shared library
    pub library_path: PathBuf,
    /// Index into the list of slots that have a token present
    pub slot_index: usize,
    /// Open a read-only session; signing does not need write access
    pub read_only: bool,
}

impl Pkcs11Config {
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: library_path.into(),
            slot_index: 0,
            read_only: true,
        }
    }
}

struct Pkcs11State {
    #[allow(dead_code)]
    pkcs11: Pkcs11,
    slot: Slot,
    session: Session,
    logged_in: bool,
}

/// `HsmModule` backed by a PKCS#11 library
pub struct Pkcs11Module {
    config: Pkcs11Config,
    // The module serialises operations on a session anyway
    inner: Mutex<Option<Pkcs11State>>,
}

impl Pkcs11Module {
    pub fn new(config: Pkcs11Config) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Pkcs11Config {
        &self.config
    }

    fn lock(&self) -> MtlsResult<MutexGuard<'_, Option<Pkcs11State>>> {
        self.inner.lock().map_err(|_| {
            ModuleError::Session {
                reason: "PKCS#11 session lock poisoned".to_string(),
            }
            .into()
        })
    }

    /// Run `f` on an authenticated session
    fn with_session<T>(&self, f: impl FnOnce(&Session) -> MtlsResult<T>) -> MtlsResult<T> {
        let guard = self.lock()?;
        match guard.as_ref() {
            Some(state) if state.logged_in => f(&state.session),
            _ => Err(ModuleError::Session {
                reason: "Not authenticated".to_string(),
            }
            .into()),
        }
    }

    fn open(&self) -> MtlsResult<Pkcs11State> {
        let path = self.config.library_path.display().to_string();
        let pkcs11 = Pkcs11::new(&self.config.library_path).map_err(|e| {
            ModuleError::LoadFailed {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        pkcs11
            .initialize(CInitializeArgs::OsThreads)
            .map_err(|e| ModuleError::LoadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let slots = pkcs11.get_slots_with_token()?;
        let slot = slots
            .get(self.config.slot_index)
            .copied()
            .ok_or(ModuleError::NoSlotAvailable {
                index: self.config.slot_index,
            })?;

        let session = if self.config.read_only {
            pkcs11.open_ro_session(slot)?
        } else {
            pkcs11.open_rw_session(slot)?
        };

        info!("Opened PKCS#11 session on {} ({:?})", path, slot);
        Ok(Pkcs11State {
            pkcs11,
            slot,
            session,
            logged_in: false,
        })
    }
}

impl ModuleSession for Pkcs11Module {
    fn register(&self) -> MtlsResult<()> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        Ok(())
    }

    fn authenticate(&self, pin: Option<&Pin>) -> MtlsResult<()> {
        let mut guard = self.lock()?;
        let state = guard.as_mut().ok_or_else(|| ModuleError::Session {
            reason: "module is not registered".to_string(),
        })?;
        if state.logged_in {
            return Ok(());
        }

        // `None` uses the protected authentication path (PIN pad)
        let auth_pin = pin.map(|pin| AuthPin::new(pin.as_str().into()));
        state
            .session
            .login(UserType::User, auth_pin.as_ref())
            .map_err(|e| ModuleError::AuthenticationFailed {
                reason: e.to_string(),
            })?;
        state.logged_in = true;

        debug!("Logged in to PKCS#11 slot {:?}", state.slot);
        Ok(())
    }

    fn close(&self) -> MtlsResult<()> {
        let mut guard = self.lock()?;
        if let Some(state) = guard.take() {
            if state.logged_in {
                if let Err(e) = state.session.logout() {
                    warn!("PKCS#11 logout failed: {}", e);
                }
            }
            debug!("Closed PKCS#11 session on slot {:?}", state.slot);
        }
        Ok(())
    }
}

impl KeyLookup for Pkcs11Module {
    fn find_key(&self, alias: &KeyAlias) -> MtlsResult<KeyDescriptor> {
        self.with_session(|session| {
            let private = find_object(session, alias, ObjectClass::PRIVATE_KEY)?;
            let algorithm = key_algorithm(session, alias, private)?;

            // Tokens are not required to store the public half
            let public_key = match find_object(session, alias, ObjectClass::PUBLIC_KEY) {
                Ok(handle) => Some(public_key_material(session, algorithm, handle)?),
                Err(MtlsError::Provider(ProviderError::KeyNotFound { .. })) => None,
                Err(e) => return Err(e),
            };

            Ok(KeyDescriptor::new(algorithm, public_key))
        })
    }
}

impl KeySigner for Pkcs11Module {
    fn sign(
        &self,
        alias: &KeyAlias,
        scheme: SignatureScheme,
        message: &[u8],
    ) -> MtlsResult<Vec<u8>> {
        self.with_session(|session| {
            let private = find_object(session, alias, ObjectClass::PRIVATE_KEY)?;
            let algorithm = key_algorithm(session, alias, private)?;
            if !algorithm.supports(scheme) {
                return Err(SigningError::UnsupportedScheme {
                    alias: alias.to_string(),
                    scheme: format!("{:?}", scheme),
                }
                .into());
            }

            let failed = |reason: String| SigningError::Failed {
                alias: alias.to_string(),
                reason,
            };

            debug!("PKCS#11 sign with '{}' using {:?}", alias, scheme);
            let signature = match scheme {
                SignatureScheme::ECDSA_NISTP256_SHA256 => {
                    let raw = session
                        .sign(&Mechanism::Ecdsa, private, &Sha256::digest(message))
                        .map_err(|e| failed(e.to_string()))?;
                    p256::ecdsa::Signature::from_slice(&raw)
                        .map_err(|e| failed(e.to_string()))?
                        .to_der()
                        .as_bytes()
                        .to_vec()
                }
                SignatureScheme::ECDSA_NISTP384_SHA384 => {
                    let raw = session
                        .sign(&Mechanism::Ecdsa, private, &Sha384::digest(message))
                        .map_err(|e| failed(e.to_string()))?;
                    p384::ecdsa::Signature::from_slice(&raw)
                        .map_err(|e| failed(e.to_string()))?
                        .to_der()
                        .as_bytes()
                        .to_vec()
                }
                other => {
                    let mechanism = rsa_mechanism(other).ok_or_else(|| {
                        SigningError::UnsupportedScheme {
                            alias: alias.to_string(),
                            scheme: format!("{:?}", other),
                        }
                    })?;
                    session
                        .sign(&mechanism, private, message)
                        .map_err(|e| failed(e.to_string()))?
                }
            };
            Ok(signature)
        })
    }
}

fn find_object(session: &Session, alias: &KeyAlias, class: ObjectClass) -> MtlsResult<ObjectHandle> {
    let template = vec![
        Attribute::Class(class),
        Attribute::Label(alias.as_bytes().to_vec()),
    ];

    let handles = session.find_objects(&template)?;
    if handles.len() > 1 {
        warn!(
            "{} objects labelled '{}', using the first one",
            handles.len(),
            alias
        );
    }
    handles.into_iter().next().ok_or_else(|| {
        ProviderError::KeyNotFound {
            alias: alias.to_string(),
        }
        .into()
    })
}

fn key_algorithm(session: &Session, alias: &KeyAlias, handle: ObjectHandle) -> MtlsResult<KeyAlgorithm> {
    let attrs = session.get_attributes(handle, &[AttributeType::KeyType])?;
    let key_type = attrs.iter().find_map(|attr| match attr {
        Attribute::KeyType(key_type) => Some(*key_type),
        _ => None,
    });

    let unsupported = |key_type: String| ProviderError::UnsupportedKey {
        alias: alias.to_string(),
        key_type,
    };

    match key_type {
        Some(KeyType::RSA) => Ok(KeyAlgorithm::Rsa),
        Some(KeyType::EC) => {
            let attrs = session.get_attributes(handle, &[AttributeType::EcParams])?;
            let params = attrs.iter().find_map(|attr| match attr {
                Attribute::EcParams(params) => Some(params.as_slice()),
                _ => None,
            });
            match params {
                Some(EC_PARAMS_P256) => Ok(KeyAlgorithm::EcdsaP256),
                Some(EC_PARAMS_P384) => Ok(KeyAlgorithm::EcdsaP384),
                Some(other) => Err(unsupported(format!("EC curve {}", hex::encode(other))).into()),
                None => Err(unsupported("EC key without curve parameters".to_string()).into()),
            }
        }
        Some(other) => Err(unsupported(other.to_string()).into()),
        None => Err(unsupported("unknown".to_string()).into()),
    }
}

fn public_key_material(
    session: &Session,
    algorithm: KeyAlgorithm,
    handle: ObjectHandle,
) -> MtlsResult<PublicKeyMaterial> {
    let missing = || ModuleError::Session {
        reason: format!("public {} key object lacks its key attributes", algorithm),
    };

    match algorithm {
        KeyAlgorithm::Rsa => {
            let attrs = session.get_attributes(
                handle,
                &[AttributeType::Modulus, AttributeType::PublicExponent],
            )?;
            let mut modulus = None;
            let mut exponent = None;
            for attr in &attrs {
                match attr {
                    Attribute::Modulus(bytes) => modulus = Some(bytes.as_slice()),
                    Attribute::PublicExponent(bytes) => exponent = Some(bytes.as_slice()),
                    _ => {}
                }
            }
            match (modulus, exponent) {
                (Some(modulus), Some(exponent)) => Ok(PublicKeyMaterial::rsa(modulus, exponent)),
                _ => Err(missing().into()),
            }
        }
        _ => {
            let attrs = session.get_attributes(handle, &[AttributeType::EcPoint])?;
            attrs
                .iter()
                .find_map(|attr| match attr {
                    Attribute::EcPoint(bytes) => Some(PublicKeyMaterial::ec_point(bytes)),
                    _ => None,
                })
                .ok_or_else(|| missing().into())
        }
    }
}

/// RSA mechanism that hashes inside the module
fn rsa_mechanism(scheme: SignatureScheme) -> Option<Mechanism<'static>> {
    let pss = |hash_alg, mgf, s_len: u64| PkcsPssParams {
        hash_alg,
        mgf,
        s_len: s_len.into(),
    };

    match scheme {
        SignatureScheme::RSA_PKCS1_SHA256 => Some(Mechanism::Sha256RsaPkcs),
        SignatureScheme::RSA_PKCS1_SHA384 => Some(Mechanism::Sha384RsaPkcs),
        SignatureScheme::RSA_PKCS1_SHA512 => Some(Mechanism::Sha512RsaPkcs),
        SignatureScheme::RSA_PSS_SHA256 => Some(Mechanism::Sha256RsaPkcsPss(pss(
            MechanismType::SHA256,
            PkcsMgfType::MGF1_SHA256,
            32,
        ))),
        SignatureScheme::RSA_PSS_SHA384 => Some(Mechanism::Sha384RsaPkcsPss(pss(
            MechanismType::SHA384,
            PkcsMgfType::MGF1_SHA384,
            48,
        ))),
        SignatureScheme::RSA_PSS_SHA512 => Some(Mechanism::Sha512RsaPkcsPss(pss(
            MechanismType::SHA512,
            PkcsMgfType::MGF1_SHA512,
            64,
        ))),
        _ => None,
    }
}
