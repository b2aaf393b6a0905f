//! Error types for hsm-mtls
//!
//! Errors are grouped by the component that raises them and folded into
//! [`MtlsError`]. Configuration-time errors (trust store, key lookup, binding)
//! are fatal to startup; signing and handshake errors are reported per
//! connection and never retried.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for hsm-mtls operations
pub type MtlsResult<T> = Result<T, MtlsError>;

/// Top-level error type
#[derive(Error, Debug)]
pub enum MtlsError {
    /// Trust store could not be loaded
    #[error("Trust store error: {0}")]
    TrustLoad(#[from] TrustLoadError),

    /// Provider lifecycle or key lookup errors
    #[error("HSM provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Raw module failures (library loading, login, session)
    #[error("HSM module error: {0}")]
    Module(#[from] ModuleError),

    /// Key/certificate linkage errors
    #[error("Identity binding error: {0}")]
    Binding(#[from] BindingError),

    /// Certificate parsing errors
    #[error("Certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// Delegated signing errors
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// TLS handshake failed
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(HandshakeCause),

    /// Session assembly errors
    #[error("Session configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Domain validation errors
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),
}

/// Domain validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Key alias error: {0}")]
    Alias(#[from] crate::model::AliasError),

    #[error("PIN validation error: {0}")]
    Pin(#[from] crate::model::PinError),
}

impl From<crate::model::AliasError> for MtlsError {
    fn from(err: crate::model::AliasError) -> Self {
        MtlsError::Domain(DomainError::Alias(err))
    }
}

impl From<crate::model::PinError> for MtlsError {
    fn from(err: crate::model::PinError) -> Self {
        MtlsError::Domain(DomainError::Pin(err))
    }
}

#[derive(Error, Debug)]
pub enum TrustLoadError {
    #[error("Failed to read trust bundle {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed trust bundle {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Trust bundle {path} is a PEM bundle and cannot take a passphrase")]
    EncryptedBundleUnsupported { path: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider was not initialised, or has been shut down
    #[error("HSM provider is not ready - call initialize() first")]
    NotReady,

    #[error("No key with alias '{alias}' in the HSM")]
    KeyNotFound { alias: String },

    #[error("Key '{alias}' uses an unsupported key type: {key_type}")]
    UnsupportedKey { alias: String, key_type: String },
}

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Failed to load module library {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("No token present in slot index {index}")]
    NoSlotAvailable { index: usize },

    #[error("Module authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Module session error: {reason}")]
    Session { reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The certificate leaf does not belong to the HSM key
    #[error("Key '{alias}' does not match certificate '{subject}': {reason}")]
    KeyCertificateMismatch {
        alias: String,
        subject: String,
        reason: String,
    },

    #[error("Alias '{alias}' is already bound to a certificate chain")]
    AlreadyBound { alias: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("Failed to read certificate file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Certificate bundle contains no certificate")]
    Empty,

    #[error("Failed to decode PEM: {reason}")]
    Pem { reason: String },

    #[error("Failed to parse certificate #{index}: {reason}")]
    Parse { index: usize, reason: String },

    #[error("Unsupported public key: {reason}")]
    UnsupportedKey { reason: String },

    #[error("Certificate chain is not trusted: {reason}")]
    Untrusted { reason: String },
}

/// Failure of a delegated signing operation
///
/// Cloneable so it can travel through rustls' error type and be recovered
/// after the handshake fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("HSM signing with key '{alias}' failed: {reason}")]
    Failed { alias: String, reason: String },

    #[error("HSM signing with key '{alias}' did not finish within {timeout:?}")]
    Timeout { alias: String, timeout: Duration },

    #[error("Key '{alias}' cannot produce signature scheme {scheme}")]
    UnsupportedScheme { alias: String, scheme: String },
}

/// What made a handshake fail
#[derive(Error, Debug)]
pub enum HandshakeCause {
    #[error("{0}")]
    Signing(SigningError),

    #[error("TLS error: {0}")]
    Tls(rustls::Error),

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl HandshakeCause {
    /// Signing failure behind this handshake failure, if any
    pub fn signing_error(&self) -> Option<&SigningError> {
        match self {
            HandshakeCause::Signing(err) => Some(err),
            _ => None,
        }
    }

    /// Classify a rustls error, recovering signing failures raised by our signer
    pub fn from_tls(err: rustls::Error) -> Self {
        if let rustls::Error::Other(other) = &err {
            if let Some(signing) = other.0.downcast_ref::<SigningError>() {
                return HandshakeCause::Signing(signing.clone());
            }
        }
        HandshakeCause::Tls(err)
    }

    /// Classify an I/O error returned while driving the handshake
    pub fn from_io(err: io::Error) -> Self {
        let tls = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            .cloned();
        match tls {
            Some(tls) => Self::from_tls(tls),
            None => HandshakeCause::Io(err),
        }
    }

    /// Search an error chain (e.g. from the HTTP client) for a TLS failure
    pub fn find_in(err: &(dyn std::error::Error + 'static)) -> Option<Self> {
        let mut current = Some(err);
        while let Some(err) = current {
            if let Some(signing) = err.downcast_ref::<SigningError>() {
                return Some(HandshakeCause::Signing(signing.clone()));
            }
            if let Some(tls) = err.downcast_ref::<rustls::Error>() {
                return Some(Self::from_tls(tls.clone()));
            }
            // io::Error::source() skips the wrapped error, so look inside explicitly
            if let Some(tls) = err
                .downcast_ref::<io::Error>()
                .and_then(|io_err| io_err.get_ref())
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            {
                return Some(Self::from_tls(tls.clone()));
            }
            current = err.source();
        }
        None
    }
}

impl From<SigningError> for rustls::Error {
    fn from(err: SigningError) -> Self {
        rustls::Error::Other(rustls::OtherError(Arc::new(err)))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A trust store is required to build a secure session")]
    MissingTrustStore,

    #[error("Failed to build TLS configuration: {reason}")]
    Tls { reason: String },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Non-success HTTP status {status} received from {url}")]
    UnexpectedStatus { url: String, status: u16 },
}

impl From<cryptoki::error::Error> for MtlsError {
    fn from(err: cryptoki::error::Error) -> Self {
        MtlsError::Module(ModuleError::Session {
            reason: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MtlsError::Provider(ProviderError::KeyNotFound {
            alias: "missing".to_string(),
        });
        assert!(err.to_string().contains("No key with alias 'missing'"));
    }

    #[test]
    fn test_signing_error_survives_rustls_round_trip() {
        let signing = SigningError::Timeout {
            alias: "badssl".to_string(),
            timeout: Duration::from_millis(2000),
        };
        let tls: rustls::Error = signing.clone().into();

        let cause = HandshakeCause::from_tls(tls);
        assert_eq!(cause.signing_error(), Some(&signing));
    }

    #[test]
    fn test_io_wrapped_signing_error_is_recovered() {
        let signing = SigningError::Failed {
            alias: "badssl".to_string(),
            reason: "device removed".to_string(),
        };
        let tls: rustls::Error = signing.clone().into();
        let io_err = io::Error::new(io::ErrorKind::InvalidData, tls);

        let cause = HandshakeCause::from_io(io_err);
        assert_eq!(cause.signing_error(), Some(&signing));
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let cause = HandshakeCause::from_io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(cause, HandshakeCause::Io(_)));
    }

    #[test]
    fn test_find_in_walks_source_chain() {
        let signing = SigningError::Failed {
            alias: "a".to_string(),
            reason: "r".to_string(),
        };
        let tls: rustls::Error = signing.clone().into();
        let outer = TrustLoadError::Unreadable {
            path: "x".to_string(),
            source: io::Error::new(io::ErrorKind::Other, tls),
        };

        let cause = HandshakeCause::find_in(&outer).expect("cause");
        assert_eq!(cause.signing_error(), Some(&signing));
    }

    #[test]
    fn test_domain_error_conversion() {
        let err: MtlsError = crate::model::PinError::TooShort.into();
        assert!(err.to_string().contains("PIN"));
    }

    #[test]
    fn test_result_type_alias() {
        let result: MtlsResult<i32> = Err(MtlsError::Config(ConfigError::MissingTrustStore));
        assert!(result.is_err());
    }
}
