//! Secure session factory
//!
//! Combines the trust store, the bound credentials and a selection strategy
//! into one immutable rustls client configuration. Everything that opens a
//! connection (the blocking stream driver, the HTTP transport) starts here.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use tracing::{debug, info};

use super::{crypto_provider, CredentialResolver};
use crate::error::{BindingError, ConfigError, HandshakeCause, MtlsError, MtlsResult};
use crate::logic::IssuerAlgorithmSelector;
use crate::model::{Credential, TrustStore};
use crate::ports::CredentialSelector;

/// What happens after a failed handshake
///
/// Only `Disabled` exists: a failed handshake is reported to the caller,
/// never attempted again with the same or another credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    Disabled,
}

/// Collects the pieces of a secure session
#[derive(Default)]
pub struct SecureSessionBuilder {
    trust_store: Option<Arc<TrustStore>>,
    credentials: Vec<Arc<Credential>>,
    selector: Option<Arc<dyn CredentialSelector>>,
}

impl SecureSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trust_store(mut self, trust_store: impl Into<Arc<TrustStore>>) -> Self {
        self.trust_store = Some(trust_store.into());
        self
    }

    pub fn credential(mut self, credential: impl Into<Arc<Credential>>) -> Self {
        self.credentials.push(credential.into());
        self
    }

    pub fn credentials(mut self, credentials: impl IntoIterator<Item = Arc<Credential>>) -> Self {
        self.credentials.extend(credentials);
        self
    }

    /// Defaults to [`IssuerAlgorithmSelector`]
    pub fn selector(mut self, selector: Arc<dyn CredentialSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Assemble the client configuration
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingTrustStore` if no trust store was supplied
    /// - `BindingError::AlreadyBound` if two credentials share an alias
    /// - `ConfigError::Tls` if rustls rejects the configuration
    pub fn build(self) -> MtlsResult<SecureSessionConfig> {
        let trust_store = self.trust_store.ok_or(ConfigError::MissingTrustStore)?;

        let mut aliases = BTreeSet::new();
        for credential in &self.credentials {
            if !aliases.insert(credential.alias().clone()) {
                return Err(BindingError::AlreadyBound {
                    alias: credential.alias().to_string(),
                }
                .into());
            }
        }

        let selector = self
            .selector
            .unwrap_or_else(|| Arc::new(IssuerAlgorithmSelector));
        let resolver = CredentialResolver::new(Arc::clone(&selector), self.credentials.clone());

        let client_config = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| ConfigError::Tls {
                reason: e.to_string(),
            })?
            .with_root_certificates(trust_store.roots())
            .with_client_cert_resolver(Arc::new(resolver));

        info!(
            "Secure session ready: {} trust anchors from {}, {} client credentials",
            trust_store.len(),
            trust_store.source(),
            self.credentials.len()
        );

        Ok(SecureSessionConfig {
            trust_store,
            credentials: self.credentials,
            selector,
            retry: RetryPolicy::Disabled,
            client_config: Arc::new(client_config),
        })
    }
}

/// Immutable, shareable session configuration
#[derive(Clone)]
pub struct SecureSessionConfig {
    trust_store: Arc<TrustStore>,
    credentials: Vec<Arc<Credential>>,
    selector: Arc<dyn CredentialSelector>,
    retry: RetryPolicy,
    client_config: Arc<ClientConfig>,
}

impl SecureSessionConfig {
    pub fn builder() -> SecureSessionBuilder {
        SecureSessionBuilder::new()
    }

    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust_store
    }

    pub fn credentials(&self) -> &[Arc<Credential>] {
        &self.credentials
    }

    pub fn selector(&self) -> &Arc<dyn CredentialSelector> {
        &self.selector
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }

    /// Perform a blocking handshake over `stream`
    ///
    /// Returns once the handshake is complete. A failure during delegated
    /// signing is reported as `HandshakeFailed` carrying the `SigningError`.
    pub fn connect(&self, server_name: &str, mut stream: TcpStream) -> MtlsResult<SecureStream> {
        let name = ServerName::try_from(server_name.to_string()).map_err(|e| ConfigError::Tls {
            reason: format!("invalid server name '{}': {}", server_name, e),
        })?;

        let mut connection = ClientConnection::new(self.client_config(), name)
            .map_err(|e| MtlsError::HandshakeFailed(HandshakeCause::from_tls(e)))?;

        debug!("Starting TLS handshake with {}", server_name);
        while connection.is_handshaking() {
            connection
                .complete_io(&mut stream)
                .map_err(|e| MtlsError::HandshakeFailed(HandshakeCause::from_io(e)))?;
        }

        info!(
            "TLS handshake with {} complete ({:?})",
            server_name,
            connection.protocol_version()
        );
        Ok(SecureStream {
            inner: StreamOwned::new(connection, stream),
        })
    }
}

impl fmt::Debug for SecureSessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSessionConfig")
            .field("trust_store", &self.trust_store)
            .field("credentials", &self.credentials)
            .field("selector", &self.selector)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Established TLS connection over a TCP stream
#[derive(Debug)]
pub struct SecureStream {
    inner: StreamOwned<ClientConnection, TcpStream>,
}

impl SecureStream {
    pub fn connection(&self) -> &ClientConnection {
        &self.inner.conn
    }

    pub fn get_ref(&self) -> &TcpStream {
        self.inner.get_ref()
    }

    /// Send close_notify and flush it
    pub fn close(mut self) -> io::Result<()> {
        self.inner.conn.send_close_notify();
        self.inner.flush()
    }
}

impl Read for SecureStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for SecureStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::AliasSelector;
    use crate::model::KeyAlias;
    use crate::test_fixtures::{bound_credential, TestCa};
    use rcgen::PKCS_ECDSA_P256_SHA256;

    #[test]
    fn test_missing_trust_store() {
        let ca = TestCa::new("ca1");
        let credential = bound_credential(&ca, "badssl", &PKCS_ECDSA_P256_SHA256);

        let result = SecureSessionBuilder::new().credential(credential).build();
        assert!(matches!(
            result.unwrap_err(),
            MtlsError::Config(ConfigError::MissingTrustStore)
        ));
    }

    #[test]
    fn test_build_without_credentials() {
        let ca = TestCa::new("ca1");

        let config = SecureSessionBuilder::new()
            .trust_store(ca.trust_store())
            .build()
            .unwrap();

        assert!(config.credentials().is_empty());
        assert!(!config.client_config().client_auth_cert_resolver.has_certs());
        assert_eq!(config.retry_policy(), RetryPolicy::Disabled);
    }

    #[test]
    fn test_build_with_credential() {
        let ca = TestCa::new("ca1");
        let credential = bound_credential(&ca, "badssl", &PKCS_ECDSA_P256_SHA256);

        let config = SecureSessionConfig::builder()
            .trust_store(ca.trust_store())
            .credential(credential)
            .selector(Arc::new(AliasSelector::new(KeyAlias::new("badssl").unwrap())))
            .build()
            .unwrap();

        assert_eq!(config.credentials().len(), 1);
        assert!(config.client_config().client_auth_cert_resolver.has_certs());

        let copy = config.clone();
        assert!(Arc::ptr_eq(&copy.client_config(), &config.client_config()));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let ca = TestCa::new("ca1");

        let result = SecureSessionBuilder::new()
            .trust_store(ca.trust_store())
            .credential(bound_credential(&ca, "badssl", &PKCS_ECDSA_P256_SHA256))
            .credential(bound_credential(&ca, "badssl", &PKCS_ECDSA_P256_SHA256))
            .build();

        assert!(matches!(
            result.unwrap_err(),
            MtlsError::Binding(BindingError::AlreadyBound { .. })
        ));
    }

    #[test]
    fn test_invalid_server_name() {
        let ca = TestCa::new("ca1");
        let config = SecureSessionBuilder::new()
            .trust_store(ca.trust_store())
            .build()
            .unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        assert!(matches!(
            config.connect("not a hostname!", stream).unwrap_err(),
            MtlsError::Config(ConfigError::Tls { .. })
        ));
    }
}
