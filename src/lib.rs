//! Mutual TLS client whose private key never leaves a hardware security module
//!
//! The server is authenticated against a [`TrustStore`](model::TrustStore).
//! The client presents a certificate whose key lives in an HSM: every
//! signature the handshake needs is delegated to the module through the
//! [`HsmModule`](ports::HsmModule) port.

mod adapters;
pub mod api;
pub mod error;
mod logic;
pub mod model;
pub mod ports;
pub mod provider;
pub mod tls;
pub mod use_cases;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types
pub use error::{MtlsError, MtlsResult};

// Re-export public API
pub use adapters::{Pkcs11Config, Pkcs11Module, SoftwareModule};
pub use api::{
    load_trust, open_pkcs11_provider, open_provider, secure_session, IdentitySource, TrustSource,
};
pub use logic::{check_key_matches, AliasSelector, IssuerAlgorithmSelector};
pub use provider::{
    HsmKeyProvider, ProviderSettings, ProviderState, DEFAULT_SIGN_QUEUE_DEPTH, DEFAULT_SIGN_TIMEOUT,
};
pub use tls::{
    configure_transport, SecureSessionBuilder, SecureSessionConfig, SecureStream,
    TransportHandle, TransportResponse,
};
pub use use_cases::{
    bind_identity, build_session, link_identity, load_native_trust_store, load_trust_store,
    IdentityBinder,
};
