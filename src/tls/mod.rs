//! rustls integration
//!
//! rustls owns the handshake state machine. This module plugs the HSM into
//! it (signing key, client certificate resolver) and assembles the client
//! configuration, the blocking stream driver and the HTTP transport.

mod resolver;
mod session;
mod signing_key;
mod transport;

use std::sync::Arc;

use rustls::crypto::CryptoProvider;

pub use resolver::CredentialResolver;
pub use session::{RetryPolicy, SecureSessionBuilder, SecureSessionConfig, SecureStream};
pub use signing_key::HsmSigningKey;
pub use transport::{configure_transport, TransportHandle, TransportResponse};

/// Cryptography used for everything except the client's own signature
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}
