//! Key algorithm of an HSM-resident key

use std::fmt;

use rustls::{SignatureAlgorithm, SignatureScheme};

/// Asymmetric key type held by the module
///
/// Determines which TLS signature schemes a key can produce during the
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// RSA of any modulus size
    Rsa,
    /// ECDSA on NIST P-256
    EcdsaP256,
    /// ECDSA on NIST P-384
    EcdsaP384,
    /// EdDSA on Curve25519
    Ed25519,
}

impl KeyAlgorithm {
    /// Signature schemes this key can produce, in order of preference
    pub fn signature_schemes(self) -> &'static [SignatureScheme] {
        match self {
            KeyAlgorithm::Rsa => &[
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
            ],
            KeyAlgorithm::EcdsaP256 => &[SignatureScheme::ECDSA_NISTP256_SHA256],
            KeyAlgorithm::EcdsaP384 => &[SignatureScheme::ECDSA_NISTP384_SHA384],
            KeyAlgorithm::Ed25519 => &[SignatureScheme::ED25519],
        }
    }

    pub fn supports(self, scheme: SignatureScheme) -> bool {
        self.signature_schemes().contains(&scheme)
    }

    /// Our most preferred scheme that the peer offered
    pub fn choose_scheme(self, offered: &[SignatureScheme]) -> Option<SignatureScheme> {
        self.signature_schemes()
            .iter()
            .copied()
            .find(|scheme| offered.contains(scheme))
    }

    /// Algorithm family as rustls reports it
    pub fn signature_algorithm(self) -> SignatureAlgorithm {
        match self {
            KeyAlgorithm::Rsa => SignatureAlgorithm::RSA,
            KeyAlgorithm::EcdsaP256 | KeyAlgorithm::EcdsaP384 => SignatureAlgorithm::ECDSA,
            KeyAlgorithm::Ed25519 => SignatureAlgorithm::ED25519,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::EcdsaP256 => "ECDSA P-256",
            KeyAlgorithm::EcdsaP384 => "ECDSA P-384",
            KeyAlgorithm::Ed25519 => "Ed25519",
        };
        f.write_str(name)
    }
}
