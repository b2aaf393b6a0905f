//! Public key material used to reconcile HSM keys with certificates
//!
//! Only public halves ever appear here. Values are normalised so a key read
//! back from the module compares equal to the same key parsed out of a
//! certificate.

use std::fmt;

use x509_parser::oid_registry::{
    OID_EC_P256, OID_KEY_TYPE_EC_PUBLIC_KEY, OID_NIST_EC_P384, OID_PKCS1_RSAENCRYPTION,
    OID_SIG_ED25519,
};
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey;
use x509_parser::x509::SubjectPublicKeyInfo;

use super::KeyAlgorithm;
use crate::error::CertificateError;

#[derive(Clone, PartialEq, Eq)]
pub enum PublicKeyMaterial {
    /// Big-endian modulus and exponent, leading zero bytes stripped
    Rsa { modulus: Vec<u8>, exponent: Vec<u8> },
    /// Uncompressed SEC1 point
    Ec { point: Vec<u8> },
    Ed25519(Vec<u8>),
}

impl PublicKeyMaterial {
    pub fn rsa(modulus: &[u8], exponent: &[u8]) -> Self {
        Self::Rsa {
            modulus: strip_leading_zeros(modulus).to_vec(),
            exponent: strip_leading_zeros(exponent).to_vec(),
        }
    }

    /// EC point as reported by PKCS#11 `CKA_EC_POINT`
    ///
    /// Modules disagree on whether the point is wrapped in a DER OCTET STRING;
    /// both encodings are accepted.
    pub fn ec_point(bytes: &[u8]) -> Self {
        Self::Ec {
            point: unwrap_octet_string(bytes).unwrap_or(bytes).to_vec(),
        }
    }

    /// Parse a DER SubjectPublicKeyInfo
    pub fn from_spki_der(der: &[u8]) -> Result<(KeyAlgorithm, Self), CertificateError> {
        let (_, spki) =
            SubjectPublicKeyInfo::from_der(der).map_err(|e| CertificateError::UnsupportedKey {
                reason: format!("invalid SubjectPublicKeyInfo: {}", e),
            })?;
        Self::from_spki(&spki)
    }

    pub(crate) fn from_spki(
        spki: &SubjectPublicKeyInfo<'_>,
    ) -> Result<(KeyAlgorithm, Self), CertificateError> {
        let oid = &spki.algorithm.algorithm;

        if *oid == OID_SIG_ED25519 {
            return Ok((
                KeyAlgorithm::Ed25519,
                Self::Ed25519(spki.subject_public_key.as_ref().to_vec()),
            ));
        }

        let parsed = spki.parsed().map_err(|e| CertificateError::UnsupportedKey {
            reason: format!("cannot decode public key: {}", e),
        })?;

        match parsed {
            PublicKey::RSA(rsa) if *oid == OID_PKCS1_RSAENCRYPTION => {
                Ok((KeyAlgorithm::Rsa, Self::rsa(rsa.modulus, rsa.exponent)))
            }
            PublicKey::EC(point) if *oid == OID_KEY_TYPE_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|params| params.as_oid().ok())
                    .ok_or_else(|| CertificateError::UnsupportedKey {
                        reason: "EC key without named curve".to_string(),
                    })?;
                let algorithm = if curve == OID_EC_P256 {
                    KeyAlgorithm::EcdsaP256
                } else if curve == OID_NIST_EC_P384 {
                    KeyAlgorithm::EcdsaP384
                } else {
                    return Err(CertificateError::UnsupportedKey {
                        reason: format!("unsupported curve {}", curve),
                    });
                };
                Ok((
                    algorithm,
                    Self::Ec {
                        point: point.data().to_vec(),
                    },
                ))
            }
            _ => Err(CertificateError::UnsupportedKey {
                reason: format!("unsupported key algorithm {}", oid),
            }),
        }
    }

    /// Short hex fingerprint for logs
    pub fn fingerprint(&self) -> String {
        let bytes = match self {
            PublicKeyMaterial::Rsa { modulus, .. } => modulus,
            PublicKeyMaterial::Ec { point } => point,
            PublicKeyMaterial::Ed25519(key) => key,
        };
        let tail = &bytes[bytes.len().saturating_sub(8)..];
        hex::encode(tail)
    }
}

impl fmt::Debug for PublicKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PublicKeyMaterial::Rsa { .. } => "Rsa",
            PublicKeyMaterial::Ec { .. } => "Ec",
            PublicKeyMaterial::Ed25519(_) => "Ed25519",
        };
        write!(f, "PublicKeyMaterial::{}(..{})", kind, self.fingerprint())
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

// DER OCTET STRING with short or long-form length
fn unwrap_octet_string(bytes: &[u8]) -> Option<&[u8]> {
    let (&tag, rest) = bytes.split_first()?;
    if tag != 0x04 {
        return None;
    }
    let (&first, rest) = rest.split_first()?;
    let (len, body) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7f) as usize;
        if count == 0 || count > 2 || rest.len() < count {
            return None;
        }
        let len = rest[..count]
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[count..])
    };
    (body.len() == len).then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsa_strips_leading_zeros() {
        let a = PublicKeyMaterial::rsa(&[0, 0, 0xab, 0xcd], &[0, 1, 0, 1]);
        let b = PublicKeyMaterial::rsa(&[0xab, 0xcd], &[1, 0, 1]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ec_point_accepts_wrapped_and_raw() {
        let mut point = vec![0x04];
        point.extend_from_slice(&[7u8; 64]);
        let mut wrapped = vec![0x04, 65];
        wrapped.extend_from_slice(&point);

        assert_eq!(
            PublicKeyMaterial::ec_point(&wrapped),
            PublicKeyMaterial::ec_point(&point)
        );
    }

    #[test]
    fn test_ec_point_long_form_length() {
        let body = vec![0x04; 133];
        let mut wrapped = vec![0x04, 0x81, 133];
        wrapped.extend_from_slice(&body);

        assert_eq!(
            PublicKeyMaterial::ec_point(&wrapped),
            PublicKeyMaterial::Ec { point: body }
        );
    }

    #[test]
    fn test_from_spki_der_p256() {
        let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
        let (algorithm, material) =
            PublicKeyMaterial::from_spki_der(&key_pair.public_key_der()).unwrap();

        assert_eq!(algorithm, KeyAlgorithm::EcdsaP256);
        assert!(matches!(material, PublicKeyMaterial::Ec { ref point } if point.len() == 65));
    }

    #[test]
    fn test_from_spki_der_p384() {
        let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384).unwrap();
        let (algorithm, _) = PublicKeyMaterial::from_spki_der(&key_pair.public_key_der()).unwrap();
        assert_eq!(algorithm, KeyAlgorithm::EcdsaP384);
    }

    #[test]
    fn test_from_spki_der_ed25519() {
        let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
        let (algorithm, material) =
            PublicKeyMaterial::from_spki_der(&key_pair.public_key_der()).unwrap();

        assert_eq!(algorithm, KeyAlgorithm::Ed25519);
        assert!(matches!(material, PublicKeyMaterial::Ed25519(ref key) if key.len() == 32));
    }

    #[test]
    fn test_from_spki_der_rsa() {
        let key_pair = crate::test_fixtures::rsa_key();
        let (algorithm, material) =
            PublicKeyMaterial::from_spki_der(&key_pair.public_key_der()).unwrap();

        assert_eq!(algorithm, KeyAlgorithm::Rsa);
        match material {
            PublicKeyMaterial::Rsa { modulus, exponent } => {
                assert_eq!(modulus.len(), 256);
                assert_eq!(exponent, vec![1, 0, 1]);
            }
            other => panic!("expected an RSA key: {other:?}"),
        }
    }

    #[test]
    fn test_from_spki_der_garbage() {
        assert!(matches!(
            PublicKeyMaterial::from_spki_der(b"not a key"),
            Err(CertificateError::UnsupportedKey { .. })
        ));
    }

    #[test]
    fn test_debug_shows_fingerprint_only() {
        let material = PublicKeyMaterial::ec_point(&[0x04, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        let debug = format!("{:?}", material);
        assert!(debug.starts_with("PublicKeyMaterial::Ec"));
        assert!(debug.contains("0203040506070809"));
    }
}
