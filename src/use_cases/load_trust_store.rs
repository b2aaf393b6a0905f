//! Load trust store use case
//!
//! Reads the certificate authorities used to authenticate servers.

use std::fs;
use std::path::Path;

use rustls::RootCertStore;
use tracing::{info, warn};

use crate::error::{MtlsResult, TrustLoadError};
use crate::model::TrustStore;

/// Load a PEM bundle of CA certificates
///
/// Every call reads the file again and returns an independent store.
///
/// # Errors
///
/// - `Unreadable` if the file cannot be read
/// - `Malformed` if the PEM is broken or holds no usable certificate
/// - `EncryptedBundleUnsupported` if a non-empty passphrase is given, since
///   PEM bundles are never encrypted
pub fn load_trust_store(path: impl AsRef<Path>, passphrase: Option<&str>) -> MtlsResult<TrustStore> {
    let path = path.as_ref();
    let display = path.display().to_string();

    if passphrase.is_some_and(|p| !p.is_empty()) {
        return Err(TrustLoadError::EncryptedBundleUnsupported { path: display }.into());
    }

    let pem = fs::read(path).map_err(|source| TrustLoadError::Unreadable {
        path: display.clone(),
        source,
    })?;
    let store = TrustStore::from_pem(&pem, display)?;

    info!(
        "Loaded {} trust anchors from {}",
        store.len(),
        store.source()
    );
    Ok(store)
}

/// Load the platform's trust anchors
pub fn load_native_trust_store() -> MtlsResult<TrustStore> {
    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        warn!("Skipping part of the platform trust store: {}", err);
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(result.certs);
    if ignored > 0 {
        warn!("Ignored {} unusable platform certificates", ignored);
    }
    if added == 0 {
        return Err(TrustLoadError::Malformed {
            path: "native".to_string(),
            reason: "platform trust store holds no usable certificate".to_string(),
        }
        .into());
    }

    info!("Loaded {} trust anchors from the platform store", added);
    Ok(TrustStore::from_root_store(roots, "native"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MtlsError;
    use crate::test_fixtures::TestCa;
    use rcgen::PKCS_ECDSA_P256_SHA256;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn bundle(cas: &[&TestCa]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for ca in cas {
            file.write_all(ca.cert.pem().as_bytes()).unwrap();
        }
        file
    }

    #[test]
    fn test_load_bundle() {
        let ca = TestCa::new("ca1");
        let file = bundle(&[&ca]);

        let store = load_trust_store(file.path(), None).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains_subject(&ca.subject()));
    }

    #[test]
    fn test_load_is_idempotent() {
        let file = bundle(&[&TestCa::new("ca1"), &TestCa::new("ca2")]);

        let first = load_trust_store(file.path(), None).unwrap();
        let second = load_trust_store(file.path(), None).unwrap();

        assert_eq!(first, second);
        assert!(!std::sync::Arc::ptr_eq(&first.roots(), &second.roots()));
    }

    #[test]
    fn test_loaded_store_verifies_issued_chain() {
        let ca = TestCa::new("ca1");
        let file = bundle(&[&ca]);
        let (_, chain) = ca.issue("client", &PKCS_ECDSA_P256_SHA256);

        let store = load_trust_store(file.path(), None).unwrap();
        assert!(store.verify_client_chain(&chain).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let result = load_trust_store("/nonexistent/ca.pem", None);
        assert!(matches!(
            result.unwrap_err(),
            MtlsError::TrustLoad(TrustLoadError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_malformed_bundle() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"-----BEGIN CERTIFICATE-----\nnot base64!\n-----END CERTIFICATE-----\n")
            .unwrap();

        let result = load_trust_store(file.path(), None);
        assert!(matches!(
            result.unwrap_err(),
            MtlsError::TrustLoad(TrustLoadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_passphrase_rejected() {
        let file = bundle(&[&TestCa::new("ca1")]);

        let result = load_trust_store(file.path(), Some("changeit"));
        assert!(matches!(
            result.unwrap_err(),
            MtlsError::TrustLoad(TrustLoadError::EncryptedBundleUnsupported { .. })
        ));
        assert!(load_trust_store(file.path(), Some("")).is_ok());
    }
}
