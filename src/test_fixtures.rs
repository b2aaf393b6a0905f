//! Certificates, modules and providers shared by unit tests

use std::sync::Arc;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, SignatureAlgorithm,
};
use rustls::pki_types::CertificateDer;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::adapters::SoftwareModule;
use crate::model::{CertificateChain, Credential, KeyAlias, TrustStore};
use crate::provider::HsmKeyProvider;
use crate::use_cases::link_identity;

pub(crate) const ALIAS: &str = "badssl";

/// 2048-bit RSA keys; ring cannot generate RSA keys
const RSA_CLIENT_KEY: &str = include_str!("../tests/data/rsa_client.key.pem");
const RSA_OTHER_KEY: &str = include_str!("../tests/data/rsa_other.key.pem");

pub(crate) fn rsa_key() -> KeyPair {
    KeyPair::from_pem(RSA_CLIENT_KEY).unwrap()
}

/// RSA key unrelated to [`rsa_key`]
pub(crate) fn other_rsa_key() -> KeyPair {
    KeyPair::from_pem(RSA_OTHER_KEY).unwrap()
}

/// Self-signed certificate authority
pub(crate) struct TestCa {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl TestCa {
    pub fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    /// DER subject name, as a server lists it in a CertificateRequest
    pub fn subject(&self) -> Vec<u8> {
        let (_, parsed) = X509Certificate::from_der(self.cert.der().as_ref()).unwrap();
        parsed.subject().as_raw().to_vec()
    }

    pub fn der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    pub fn trust_store(&self) -> TrustStore {
        TrustStore::from_certificates(vec![self.der()], "test").unwrap()
    }

    /// Client certificate for `key`, chain holds only the leaf
    pub fn issue_for(&self, name: &str, key: &KeyPair) -> CertificateChain {
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, name);
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let cert = params.signed_by(key, &self.cert, &self.key).unwrap();
        CertificateChain::from_der(vec![cert.der().clone()]).unwrap()
    }

    /// Fresh key plus client certificate
    pub fn issue(&self, name: &str, alg: &'static SignatureAlgorithm) -> (KeyPair, CertificateChain) {
        let key = KeyPair::generate_for(alg).unwrap();
        let chain = self.issue_for(name, &key);
        (key, chain)
    }
}

/// Software module holding `key` under [`ALIAS`]
pub(crate) fn software_module(key: &KeyPair) -> Arc<SoftwareModule> {
    let module = SoftwareModule::new();
    module
        .import_key(
            KeyAlias::new(ALIAS).unwrap(),
            &key.serialize_der(),
            &key.public_key_der(),
        )
        .unwrap();
    Arc::new(module)
}

/// Initialised provider over a software module holding `key`
pub(crate) fn ready_provider(key: &KeyPair) -> (HsmKeyProvider, Arc<SoftwareModule>) {
    let module = software_module(key);
    let provider = HsmKeyProvider::new(module.clone());
    provider.initialize(None).unwrap();
    (provider, module)
}

/// Credential for a fresh key under `alias`, certified by `ca`
pub(crate) fn bound_credential(
    ca: &TestCa,
    alias: &str,
    alg: &'static SignatureAlgorithm,
) -> Arc<Credential> {
    let key = KeyPair::generate_for(alg).unwrap();
    let chain = ca.issue_for(alias, &key);
    let alias = KeyAlias::new(alias).unwrap();

    let module = SoftwareModule::new();
    module
        .import_key(alias.clone(), &key.serialize_der(), &key.public_key_der())
        .unwrap();
    let provider = HsmKeyProvider::new(Arc::new(module));
    provider.initialize(None).unwrap();

    Arc::new(link_identity(&provider, &alias, chain).unwrap())
}
