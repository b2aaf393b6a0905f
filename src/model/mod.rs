//! Domain types
//!
//! Newtypes and value objects that enforce their invariants at construction.
//! Nothing in here talks to the module or the network.

mod algorithm;
mod alias;
mod certificate_chain;
mod credential;
mod key_handle;
mod key_material;
mod pin;
mod trust_store;

pub use algorithm::KeyAlgorithm;
pub use alias::{AliasError, KeyAlias};
pub use certificate_chain::{CertificateChain, LeafSummary};
pub use credential::Credential;
pub use key_handle::{KeyDescriptor, KeyHandle};
pub use key_material::PublicKeyMaterial;
pub use pin::{Pin, PinError};
pub use trust_store::TrustStore;
