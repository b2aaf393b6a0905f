//! Use cases (orchestration)
//!
//! Each use case drives one step of setting up a client: loading trust
//! anchors, binding HSM keys to certificates, assembling the session.

mod bind_identity;
mod build_session;
mod load_trust_store;

pub use bind_identity::{bind_identity, link_identity, IdentityBinder};
pub use build_session::build_session;
pub use load_trust_store::{load_native_trust_store, load_trust_store};
