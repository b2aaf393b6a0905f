//! Ports (traits) at the edges of the core
//!
//! The core depends on these abstractions, never on a concrete module or
//! selection policy. `HsmModule` is everything the core needs from an
//! external security module; `CredentialSelector` decides which identity to
//! present when a server asks for one.

mod credential_selector;
mod key_lookup;
mod module_session;
mod signer;


pub use credential_selector::{ClientAuthRequest, CredentialSelector};
pub use key_lookup::KeyLookup;
pub use module_session::ModuleSession;
pub use signer::KeySigner;

/// Combined trait for an external security module
///
/// A module is shared by every connection, so it must be usable from several
/// threads at once. The module itself may serialise access internally.
pub trait HsmModule: ModuleSession + KeyLookup + KeySigner + Send + Sync {}

impl<T> HsmModule for T where T: ModuleSession + KeyLookup + KeySigner + Send + Sync {}
