//! Adapters - concrete implementations of ports (traits)

mod pkcs11;
mod software;

// Re-export for convenience
pub use pkcs11::{Pkcs11Config, Pkcs11Module};
pub use software::SoftwareModule;
