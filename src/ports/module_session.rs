use crate::error::MtlsResult;
use crate::model::Pin;

/// Lifecycle of the connection to the module
///
/// Implementations use interior mutability: one module instance is shared by
/// every connection in the process.
pub trait ModuleSession {
    /// Load and initialise the module library and open a session
    ///
    /// Calling it again on a registered module is a no-op.
    fn register(&self) -> MtlsResult<()>;

    /// Log in to the module
    ///
    /// # Errors
    ///
    /// Returns `MtlsError::Module(ModuleError::AuthenticationFailed)` on a wrong
    /// PIN, and `ModuleError::Session` when `register` was not called first.
    fn authenticate(&self, pin: Option<&Pin>) -> MtlsResult<()>;

    /// Log out and close the session; keys become unreachable
    fn close(&self) -> MtlsResult<()>;
}
