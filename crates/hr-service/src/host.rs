//! The boundary to the bot runtime that owns the loaded extensions.

use async_trait::async_trait;
use hr_core::ExtensionId;

/// Failures reported by an [`ExtensionHost`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The extension is not loaded, so it cannot be reloaded or unloaded.
    #[error("extension '{0}' is not loaded")]
    NotLoaded(ExtensionId),

    /// The extension is already loaded.
    #[error("extension '{0}' is already loaded")]
    AlreadyLoaded(ExtensionId),

    /// The host cannot find the extension's module.
    #[error("extension '{0}' was not found")]
    NotFound(ExtensionId),

    /// Any other failure, usually an error raised by the extension's code.
    #[error("{0}")]
    Failed(String),
}

impl HostError {
    /// Creates a [`HostError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// The runtime whose extension table the service mutates.
///
/// Implementations do not need to serialize calls themselves: the service
/// never runs two mutating calls at the same time.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use hr_core::ExtensionId;
/// use hr_service::{ExtensionHost, HostError};
///
/// struct Noop;
///
/// #[async_trait]
/// impl ExtensionHost for Noop {
///     fn is_loaded(&self, _extension: &ExtensionId) -> bool {
///         false
///     }
///     fn loaded_extensions(&self) -> Vec<ExtensionId> {
///         Vec::new()
///     }
///     async fn load(&self, _extension: &ExtensionId) -> Result<(), HostError> {
///         Ok(())
///     }
///     async fn reload(&self, extension: &ExtensionId) -> Result<(), HostError> {
///         Err(HostError::NotLoaded(extension.clone()))
///     }
///     async fn unload(&self, extension: &ExtensionId) -> Result<(), HostError> {
///         Err(HostError::NotLoaded(extension.clone()))
///     }
/// }
/// ```
#[async_trait]
pub trait ExtensionHost: Send + Sync + 'static {
    /// Returns `true` if `extension` is currently loaded.
    fn is_loaded(&self, extension: &ExtensionId) -> bool;

    /// Returns every loaded extension.
    fn loaded_extensions(&self) -> Vec<ExtensionId>;

    /// Loads `extension` fresh.
    async fn load(&self, extension: &ExtensionId) -> Result<(), HostError>;

    /// Reloads a loaded `extension` in place.
    ///
    /// Returns [`HostError::NotLoaded`] if it turned out not to be loaded.
    async fn reload(&self, extension: &ExtensionId) -> Result<(), HostError>;

    /// Unloads `extension`.
    async fn unload(&self, extension: &ExtensionId) -> Result<(), HostError>;
}
