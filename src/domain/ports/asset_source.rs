//! Port for bundled asset readers.

/// Reads named assets shipped with an application bundle.
///
/// Calls block; the pipeline only invokes them from blocking worker threads.
pub trait AssetSource: Send + Sync {
    /// Identifier of the bundle the assets belong to.
    fn bundle_id(&self) -> &str;

    /// Reads the full contents of `name`.
    ///
    /// # Errors
    /// Returns `NotFound` if the bundle has no such asset.
    fn open(&self, name: &str) -> std::io::Result<Vec<u8>>;
}
