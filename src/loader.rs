//! Loader seam: how the engine module bytes are obtained.
//!
//! The facade does not care where the wasm blob comes from — a file, an
//! embedded resource, or a network fetch. [`crate::initialize`] and
//! [`crate::Engine::from_loader`] accept any async function yielding the raw
//! module bytes; this module provides the common case.

use std::path::Path;

use log::debug;

/// Read the engine module from a file on disk.
///
/// ```rust,no_run
/// # async fn demo() -> anyhow::Result<()> {
/// let engine = wasmstone::initialize(|| wasmstone::loader::from_path("capstone.wasm")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    debug!("loaded {} byte engine module from {}", bytes.len(), path.display());
    Ok(bytes)
}
