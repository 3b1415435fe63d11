//! Still-image decode path.
//!
//! Not pool-bounded: each request gets its own slot on tokio's blocking
//! pool. Concurrency is naturally limited by how many Items are `Loading`
//! at once, which tracks the visible window.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::trace;

use super::generator::PreviewDecoder;
use crate::error::{Result, ThumbnailError};
use crate::models::{Bounds, PreviewImage};

/// Decode `path` into a preview fitting `bounds` without blocking the
/// calling task. Must be polled within a tokio runtime.
pub fn decode_async(
    decoder: Arc<dyn PreviewDecoder>,
    path: PathBuf,
    bounds: Bounds,
) -> impl Future<Output = Result<PreviewImage>> + Send + 'static {
    async move {
        let task_path = path.clone();
        let joined =
            tokio::task::spawn_blocking(move || decoder.decode_image(&task_path, bounds)).await;

        match joined {
            Ok(result) => result,
            Err(e) => {
                trace!(?path, error = %e, "Image decode task did not finish");
                Err(ThumbnailError::decode_failed(&path, "decoder crashed"))
            }
        }
    }
}
