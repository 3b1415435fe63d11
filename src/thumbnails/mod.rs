//! Thumbnail pipeline.
//!
//! This module provides:
//! - `PreviewCache` - Bounded LRU of decoded previews keyed by content identity
//! - `PreviewDecoder` / `MediaDecoder` - Still-image decode and video frame extraction
//! - `VideoPool` - Fixed-size FIFO worker pool for video frames
//! - `Item` - Per-file load state machine with debounce
//! - `BindingGuard` - Keeps late results off recycled display slots
//! - `ThumbnailEngine` - Event loop owner tying the pieces together

pub mod cache;
pub mod debounce;
pub mod diagnostics;
pub mod engine;
pub mod generator;
pub mod guard;
pub mod image_path;
pub mod item;
pub mod pool;

pub use cache::{CacheKey, PreviewCache};
pub use diagnostics::DiagnosticsSnapshot;
pub use engine::{DisplaySink, ThumbnailEngine};
pub use generator::{MediaDecoder, PreviewDecoder};
pub use guard::SlotId;
pub use item::{Item, ItemId, ItemState};
pub use pool::{FrameTask, FrameTicket, VideoPool};
