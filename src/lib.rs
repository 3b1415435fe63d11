//! thumbd: thumbnail generation, caching and delivery for media browsers.
//!
//! The display layer binds reusable slots to Items; the engine answers from
//! the preview cache or decodes in the background and pushes the result to
//! whichever slots still show that Item.

pub mod config;
pub mod error;
pub mod models;
pub mod thumbnails;

pub use config::ThumbnailConfig;
pub use error::{Result, ThumbnailError};
pub use models::{is_media_path, Bounds, MediaKind, PreviewImage};
pub use thumbnails::{
    DiagnosticsSnapshot, DisplaySink, ItemId, ItemState, MediaDecoder, PreviewDecoder, SlotId,
    ThumbnailEngine,
};
