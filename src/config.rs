//! Runtime configuration for the thumbnail engine.
//!
//! Defaults match the tuned values of the pipeline. A handful of knobs can be
//! overridden through `THUMBD_*` environment variables at process start.

use std::time::Duration;

use tracing::warn;

use crate::models::{Bounds, MediaKind};

/// Default number of cached previews.
pub const DEFAULT_CACHE_ENTRIES: usize = 256;

/// Default number of concurrent video frame extractions.
pub const DEFAULT_VIDEO_WORKERS: usize = 2;

/// Upper bound for the video worker count.
pub const MAX_VIDEO_WORKERS: usize = 8;

/// Debounce before decoding a still image.
pub const DEFAULT_IMAGE_DEBOUNCE_MS: u64 = 80;

/// Debounce before extracting a video frame; only start after scrolling stops.
pub const DEFAULT_VIDEO_DEBOUNCE_MS: u64 = 500;

/// Edge of the square box still images are fit into.
pub const DEFAULT_PREVIEW_EDGE: u32 = 128;

/// Deadline for a single video frame extraction.
pub const DEFAULT_VIDEO_TIMEOUT_MS: u64 = 5_000;

const ENV_CACHE_ENTRIES: &str = "THUMBD_CACHE_ENTRIES";
const ENV_VIDEO_WORKERS: &str = "THUMBD_VIDEO_WORKERS";
const ENV_VIDEO_TIMEOUT_MS: &str = "THUMBD_VIDEO_TIMEOUT_MS";
const ENV_DEBUG: &str = "THUMBD_THUMBNAILS_DEBUG";

#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// Maximum number of previews kept in the in-memory cache.
    pub max_cache_entries: usize,
    /// Size of the bounded video worker pool.
    pub video_workers: usize,
    /// Debounce delay for still images.
    pub image_debounce: Duration,
    /// Debounce delay for videos.
    pub video_debounce: Duration,
    /// Bounding box still images are scaled into.
    pub image_bounds: Bounds,
    /// Fixed width of video previews.
    pub video_width: u32,
    /// Wait limit for a single frame extraction.
    pub video_timeout: Duration,
    /// Emit a log line for every counted diagnostic event.
    pub debug: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: DEFAULT_CACHE_ENTRIES,
            video_workers: DEFAULT_VIDEO_WORKERS,
            image_debounce: Duration::from_millis(DEFAULT_IMAGE_DEBOUNCE_MS),
            video_debounce: Duration::from_millis(DEFAULT_VIDEO_DEBOUNCE_MS),
            image_bounds: Bounds::square(DEFAULT_PREVIEW_EDGE),
            video_width: DEFAULT_PREVIEW_EDGE,
            video_timeout: Duration::from_millis(DEFAULT_VIDEO_TIMEOUT_MS),
            debug: false,
        }
    }
}

impl ThumbnailConfig {
    /// Defaults with `THUMBD_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(entries) = parse_positive(&lookup, ENV_CACHE_ENTRIES) {
            config.max_cache_entries = entries;
        }
        if let Some(workers) = parse_positive(&lookup, ENV_VIDEO_WORKERS) {
            config.video_workers = workers.min(MAX_VIDEO_WORKERS);
        }
        if let Some(ms) = parse_positive(&lookup, ENV_VIDEO_TIMEOUT_MS) {
            config.video_timeout = Duration::from_millis(ms as u64);
        }
        config.debug = lookup(ENV_DEBUG).is_some();

        config
    }

    /// Debounce delay for the given kind of media.
    pub fn debounce_for(&self, kind: MediaKind) -> Duration {
        match kind {
            MediaKind::StillImage => self.image_debounce,
            MediaKind::Video => self.video_debounce,
        }
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<usize> {
    let raw = lookup(key)?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid configuration override");
            None
        }
    }
}
