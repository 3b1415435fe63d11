//! Per-path load state machine.
//!
//! ```text
//! Idle -> PendingDebounce -> Loading -> Ready
//!   ^           |                  \-> Failed
//!   \-----------/ (cancel)
//! ```
//!
//! A cache hit jumps straight from `Idle` to `Ready`. Every new cycle bumps
//! the Item's generation; timer and decode messages carry the generation
//! they were issued under and are ignored once it has moved on.

use std::fmt;
use std::path::{Path, PathBuf};

use super::debounce::PendingTimer;
use crate::models::{MediaKind, PreviewImage};

/// Identity of an Item. Never reused within an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Idle,
    PendingDebounce,
    Loading,
    Ready,
    Failed,
}

impl ItemState {
    /// Ready and Failed do not move without outside intervention.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

#[derive(Debug)]
enum Phase {
    Idle,
    /// Holding the timer keeps it armed.
    Pending { _timer: PendingTimer },
    Loading,
    Ready(PreviewImage),
    Failed,
}

/// One schedulable unit of work: a path and its preview lifecycle.
#[derive(Debug)]
pub struct Item {
    path: PathBuf,
    kind: MediaKind,
    phase: Phase,
    generation: u64,
}

impl Item {
    pub(crate) fn new(path: PathBuf) -> Self {
        let kind = MediaKind::from_path(&path);
        Self {
            path,
            kind,
            phase: Phase::Idle,
            generation: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> ItemState {
        match self.phase {
            Phase::Idle => ItemState::Idle,
            Phase::Pending { .. } => ItemState::PendingDebounce,
            Phase::Loading => ItemState::Loading,
            Phase::Ready(_) => ItemState::Ready,
            Phase::Failed => ItemState::Failed,
        }
    }

    pub fn preview(&self) -> Option<&PreviewImage> {
        match &self.phase {
            Phase::Ready(preview) => Some(preview),
            _ => None,
        }
    }

    /// `Idle -> Ready` on a cache hit.
    pub(crate) fn ready_from_cache(&mut self, preview: PreviewImage) -> bool {
        if !matches!(self.phase, Phase::Idle) {
            return false;
        }
        self.generation += 1;
        self.phase = Phase::Ready(preview);
        true
    }

    /// `Idle -> PendingDebounce`. `schedule` receives the new generation and
    /// returns the timer that will announce it.
    pub(crate) fn begin_debounce(
        &mut self,
        schedule: impl FnOnce(u64) -> PendingTimer,
    ) -> Option<u64> {
        if !matches!(self.phase, Phase::Idle) {
            return None;
        }
        self.generation += 1;
        self.phase = Phase::Pending {
            _timer: schedule(self.generation),
        };
        Some(self.generation)
    }

    /// `PendingDebounce -> Idle`. Dropping the timer cancels it; the
    /// generation bump invalidates a message that raced the cancellation.
    pub(crate) fn cancel_pending(&mut self) -> bool {
        if !matches!(self.phase, Phase::Pending { .. }) {
            return false;
        }
        self.generation += 1;
        self.phase = Phase::Idle;
        true
    }

    /// `PendingDebounce -> Loading` when the timer for `generation` fires.
    pub(crate) fn begin_loading(&mut self, generation: u64) -> bool {
        if generation != self.generation || !matches!(self.phase, Phase::Pending { .. }) {
            return false;
        }
        self.phase = Phase::Loading;
        true
    }

    /// `Loading -> Ready | Failed` for the decode issued under `generation`.
    pub(crate) fn complete(&mut self, generation: u64, preview: Option<PreviewImage>) -> bool {
        if generation != self.generation || !matches!(self.phase, Phase::Loading) {
            return false;
        }
        self.phase = match preview {
            Some(preview) => Phase::Ready(preview),
            None => Phase::Failed,
        };
        true
    }

    /// `Failed -> Idle`, allowing another attempt.
    pub(crate) fn reset_failed(&mut self) -> bool {
        if !matches!(self.phase, Phase::Failed) {
            return false;
        }
        self.generation += 1;
        self.phase = Phase::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::time::Duration;

    fn item(path: &str) -> Item {
        Item::new(PathBuf::from(path))
    }

    fn preview() -> PreviewImage {
        PreviewImage::new(RgbaImage::new(1, 1))
    }

    fn timer() -> PendingTimer {
        let (tx, _rx) = flume::unbounded::<()>();
        crate::thumbnails::debounce::schedule(&tx, (), Duration::from_secs(60))
    }

    #[test]
    fn test_kind_resolved_once() {
        assert_eq!(item("/v/clip.mkv").kind(), MediaKind::Video);
        assert_eq!(item("/p/photo.png").kind(), MediaKind::StillImage);
    }

    #[tokio::test]
    async fn test_happy_path() {
        let mut item = item("/p/photo.png");
        assert_eq!(item.state(), ItemState::Idle);

        let generation = item.begin_debounce(|_| timer()).unwrap();
        assert_eq!(item.state(), ItemState::PendingDebounce);

        assert!(item.begin_loading(generation));
        assert_eq!(item.state(), ItemState::Loading);

        assert!(item.complete(generation, Some(preview())));
        assert_eq!(item.state(), ItemState::Ready);
        assert!(item.preview().is_some());
    }

    #[tokio::test]
    async fn test_second_debounce_is_rejected() {
        let mut item = item("/p/photo.png");
        assert!(item.begin_debounce(|_| timer()).is_some());
        assert!(item.begin_debounce(|_| timer()).is_none());
    }

    #[tokio::test]
    async fn test_cancel_invalidates_racing_fire() {
        let mut item = item("/p/photo.png");
        let generation = item.begin_debounce(|_| timer()).unwrap();
        assert!(item.cancel_pending());
        assert_eq!(item.state(), ItemState::Idle);

        assert!(!item.begin_loading(generation));
        assert_eq!(item.state(), ItemState::Idle);
    }

    #[tokio::test]
    async fn test_failure_is_terminal_until_reset() {
        let mut item = item("/p/broken.png");
        let generation = item.begin_debounce(|_| timer()).unwrap();
        item.begin_loading(generation);
        assert!(item.complete(generation, None));
        assert_eq!(item.state(), ItemState::Failed);

        assert!(item.begin_debounce(|_| timer()).is_none());
        assert!(!item.ready_from_cache(preview()));

        assert!(item.reset_failed());
        assert_eq!(item.state(), ItemState::Idle);
        assert!(item.generation() > generation);
    }

    #[test]
    fn test_cache_hit_skips_debounce() {
        let mut item = item("/p/photo.png");
        assert!(item.ready_from_cache(preview()));
        assert_eq!(item.state(), ItemState::Ready);
        assert!(!item.cancel_pending());
    }

    #[test]
    fn test_complete_requires_loading() {
        let mut item = item("/p/photo.png");
        assert!(!item.complete(0, Some(preview())));
        assert_eq!(item.state(), ItemState::Idle);
    }
}
