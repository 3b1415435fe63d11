#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use parking_lot::Mutex;

use thumbd::{
    Bounds, DisplaySink, ItemId, PreviewDecoder, PreviewImage, Result, SlotId, ThumbnailConfig,
    ThumbnailEngine, ThumbnailError,
};

/// Decoder double: counts calls, tracks concurrency, and can hold a decode
/// until the test opens its gate.
pub struct FakeDecoder {
    pub image_calls: AtomicUsize,
    pub video_calls: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub started: Mutex<Vec<PathBuf>>,
    started_tx: flume::Sender<PathBuf>,
    started_rx: flume::Receiver<PathBuf>,
    gates: Mutex<HashMap<PathBuf, flume::Receiver<()>>>,
    failing: Mutex<HashSet<PathBuf>>,
    delay: Duration,
}

impl FakeDecoder {
    pub fn new() -> Self {
        let (started_tx, started_rx) = flume::unbounded();
        Self {
            image_calls: AtomicUsize::new(0),
            video_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            started_tx,
            started_rx,
            gates: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
        }
    }

    /// Every decode sleeps this long before finishing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold the next decode of `path` until the returned sender sends or is
    /// dropped.
    pub fn gate(&self, path: impl Into<PathBuf>) -> flume::Sender<()> {
        let (tx, rx) = flume::unbounded();
        self.gates.lock().insert(path.into(), rx);
        tx
    }

    pub fn fail(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    pub fn heal(&self, path: &Path) {
        self.failing.lock().remove(path);
    }

    pub fn calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst) + self.video_calls.load(Ordering::SeqCst)
    }

    /// Wait for the next decode to start.
    pub async fn next_start(&self) -> PathBuf {
        tokio::time::timeout(Duration::from_secs(5), self.started_rx.recv_async())
            .await
            .expect("no decode started")
            .expect("start channel closed")
    }

    /// True if another decode starts within `window`.
    pub async fn starts_within(&self, window: Duration) -> bool {
        tokio::time::timeout(window, self.started_rx.recv_async())
            .await
            .is_ok()
    }

    fn run(&self, path: &Path, width: u32, height: u32) -> Result<PreviewImage> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.started.lock().push(path.to_path_buf());
        let _ = self.started_tx.send(path.to_path_buf());

        let gate = self.gates.lock().remove(path);
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(path) {
            return Err(ThumbnailError::decode_failed(path, "fake failure"));
        }
        Ok(PreviewImage::new(RgbaImage::new(width, height)))
    }
}

impl PreviewDecoder for FakeDecoder {
    fn decode_image(&self, path: &Path, bounds: Bounds) -> Result<PreviewImage> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.run(path, bounds.width, bounds.height)
    }

    fn extract_frame(&self, path: &Path, width: u32, _timeout: Duration) -> Result<PreviewImage> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        self.run(path, width, width / 2)
    }
}

#[derive(Debug, Clone)]
pub enum Content {
    Placeholder(ItemId),
    Ready(ItemId, PreviewImage),
    Failed(ItemId),
}

impl Content {
    pub fn item(&self) -> ItemId {
        match self {
            Content::Placeholder(id) | Content::Ready(id, _) | Content::Failed(id) => *id,
        }
    }
}

/// Display double remembering every update per slot.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub history: Vec<(SlotId, Content)>,
}

impl RecordingSink {
    pub fn current(&self, slot: SlotId) -> Option<&Content> {
        self.history
            .iter()
            .rev()
            .find(|(s, _)| *s == slot)
            .map(|(_, content)| content)
    }

    pub fn ready_preview(&self, slot: SlotId) -> Option<&PreviewImage> {
        match self.current(slot) {
            Some(Content::Ready(_, preview)) => Some(preview),
            _ => None,
        }
    }

    /// Whether `slot` was ever shown a finished result of `item`.
    pub fn showed_result(&self, slot: SlotId, item: ItemId) -> bool {
        self.history.iter().any(|(s, content)| {
            *s == slot && content.item() == item && !matches!(content, Content::Placeholder(_))
        })
    }
}

impl DisplaySink for RecordingSink {
    fn on_ready(&mut self, slot: SlotId, item: ItemId, preview: &PreviewImage) {
        self.history.push((slot, Content::Ready(item, preview.clone())));
    }

    fn on_failed(&mut self, slot: SlotId, item: ItemId) {
        self.history.push((slot, Content::Failed(item)));
    }

    fn on_placeholder(&mut self, slot: SlotId, item: ItemId) {
        self.history.push((slot, Content::Placeholder(item)));
    }
}

pub const IMAGE_DEBOUNCE: Duration = Duration::from_millis(10);
pub const VIDEO_DEBOUNCE: Duration = Duration::from_millis(30);

pub fn test_config() -> ThumbnailConfig {
    ThumbnailConfig {
        image_debounce: IMAGE_DEBOUNCE,
        video_debounce: VIDEO_DEBOUNCE,
        video_workers: 2,
        ..ThumbnailConfig::default()
    }
}

pub fn engine_with(fake: &Arc<FakeDecoder>) -> ThumbnailEngine<RecordingSink> {
    engine_with_config(fake, test_config())
}

pub fn engine_with_config(
    fake: &Arc<FakeDecoder>,
    config: ThumbnailConfig,
) -> ThumbnailEngine<RecordingSink> {
    let decoder: Arc<dyn PreviewDecoder> = fake.clone();
    ThumbnailEngine::new(config, decoder, RecordingSink::default()).unwrap()
}
