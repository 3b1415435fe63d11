//! The thumbnail engine.
//!
//! Single owner of the preview cache, the Item set, and the slot registry.
//! All of that state is mutated only through `&mut self` on the event loop;
//! timers and decoders run elsewhere and report back as messages on one
//! flume channel, which is the only synchronisation point.
//!
//! Flow for one Item:
//! bind -> request_load -> cache hit (Ready) | debounce -> Loading ->
//! decode (blocking pool for images, bounded pool for videos) -> cache put ->
//! Ready/Failed -> BindingGuard routes the update to the slots still showing it.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use flume::{Receiver, Sender};
use tracing::{debug, trace, warn};

use super::cache::{CacheKey, PreviewCache};
use super::debounce;
use super::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use super::generator::{MediaDecoder, PreviewDecoder};
use super::guard::{BindingGuard, SlotId};
use super::image_path::decode_async;
use super::item::{Item, ItemId, ItemState};
use super::pool::{FrameTask, VideoPool};
use crate::config::ThumbnailConfig;
use crate::error::{Result, ThumbnailError};
use crate::models::{MediaKind, PreviewImage};

/// Receives visual updates for display slots. Implemented by the display
/// layer; every call happens on the event loop.
pub trait DisplaySink {
    /// The slot's Item has a preview.
    fn on_ready(&mut self, slot: SlotId, item: ItemId, preview: &PreviewImage);

    /// The slot's Item could not be previewed; show the fallback icon.
    fn on_failed(&mut self, slot: SlotId, item: ItemId);

    /// The slot was bound to an Item that has no preview yet.
    fn on_placeholder(&mut self, slot: SlotId, item: ItemId);
}

enum EngineEvent {
    DebounceElapsed {
        item: ItemId,
        generation: u64,
    },
    Decoded {
        item: ItemId,
        generation: u64,
        key: CacheKey,
        kind: MediaKind,
        path: PathBuf,
        result: Result<PreviewImage>,
    },
}

pub struct ThumbnailEngine<S: DisplaySink> {
    config: ThumbnailConfig,
    decoder: Arc<dyn PreviewDecoder>,
    /// Created on first lookup.
    cache: Option<PreviewCache>,
    pool: VideoPool,
    items: HashMap<ItemId, Item>,
    /// Item identities in path-list order.
    order: Vec<ItemId>,
    next_item: u64,
    guard: BindingGuard,
    sink: S,
    diagnostics: Diagnostics,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    shut_down: bool,
}

impl<S: DisplaySink> ThumbnailEngine<S> {
    /// Build an engine around `decoder`. Starts the video worker threads.
    ///
    /// Binding and loading spawn timers and decode tasks, so those calls
    /// must happen inside a tokio runtime.
    pub fn new(config: ThumbnailConfig, decoder: Arc<dyn PreviewDecoder>, sink: S) -> Result<Self> {
        let pool = VideoPool::new(config.video_workers, Arc::clone(&decoder))?;
        let (events_tx, events_rx) = flume::unbounded();
        let diagnostics = Diagnostics::new(config.debug);

        debug!(
            max_cache_entries = config.max_cache_entries,
            video_workers = pool.size(),
            "Thumbnail engine ready"
        );

        Ok(Self {
            config,
            decoder,
            cache: None,
            pool,
            items: HashMap::new(),
            order: Vec::new(),
            next_item: 0,
            guard: BindingGuard::new(),
            sink,
            diagnostics,
            events_tx,
            events_rx,
            shut_down: false,
        })
    }

    /// Engine decoding with the `image` crate and `ffmpeg`.
    pub fn with_media_decoder(config: ThumbnailConfig, sink: S) -> Result<Self> {
        Self::new(config, Arc::new(MediaDecoder::default()), sink)
    }

    /// Replace the Item set with one Item per distinct path, in order.
    ///
    /// Pending debounces of the old Items are cancelled and every slot is
    /// unbound. In-flight decodes still land in the cache, which is keyed by
    /// content and survives the rebuild.
    pub fn set_paths<I, P>(&mut self, paths: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let unbound = self.guard.clear().len();
        let dropped = self.items.len();
        self.items.clear();
        self.order.clear();

        let mut seen = HashSet::new();
        for path in paths {
            let path = path.into();
            if !seen.insert(path.clone()) {
                continue;
            }
            self.next_item += 1;
            let id = ItemId(self.next_item);
            self.items.insert(id, Item::new(path));
            self.order.push(id);
        }

        debug!(
            items = self.order.len(),
            dropped, unbound, "Rebuilt thumbnail item set"
        );
        self.order.clone()
    }

    /// Item identities in path-list order.
    pub fn items(&self) -> &[ItemId] {
        &self.order
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_state(&self, id: ItemId) -> Option<ItemState> {
        self.items.get(&id).map(Item::state)
    }

    pub fn item_kind(&self, id: ItemId) -> Option<MediaKind> {
        self.items.get(&id).map(Item::kind)
    }

    pub fn preview(&self, id: ItemId) -> Option<PreviewImage> {
        self.items.get(&id).and_then(|item| item.preview().cloned())
    }

    /// Idempotent load request. Ready, Failed, pending, and loading Items are
    /// left alone; an idle Item is served from the cache or debounced.
    pub fn request_load(&mut self, id: ItemId) {
        let Some(item) = self.items.get_mut(&id) else {
            trace!(%id, "Load requested for unknown item");
            return;
        };
        if item.state() != ItemState::Idle {
            trace!(%id, state = ?item.state(), "Load already settled or in progress");
            return;
        }

        let key = CacheKey::for_file(item.path());
        let max_entries = self.config.max_cache_entries;
        let cache = self
            .cache
            .get_or_insert_with(|| PreviewCache::new(max_entries));

        if let Some(preview) = cache.get(&key) {
            self.diagnostics.cache_hit(item.path());
            item.ready_from_cache(preview);
            self.deliver(id);
            return;
        }
        self.diagnostics.cache_miss(item.path());

        let delay = self.config.debounce_for(item.kind());
        let events = &self.events_tx;
        item.begin_debounce(|generation| {
            debounce::schedule(
                events,
                EngineEvent::DebounceElapsed {
                    item: id,
                    generation,
                },
                delay,
            )
        });
        trace!(%id, ?delay, "Debouncing load");
    }

    /// Same as [`request_load`](Self::request_load), for callers driving
    /// loads without binding a slot.
    pub fn ensure_loaded(&mut self, id: ItemId) {
        self.request_load(id);
    }

    /// Cancel a load that is still waiting out its debounce.
    pub fn cancel_pending(&mut self, id: ItemId) -> bool {
        let cancelled = self
            .items
            .get_mut(&id)
            .is_some_and(|item| item.cancel_pending());
        if cancelled {
            trace!(%id, "Cancelled pending load");
        }
        cancelled
    }

    /// Give a Failed Item another attempt. Slots currently showing it will
    /// receive the outcome.
    pub fn retry(&mut self, id: ItemId) -> bool {
        let reset = self
            .items
            .get_mut(&id)
            .is_some_and(|item| item.reset_failed());
        if !reset {
            return false;
        }

        debug!(%id, "Retrying failed item");
        for slot in self.guard.watch_bound_slots(id) {
            self.sink.on_placeholder(slot, id);
        }
        self.request_load(id);
        true
    }

    /// Show `id` in `slot` and start loading it if needed.
    pub fn bind(&mut self, slot: SlotId, id: ItemId) {
        let Some(state) = self.item_state(id) else {
            warn!(%slot, %id, "Bind to unknown item ignored");
            return;
        };

        if self.guard.bound_item(slot).is_some_and(|prev| prev != id) {
            self.unbind(slot);
        }
        self.guard.bind(slot, id, !state.is_settled());
        self.show_current(slot, id);

        if !state.is_settled() {
            self.request_load(id);
        }
    }

    /// Release `slot`. A load still in its debounce window is cancelled
    /// unless another slot shows the same Item.
    pub fn unbind(&mut self, slot: SlotId) {
        let Some(id) = self.guard.unbind(slot) else {
            return;
        };
        if !self.guard.is_bound(id) {
            self.cancel_pending(id);
        }
    }

    /// Wait for one event from timers or decoders and apply it.
    pub async fn process_next(&mut self) -> bool {
        let received = self.events_rx.recv_async().await;
        match received {
            Ok(event) => {
                self.handle_event(event);
                true
            }
            Err(_) => false,
        }
    }

    /// Apply every event already queued without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Process events until no Item is pending or loading.
    pub async fn run_until_idle(&mut self) {
        while !self.is_idle() {
            if !self.process_next().await {
                break;
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.items.values().all(|item| {
            matches!(
                item.state(),
                ItemState::Idle | ItemState::Ready | ItemState::Failed
            )
        })
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, PreviewCache::len)
    }

    pub fn bound_item(&self, slot: SlotId) -> Option<ItemId> {
        self.guard.bound_item(slot)
    }

    pub fn video_pool(&self) -> &VideoPool {
        &self.pool
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Tear down: drop Items and bindings, release the cache, stop the pool,
    /// and log the diagnostic summary. Safe to call more than once.
    ///
    /// Joins the video workers, so it blocks until running extractions end
    /// (bounded by `video_timeout`). From async code with work in flight,
    /// call it inside `tokio::task::block_in_place` or drop the engine from
    /// `spawn_blocking`. `Drop` runs the same teardown.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.guard.clear();
        self.items.clear();
        self.order.clear();
        if let Some(mut cache) = self.cache.take() {
            cache.clear();
        }
        self.pool.shutdown();
        self.diagnostics.log_summary();
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::DebounceElapsed { item, generation } => {
                self.on_debounce_elapsed(item, generation)
            }
            EngineEvent::Decoded {
                item,
                generation,
                key,
                kind,
                path,
                result,
            } => self.on_decoded(item, generation, key, kind, path, result),
        }
    }

    fn on_debounce_elapsed(&mut self, id: ItemId, generation: u64) {
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        if !item.begin_loading(generation) {
            trace!(%id, generation, "Ignoring stale debounce");
            return;
        }

        let path = item.path().to_path_buf();
        let kind = item.kind();
        let key = CacheKey::for_file(&path);
        self.diagnostics.decode_dispatched(&path);
        let events = self.events_tx.clone();

        match kind {
            MediaKind::StillImage => {
                let decode = decode_async(
                    Arc::clone(&self.decoder),
                    path.clone(),
                    self.config.image_bounds,
                );
                tokio::spawn(async move {
                    let result = decode.await;
                    let _ = events.send(EngineEvent::Decoded {
                        item: id,
                        generation,
                        key,
                        kind,
                        path,
                        result,
                    });
                });
            }
            MediaKind::Video => {
                self.diagnostics.video_started(&path);
                let ticket = self.pool.submit(FrameTask {
                    path: path.clone(),
                    width: self.config.video_width,
                    timeout: self.config.video_timeout,
                });
                tokio::spawn(async move {
                    let result = ticket.await;
                    let _ = events.send(EngineEvent::Decoded {
                        item: id,
                        generation,
                        key,
                        kind,
                        path,
                        result,
                    });
                });
            }
        }
    }

    fn on_decoded(
        &mut self,
        id: ItemId,
        generation: u64,
        key: CacheKey,
        kind: MediaKind,
        path: PathBuf,
        result: Result<PreviewImage>,
    ) {
        if kind.is_video() {
            self.diagnostics.video_completed(&path);
        }

        let preview = match result {
            Ok(preview) => {
                // Cached even when nobody is watching any more: the work is
                // done and the key is content-addressed.
                let max_entries = self.config.max_cache_entries;
                let evicted = self
                    .cache
                    .get_or_insert_with(|| PreviewCache::new(max_entries))
                    .put(key, preview.clone());
                if evicted {
                    self.diagnostics.cache_evicted(&path);
                }
                Some(preview)
            }
            Err(ThumbnailError::Cancelled) => {
                debug!(?path, "Thumbnail request cancelled");
                None
            }
            Err(e) => {
                warn!(?path, error = %e, kind = e.kind(), "Failed to generate thumbnail");
                self.diagnostics.decode_failed(&path);
                None
            }
        };

        let Some(item) = self.items.get_mut(&id) else {
            trace!(%id, ?path, "Result for an item that no longer exists");
            return;
        };
        if item.complete(generation, preview) {
            self.deliver(id);
        }
    }

    /// Route a settled Item to the slots that still want it.
    fn deliver(&mut self, id: ItemId) {
        let delivery = self.guard.on_item_updated(id);
        let Some(item) = self.items.get(&id) else {
            return;
        };
        self.diagnostics.discarded(item.path(), delivery.discarded);

        for slot in delivery.slots {
            match item.preview() {
                Some(preview) => self.sink.on_ready(slot, id, preview),
                None => self.sink.on_failed(slot, id),
            }
        }
    }

    fn show_current(&mut self, slot: SlotId, id: ItemId) {
        let Some(item) = self.items.get(&id) else {
            return;
        };
        match (item.state(), item.preview()) {
            (_, Some(preview)) => self.sink.on_ready(slot, id, preview),
            (ItemState::Failed, None) => self.sink.on_failed(slot, id),
            _ => self.sink.on_placeholder(slot, id),
        }
    }
}

impl<S: DisplaySink> Drop for ThumbnailEngine<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
