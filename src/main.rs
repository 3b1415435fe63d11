use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use thumbd::{is_media_path, DisplaySink, ItemId, PreviewImage, SlotId, ThumbnailConfig, ThumbnailEngine};

/// Keeps whatever each slot ended up showing.
#[derive(Default)]
struct CollectingSink {
    ready: BTreeMap<SlotId, PreviewImage>,
    failed: Vec<SlotId>,
}

impl DisplaySink for CollectingSink {
    fn on_ready(&mut self, slot: SlotId, _item: ItemId, preview: &PreviewImage) {
        self.ready.insert(slot, preview.clone());
    }

    fn on_failed(&mut self, slot: SlotId, item: ItemId) {
        warn!(%slot, %item, "No preview");
        self.failed.push(slot);
    }

    fn on_placeholder(&mut self, _slot: SlotId, _item: ItemId) {}
}

fn collect_media(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_media_path(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    paths
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thumbd=info".parse().context("invalid log directive")?),
        )
        .init();

    let mut args = std::env::args_os().skip(1);
    let Some(dir) = args.next().map(PathBuf::from) else {
        bail!("usage: thumbd <dir> [out-dir]");
    };
    let out_dir = args.next().map(PathBuf::from);

    let paths = collect_media(&dir);
    info!(dir = ?dir, files = paths.len(), "Collected media files");

    let config = ThumbnailConfig::from_env();
    let mut engine = ThumbnailEngine::with_media_decoder(config, CollectingSink::default())
        .context("failed to start thumbnail engine")?;

    let ids = engine.set_paths(paths.iter().cloned());
    for (index, id) in ids.iter().enumerate() {
        engine.bind(SlotId(index as u64), *id);
    }
    engine.run_until_idle().await;

    if let Some(out_dir) = &out_dir {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        for (slot, preview) in &engine.sink().ready {
            let Some(source) = paths.get(slot.0 as usize) else {
                continue;
            };
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = out_dir.join(format!("{:05}-{}.png", slot.0, stem));
            preview
                .pixels()
                .save(&target)
                .with_context(|| format!("failed to write {}", target.display()))?;
        }
    }

    let sink = engine.sink();
    let diag = engine.diagnostics();
    println!("previews:           {}", sink.ready.len());
    println!("failed:             {}", sink.failed.len());
    println!("cache hits:         {}", diag.cache_hits);
    println!("cache misses:       {}", diag.cache_misses);
    println!("decodes dispatched: {}", diag.decodes_dispatched);
    println!("decode failures:    {}", diag.decode_failures);
    println!("video tasks:        {}/{}", diag.video_tasks_completed, diag.video_tasks_started);
    println!("ignored notifies:   {}", diag.discarded_notifications);

    engine.shutdown();
    Ok(())
}
