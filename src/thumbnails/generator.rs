//! Preview generation: still-image decode and video frame extraction.
//!
//! Everything here is pure computation on the calling thread. The engine
//! decides where it runs (blocking pool for images, the bounded video pool
//! for frames) and hands the result back to its event loop.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, GenericImageView, ImageFormat};
use tracing::{debug, trace};

use crate::error::{Result, ThumbnailError};
use crate::models::{Bounds, PreviewImage};

/// How often a running ffmpeg child is polled for exit.
const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Program used for frame extraction unless configured otherwise.
const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Seek targets tried in order; many videos open on a black frame.
const FRAME_TIMESTAMPS: [&str; 2] = ["00:00:01.000", "00:00:00.000"];

/// The seam between the scheduling engine and actual decoding.
///
/// Implementations must be callable from any thread and must not touch
/// engine state.
pub trait PreviewDecoder: Send + Sync + 'static {
    /// Decode a still image and fit it inside `bounds`.
    fn decode_image(&self, path: &Path, bounds: Bounds) -> Result<PreviewImage>;

    /// Extract an early frame of a video, scaled to `width`, giving up after
    /// `timeout`.
    fn extract_frame(&self, path: &Path, width: u32, timeout: Duration) -> Result<PreviewImage>;
}

/// Decoder backed by the `image` crate and the `ffmpeg` executable.
#[derive(Debug, Clone)]
pub struct MediaDecoder {
    /// ffmpeg executable, looked up on `PATH` when not absolute.
    ffmpeg: PathBuf,
}

impl Default for MediaDecoder {
    fn default() -> Self {
        Self::with_ffmpeg(DEFAULT_FFMPEG)
    }
}

impl MediaDecoder {
    pub fn with_ffmpeg(program: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: program.into(),
        }
    }
}

impl PreviewDecoder for MediaDecoder {
    fn decode_image(&self, path: &Path, bounds: Bounds) -> Result<PreviewImage> {
        let img = open_image(path)?;
        let (src_width, src_height) = img.dimensions();
        let (width, height) = fit_within(src_width, src_height, bounds);
        trace!(?path, src_width, src_height, width, height, "Scaling still image");

        let scaled = if (width, height) == (src_width, src_height) {
            img
        } else {
            img.resize_exact(width, height, FilterType::CatmullRom)
        };
        Ok(PreviewImage::new(scaled.to_rgba8()))
    }

    fn extract_frame(&self, path: &Path, width: u32, timeout: Duration) -> Result<PreviewImage> {
        // Surface missing/unreadable files before blaming the decoder.
        std::fs::metadata(path).map_err(|e| ThumbnailError::from_io(path, e))?;

        let deadline = Instant::now() + timeout;
        let mut last_error = None;
        for timestamp in FRAME_TIMESTAMPS {
            match ffmpeg_extract_frame(&self.ffmpeg, path, timestamp, width, deadline) {
                Ok(frame) => {
                    let (src_width, src_height) = frame.dimensions();
                    let (w, h) = scale_to_width(src_width, src_height, width);
                    let frame = if (w, h) == (src_width, src_height) {
                        frame
                    } else {
                        frame.resize_exact(w, h, FilterType::CatmullRom)
                    };
                    debug!(?path, timestamp, width = w, height = h, "Extracted video frame");
                    return Ok(PreviewImage::new(frame.to_rgba8()));
                }
                Err(e) => {
                    trace!(?path, timestamp, error = %e, "Frame extraction attempt failed");
                    let timed_out = Instant::now() >= deadline;
                    last_error = Some(e);
                    if timed_out {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ThumbnailError::decode_failed(path, "no frame decoded")))
    }
}

/// Decode an image from disk, taking the first frame of animated GIFs.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).map_err(|e| ThumbnailError::from_io(path, e))?;
    let format = image::guess_format(&bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes))
            .map_err(|e| ThumbnailError::from_image(path, e))?;
        let mut frames = decoder.into_frames();
        return match frames.next() {
            Some(frame) => {
                let frame = frame.map_err(|e| ThumbnailError::from_image(path, e))?;
                Ok(DynamicImage::ImageRgba8(frame.into_buffer()))
            }
            None => Err(ThumbnailError::decode_failed(path, "GIF has no frames")),
        };
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(&bytes, fmt),
        None => image::load_from_memory(&bytes),
    }
    .map_err(|e| ThumbnailError::from_image(path, e))
}

/// Fit a source size inside `bounds`, preserving aspect ratio and never
/// upscaling.
pub fn fit_within(src_width: u32, src_height: u32, bounds: Bounds) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (bounds.width.max(1), bounds.height.max(1));
    }
    if src_width <= bounds.width && src_height <= bounds.height {
        return (src_width, src_height);
    }

    let scale = f64::min(
        bounds.width as f64 / src_width as f64,
        bounds.height as f64 / src_height as f64,
    );
    let width = (src_width as f64 * scale).round() as u32;
    let height = (src_height as f64 * scale).round() as u32;
    (width.max(1), height.max(1))
}

/// Scale to a fixed width preserving aspect ratio, rounding the height to an
/// even number like ffmpeg's `scale=W:-2`.
pub fn scale_to_width(src_width: u32, src_height: u32, target_width: u32) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (target_width.max(1), target_width.max(1));
    }
    let height = (target_width as f64 * src_height as f64 / src_width as f64).round() as u32;
    let even = (height + 1) & !1;
    (target_width.max(1), even.max(2))
}

fn ffmpeg_extract_frame(
    program: &Path,
    path: &Path,
    timestamp: &str,
    width: u32,
    deadline: Instant,
) -> Result<DynamicImage> {
    let mut child = Command::new(program)
        .arg("-v")
        .arg("error")
        .arg("-ss")
        .arg(timestamp)
        .arg("-i")
        .arg(path)
        .arg("-frames:v")
        .arg("1")
        .arg("-vf")
        .arg(format!("scale={width}:-2"))
        .arg("-f")
        .arg("image2pipe")
        .arg("-vcodec")
        .arg("png")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ThumbnailError::decode_failed(path, format!("failed to start ffmpeg: {e}")))?;

    // Drain stdout concurrently so a full pipe cannot stall the child.
    let reader = child.stdout.take().map(|mut stdout| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        })
    });

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ThumbnailError::decode_failed(
                    path,
                    "timed out waiting for a video frame",
                ));
            }
            Ok(None) => thread::sleep(FRAME_POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ThumbnailError::decode_failed(path, e));
            }
        }
    };

    let stdout = match reader.map(|handle| handle.join()) {
        Some(Ok(Ok(buf))) => buf,
        _ => Vec::new(),
    };

    if !status.success() || stdout.is_empty() {
        return Err(ThumbnailError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    image::load_from_memory_with_format(&stdout, ImageFormat::Png)
        .map_err(|e| ThumbnailError::decode_failed(path, e))
}
