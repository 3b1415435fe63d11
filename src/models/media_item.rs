use std::path::Path;

/// Which decode path a file takes. Resolved once per Item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    StillImage,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "mkv" | "webm" | "avi" | "mov" => Self::Video,
            _ => Self::StillImage,
        }
    }

    /// Classify a path by its extension; paths without one are still images.
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::StillImage)
    }

    pub fn is_video(self) -> bool {
        self == Self::Video
    }
}

/// Whether a file looks like something the pipeline can preview at all.
pub fn is_media_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp" | "tiff" | "tif"
                    | "mp4" | "mkv" | "webm" | "avi" | "mov"
            )
        })
        .unwrap_or(false)
}
