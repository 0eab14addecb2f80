//! Small filesystem and formatting helpers.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::constants::MAX_FILENAME_LENGTH;
use crate::error::MemeError;

#[allow(clippy::unwrap_used)]
static INVALID_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

#[allow(clippy::unwrap_used)]
static REPEATED_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Replaces characters that aren't safe in filenames, never returns an empty string.
pub fn sanitize_filename(filename: &str) -> String {
    let replaced = INVALID_FILENAME_CHARS.replace_all(filename, "_");
    let collapsed = REPEATED_UNDERSCORES.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches(|c| c == '.' || c == ' ');

    if trimmed.is_empty() {
        return "untitled".to_string();
    }
    trimmed.chars().take(MAX_FILENAME_LENGTH).collect()
}

/// Formats a byte count as "1.5 MB" etc.
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Basic facts about an image on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    /// Pixels
    pub width: u32,
    /// Pixels
    pub height: u32,
    /// Detected format, if the guess worked
    pub format: Option<image::ImageFormat>,
    /// File size in bytes
    pub size_bytes: u64,
}

impl ImageInfo {
    /// Human readable file size
    pub fn size_formatted(&self) -> String {
        format_file_size(self.size_bytes)
    }
}

/// Reads dimensions and format of the image at `path`.
pub fn image_info(path: &Path) -> Result<ImageInfo, MemeError> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions()?;
    let size_bytes = std::fs::metadata(path)?.len();
    Ok(ImageInfo {
        width,
        height,
        format,
        size_bytes,
    })
}

/// Logs a block of name/value statistics.
pub fn log_generation_stats(stats: &[(&str, String)]) {
    info!("=== MEME GENERATION STATISTICS ===");
    for (key, value) in stats {
        info!("{}: {}", key, value);
    }
    info!("{}", "=".repeat(35));
}
