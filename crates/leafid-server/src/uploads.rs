//! Upload validation and storage

use chrono::{DateTime, Utc};
use leafid_core::CaptureSource;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex"))
}

/// Reduce a client-supplied file name to a safe single path component
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = unsafe_chars().replace_all(base.trim(), "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']);
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(100).collect()
    }
}

/// Lowercase extension of `name`, without the dot
pub fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn extension_allowed(name: &str, allowed: &[String]) -> bool {
    extension(name).is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)))
}

/// Unique on-disk name for an accepted image.
///
/// Named uploads keep their sanitized name behind a timestamp; webcam
/// frames get an extension matching their detected format.
pub fn storage_name(
    original: Option<&str>,
    source: CaptureSource,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let unique = &uuid::Uuid::new_v4().simple().to_string()[..8];

    match original {
        Some(name) => format!("{}_{}_{}", stamp, unique, sanitize_filename(name)),
        None => {
            let ext = image::guess_format(bytes)
                .ok()
                .and_then(|f| f.extensions_str().first().copied())
                .unwrap_or("img");
            let prefix = match source {
                CaptureSource::Webcam => "cam",
                _ => "upload",
            };
            format!("{}_{}_{}.{}", prefix, stamp, unique, ext)
        }
    }
}

/// Write an accepted image into the upload directory
pub async fn save(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(name), bytes).await
}
