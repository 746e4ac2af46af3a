//! Mime type helpers for stored and inlined resources.

/// Extension used when the mime type is not in the table.
pub const DEFAULT_IMAGE_EXTENSION: &str = ".jpg";

/// File extension (with leading dot) for an image mime type.
///
/// Parameters (`; charset=...`) and case are ignored.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match essence(mime).as_str() {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" | "image/svg" => ".svg",
        "image/bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/x-icon" | "image/vnd.microsoft.icon" => ".ico",
        _ => DEFAULT_IMAGE_EXTENSION,
    }
}

/// Extension for a stored file: the mime table for images, otherwise the
/// server-supplied `file_extension` when it is a plain alphanumeric word.
pub fn extension_for(mime: &str, file_extension: &str) -> String {
    if is_image(mime) {
        return extension_for_mime(mime).to_string();
    }
    let ext = file_extension.trim_start_matches('.');
    if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        format!(".{}", ext.to_ascii_lowercase())
    } else {
        String::new()
    }
}

pub fn is_image(mime: &str) -> bool {
    essence(mime).starts_with("image/")
}

/// Whether `bytes` plausibly holds an image of type `mime`.
///
/// Only formats with a fixed signature are checked; anything else passes.
pub fn matches_signature(mime: &str, bytes: &[u8]) -> bool {
    match essence(mime).as_str() {
        "image/png" => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
        "image/jpeg" | "image/jpg" => bytes.starts_with(&[0xff, 0xd8, 0xff]),
        "image/gif" => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
        "image/webp" => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        "image/bmp" => bytes.starts_with(b"BM"),
        _ => true,
    }
}

fn essence(mime: &str) -> String {
    mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase()
}
