//! MIME type handling

use http::HeaderValue;
use serde::Serialize;
use std::fs::Metadata;
use std::path::Path;

/// Fallback for anything unrecognised
const OCTET_STREAM: &str = "application/octet-stream";

/// Coarse entry kind reported in listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

impl EntryType {
    /// Classify from filesystem metadata, never from the name
    pub fn from_metadata(metadata: &Metadata) -> Self {
        if metadata.is_dir() {
            EntryType::Directory
        } else {
            EntryType::File
        }
    }
}

/// Lowercase extension without the dot, empty when there is none
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Content type for a file name.
///
/// Presentation and media formats are pinned explicitly so browsers never
/// see `application/octet-stream` for them.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = extension_of(name);
    match ext.as_str() {
        // Office
        "ppsx" => "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "potx" => "application/vnd.openxmlformats-officedocument.presentationml.template",
        "ppt" | "pps" => "application/vnd.ms-powerpoint",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "key" => "application/vnd.apple.keynote",
        "pdf" => "application/pdf",
        "rtf" => "application/rtf",

        // Video
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "mpg" | "mpeg" => "video/mpeg",

        // Audio
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "wma" => "audio/x-ms-wma",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",

        // Archives and text
        "zip" => "application/zip",
        "7z" => "application/x-7z-compressed",
        "rar" => "application/vnd.rar",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "md" => "text/markdown",
        "xml" => "application/xml",

        _ => mime_guess::from_path(name).first_raw().unwrap_or(OCTET_STREAM),
    }
}

/// `Content-Disposition` value forcing a download under the base name.
///
/// Quotes and backslashes are escaped and control characters dropped, so the
/// name cannot break out of the header. Non-ASCII names also get an
/// RFC 5987 `filename*` parameter.
pub fn content_disposition(path: &Path) -> HeaderValue {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '"' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }

    let value = if escaped.is_ascii() {
        format!("attachment; filename=\"{}\"", escaped)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            escaped,
            urlencoding::encode(&name)
        )
    };

    HeaderValue::from_bytes(value.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_types() {
        assert_eq!(
            content_type_for("a.ppsx"),
            "application/vnd.openxmlformats-officedocument.presentationml.slideshow"
        );
        assert_eq!(content_type_for("Deck.PPTX"), content_type_for("deck.pptx"));
        assert_eq!(content_type_for("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for("song.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("photo.JPG"), "image/jpeg");
        assert_eq!(content_type_for("report.pdf"), "application/pdf");
        assert_eq!(content_type_for("style.css"), "text/css");
    }

    #[test]
    fn test_unknown_falls_back_to_octet_stream() {
        assert_eq!(content_type_for("blob.qqqzzz"), "application/octet-stream");
        assert_eq!(content_type_for("Makefile"), "application/octet-stream");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.PPSX"), "ppsx");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".bashrc"), "");
    }

    #[test]
    fn test_content_disposition_basename_only() {
        let value = content_disposition(Path::new("/srv/drive/docs/a.ppsx"));
        assert_eq!(value, "attachment; filename=\"a.ppsx\"");
    }

    #[test]
    fn test_content_disposition_escapes() {
        let value = content_disposition(Path::new("say \"hi\"\r\n.txt"));
        assert_eq!(value, "attachment; filename=\"say \\\"hi\\\".txt\"");
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition(Path::new("Präsentation.pptx"));
        let text = String::from_utf8(value.as_bytes().to_vec()).unwrap();
        assert!(text.starts_with("attachment; filename=\"Präsentation.pptx\""));
        assert!(text.ends_with("filename*=UTF-8''Pr%C3%A4sentation.pptx"));
    }
}
