use std::path::{Path, PathBuf};

use crate::errors::PlaylabError;

const FALLBACK_MIME: &str = "application/octet-stream";

/// A file read into memory for a multipart message upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    /// Base name sent as the part file name and as `originalFileName`.
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    /// Reads a file and infers its MIME type from the extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlaylabError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(PlaylabError::Validation(format!(
                "File not found: {}",
                path.display()
            )));
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PlaylabError::Validation(format!("File has no name: {}", path.display()))
            })?;
        let bytes = std::fs::read(path).map_err(|e| {
            PlaylabError::api(format!("failed to read attachment {}: {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            mime_type: guess_mime_type(path).to_string(),
            file_name,
            bytes,
        })
    }
}

/// Guesses a MIME type from the file extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return FALLBACK_MIME;
    };
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "xml" => "application/xml",
        "json" => "application/json",
        "js" | "mjs" => "text/javascript",
        "py" => "text/x-python",
        "rtf" => "application/rtf",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "epub" => "application/epub+zip",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "mp4" => "video/mp4",
        _ => FALLBACK_MIME,
    }
}
