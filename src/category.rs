//! Broad content categories used to suggest a destination folder.
//!
//! When something new lands in the watch zone the prompt offers a hint such as
//! `documents/` or `images/`. The hint comes from the sniffed MIME type when
//! `infer` recognises the content and from the file extension otherwise.
//!
//! # Examples
//!
//! ```
//! use watchzone::category::Category;
//!
//! assert_eq!(Category::from_mime("image/png"), Some(Category::Image));
//! assert_eq!(Category::from_extension("PDF"), Some(Category::Document));
//! assert_eq!(Category::Archive.dir_name(), "archives");
//! ```
use std::path::Path;

/// Represents a broad file category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Image files (PNG, JPG, GIF, etc.)
    Image,
    /// Audio files (MP3, WAV, FLAC, etc.)
    Audio,
    /// Video files (MP4, MKV, AVI, etc.)
    Video,
    /// Document files (PDF, DOCX, TXT, etc.)
    Document,
    /// Archive files (ZIP, RAR, 7Z, etc.)
    Archive,
    /// Source files and structured text.
    Code,
    /// Spreadsheet files (XLSX, CSV, ODS, etc.)
    Spreadsheet,
}

impl Category {
    /// Returns the folder name suggested for this category.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Image => "images",
            Category::Audio => "audio",
            Category::Video => "videos",
            Category::Document => "documents",
            Category::Archive => "archives",
            Category::Code => "code",
            Category::Spreadsheet => "spreadsheets",
        }
    }

    /// Maps a MIME type reported by `infer` to a category.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let category = match mime {
            m if m.starts_with("image/") => Category::Image,
            m if m.starts_with("audio/") => Category::Audio,
            m if m.starts_with("video/") => Category::Video,
            "application/pdf"
            | "application/msword"
            | "application/rtf"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.oasis.opendocument.text"
            | "application/epub+zip" => Category::Document,
            "application/zip"
            | "application/gzip"
            | "application/x-tar"
            | "application/x-bzip2"
            | "application/x-xz"
            | "application/x-7z-compressed"
            | "application/vnd.rar" => Category::Archive,
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.oasis.opendocument.spreadsheet" => Category::Spreadsheet,
            "application/wasm" | "application/x-executable" => Category::Code,
            _ => return None,
        };
        Some(category)
    }

    /// Maps a file extension (case-insensitive, without the dot) to a category.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let category = match ext.to_lowercase().as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" | "tiff" | "heic" => {
                Category::Image
            }
            "mp3" | "wav" | "ogg" | "flac" | "aac" | "m4a" => Category::Audio,
            "mp4" | "mkv" | "avi" | "mov" | "webm" => Category::Video,
            "pdf" | "txt" | "doc" | "docx" | "md" | "rtf" | "odt" | "html" => Category::Document,
            "zip" | "tar" | "gz" | "tgz" | "bz2" | "xz" | "7z" | "rar" => Category::Archive,
            "rs" | "py" | "js" | "ts" | "go" | "c" | "h" | "cpp" | "java" | "sh" | "json"
            | "toml" | "yaml" | "yml" | "xml" => Category::Code,
            "csv" | "xls" | "xlsx" | "ods" => Category::Spreadsheet,
            _ => return None,
        };
        Some(category)
    }

    /// Picks a category for a path, preferring the sniffed MIME type.
    pub fn detect(path: &Path, mime: Option<&str>) -> Option<Self> {
        mime.and_then(Self::from_mime).or_else(|| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .and_then(Self::from_extension)
        })
    }
}
