//! Assets and folders as presented by listings.

use serde::Serialize;

/// A stored file.
#[derive(Serialize, Clone, Debug)]
pub struct AssetFile {
    pub name: String,

    /// Public URL, e.g. `/assets/photos/logo.png`.
    pub path: String,

    pub size: u64,

    /// Unix seconds.
    pub modified: i64,

    /// MIME type guessed from the extension.
    #[serde(rename = "type")]
    pub mime_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// A sub-folder of the listed directory.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Folder {
    pub name: String,

    /// Path relative to the asset root, usable as the next `path` query.
    pub path: String,
}

/// Contents of one directory.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AssetListing {
    pub current_path: String,
    pub folders: Vec<Folder>,
    pub files: Vec<AssetFile>,
}

/// Outcome of one file in a direct (non-chunked) upload.
#[derive(Serialize, Clone, Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub path: String,
    pub thumbnail: Option<String>,

    /// Name the client sent.
    pub original: String,
}
