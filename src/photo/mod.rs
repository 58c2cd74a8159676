//! Photo evidence: payload normalization, format detection and storage.

pub mod format;
pub mod ingest;
pub mod storage;

use serde::Serialize;
use thiserror::Error;

pub use format::ImageFormat;
pub use ingest::PhotoIngestor;
pub use storage::{FsPhotoStore, MemoryPhotoStore, PhotoStore, StorageError};

/// A photo as it arrived at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoPayload {
    /// An uploaded file part; `extension` comes from its filename or content type.
    Binary {
        bytes: Vec<u8>,
        extension: Option<String>,
    },
    /// Base64 (optionally as a data URL) or raw text.
    EncodedText(String),
}

impl PhotoPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            PhotoPayload::Binary { bytes, .. } => bytes.is_empty(),
            PhotoPayload::EncodedText(text) => {
                let text = text.trim();
                match ingest::split_data_url(text) {
                    // header only, no image data
                    Some((_, body)) => body.trim().is_empty(),
                    None => text.is_empty(),
                }
            }
        }
    }
}

/// Which attendance event a photo evidences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PhotoEvent {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoArtifact {
    pub storage_key: String,
    pub format: ImageFormat,
    pub size_bytes: u64,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("photo payload is empty")]
    EmptyPayload,

    #[error("photo payload could not be decoded: {0}")]
    DecodeFailure(String),

    #[error("photo could not be stored as {key:?}")]
    WriteFailure {
        key: String,
        #[source]
        source: StorageError,
    },
}
