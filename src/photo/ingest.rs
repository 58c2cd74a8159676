use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDateTime;
use tracing::{debug, error, instrument};

use super::{
    ImageFormat, IngestError, PhotoArtifact, PhotoEvent, PhotoPayload, PhotoStore, StorageError,
};
use crate::clock::Clock;

const DATA_URL_PREFIX: &str = "data:image/";
const DATA_URL_MARKER: &str = ";base64,";

/// Turns a [`PhotoPayload`] into a stored, verified [`PhotoArtifact`].
pub struct PhotoIngestor {
    store: Arc<dyn PhotoStore>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, PartialEq, Eq)]
struct Decoded {
    bytes: Vec<u8>,
    declared: Option<ImageFormat>,
}

impl PhotoIngestor {
    pub fn new(store: Arc<dyn PhotoStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn PhotoStore> {
        &self.store
    }

    /// Single attempt: decode, sniff, write, verify. Nothing is retried.
    #[instrument(name = "photo_ingest", skip(self, payload), fields(event = %event))]
    pub async fn ingest(
        &self,
        payload: PhotoPayload,
        user_id: u64,
        event: PhotoEvent,
    ) -> Result<PhotoArtifact, IngestError> {
        let decoded = decode_payload(payload)?;

        let format = ImageFormat::sniff(&decoded.bytes)
            .or(decoded.declared)
            .unwrap_or(ImageFormat::Jpg);
        let key = storage_key(self.clock.now(), user_id, event, format);
        let expected = decoded.bytes.len() as u64;

        debug!(key = %key, %format, size = expected, "Storing photo");

        let write_failure = |source: StorageError| {
            error!(key = %key, error = %source, "Photo write failed");
            IngestError::WriteFailure {
                key: key.clone(),
                source,
            }
        };

        self.store
            .put(&key, &decoded.bytes)
            .await
            .map_err(write_failure)?;

        if !self.store.exists(&key).await.map_err(write_failure)? {
            return Err(write_failure(StorageError::NotFound(key.clone())));
        }
        let actual = self.store.size(&key).await.map_err(write_failure)?;
        if actual == 0 || actual != expected {
            return Err(write_failure(StorageError::SizeMismatch {
                key: key.clone(),
                expected,
                actual,
            }));
        }

        Ok(PhotoArtifact {
            storage_key: key,
            format,
            size_bytes: actual,
        })
    }
}

/// `<YYYYMMDD_HHMMSS_mmm>_<user>_<event>.<ext>`; same-millisecond collisions overwrite.
pub fn storage_key(
    at: NaiveDateTime,
    user_id: u64,
    event: PhotoEvent,
    format: ImageFormat,
) -> String {
    format!(
        "{}_{}_{}.{}",
        at.format("%Y%m%d_%H%M%S_%3f"),
        user_id,
        event,
        format.extension()
    )
}

fn decode_payload(payload: PhotoPayload) -> Result<Decoded, IngestError> {
    match payload {
        PhotoPayload::Binary { bytes, extension } => {
            if bytes.is_empty() {
                return Err(IngestError::EmptyPayload);
            }
            Ok(Decoded {
                bytes,
                declared: extension.as_deref().and_then(ImageFormat::from_extension),
            })
        }
        PhotoPayload::EncodedText(text) => decode_text(&text),
    }
}

fn decode_text(text: &str) -> Result<Decoded, IngestError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(IngestError::EmptyPayload);
    }

    if let Some((declared, body)) = split_data_url(text) {
        let bytes = STANDARD
            .decode(body.trim())
            .map_err(|e| IngestError::DecodeFailure(e.to_string()))?;
        if bytes.is_empty() {
            return Err(IngestError::EmptyPayload);
        }
        return Ok(Decoded { bytes, declared });
    }

    // Only accept bare base64 when it re-encodes to exactly the input.
    if let Ok(bytes) = STANDARD.decode(text) {
        if !bytes.is_empty() && STANDARD.encode(&bytes) == text {
            return Ok(Decoded {
                bytes,
                declared: None,
            });
        }
    }

    Ok(Decoded {
        bytes: text.as_bytes().to_vec(),
        declared: None,
    })
}

/// Splits `data:image/<fmt>;base64,<body>` into the declared format and body.
pub(crate) fn split_data_url(text: &str) -> Option<(Option<ImageFormat>, &str)> {
    let head = text.get(..DATA_URL_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(DATA_URL_PREFIX) {
        return None;
    }
    let rest = &text[DATA_URL_PREFIX.len()..];
    let marker = rest.find(DATA_URL_MARKER)?;
    let subtype = &rest[..marker];
    let body = &rest[marker + DATA_URL_MARKER.len()..];
    Some((ImageFormat::from_extension(subtype), body))
}
