//! Parsing and validation of check-in/check-out bodies.
//!
//! Accepts `application/json` (`{location, photo}` with `photo` as a string)
//! and `multipart/form-data` (`location` text part, `photo` file or text part).
//! The photo is resolved into a [`PhotoPayload`] here and nowhere else.

use actix_multipart::{Field, Multipart};
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{HttpRequest, web};
use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::error::{AttendanceError, ValidationErrors};
use crate::photo::PhotoPayload;

pub const LOCATION_MAX_CHARS: usize = 255;

/// A validated check-in/check-out request.
#[derive(Debug)]
pub struct Submission {
    pub location: String,
    pub photo: PhotoPayload,
}

#[derive(Debug, Default)]
struct RawSubmission {
    location: Option<String>,
    photo: Option<PhotoPayload>,
    errors: ValidationErrors,
}

pub async fn read_submission(
    req: &HttpRequest,
    payload: web::Payload,
    limit: usize,
) -> Result<Submission, AttendanceError> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"));

    let raw = if is_multipart {
        read_multipart(Multipart::new(req.headers(), payload), limit).await
    } else {
        read_json(payload, limit).await
    };
    raw.validate()
}

fn body_error(message: &str) -> AttendanceError {
    let mut errors = ValidationErrors::new();
    errors.add("body", message);
    AttendanceError::Validation(errors)
}

fn too_large(limit: usize) -> AttendanceError {
    let mut errors = ValidationErrors::new();
    errors.add(
        "photo",
        format!(
            "The photo must not be greater than {} kilobytes.",
            limit / 1024
        ),
    );
    AttendanceError::Validation(errors)
}

async fn read_json(mut payload: web::Payload, limit: usize) -> RawSubmission {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "Failed reading request body");
                return RawSubmission::failed(body_error("The request body could not be read."));
            }
        };
        if body.len() + chunk.len() > limit {
            return RawSubmission::failed(too_large(limit));
        }
        body.extend_from_slice(&chunk);
    }

    let mut raw = RawSubmission::default();
    if body.is_empty() {
        // nothing sent: report the missing fields
        return raw;
    }

    let object = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            raw.errors.add("body", "The request body must be a JSON object.");
            return raw;
        }
    };

    match object.get("location") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => raw.location = Some(s.clone()),
        Some(_) => raw.errors.add("location", "The location field must be a string."),
    }

    match object.get("photo") {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => raw.photo = Some(PhotoPayload::EncodedText(s.clone())),
        Some(_) => raw
            .errors
            .add("photo", "The photo field must be a file or a string."),
    }

    raw
}

async fn read_multipart(mut multipart: Multipart, limit: usize) -> RawSubmission {
    let mut raw = RawSubmission::default();
    let mut total = 0usize;

    while let Some(item) = multipart.next().await {
        let field = match item {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "Malformed multipart body");
                return RawSubmission::failed(body_error("The multipart body is malformed."));
            }
        };

        let name = field.name().map(str::to_owned);
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned);
        let image_subtype = field
            .content_type()
            .filter(|ct| ct.type_().as_str() == "image")
            .map(|ct| ct.subtype().as_str().to_owned());

        let bytes = match read_field(field, limit, &mut total).await {
            Ok(b) => b,
            Err(e) => return RawSubmission::failed(e),
        };

        match name.as_deref() {
            Some("location") => match String::from_utf8(bytes) {
                Ok(text) => raw.location = Some(text),
                Err(_) => raw.errors.add("location", "The location field must be a string."),
            },
            Some("photo") => {
                let is_file = filename.is_some() || image_subtype.is_some();
                raw.photo = Some(if is_file {
                    let extension = filename
                        .as_deref()
                        .and_then(|f| f.rsplit_once('.'))
                        .map(|(_, ext)| ext.to_owned())
                        .or(image_subtype);
                    PhotoPayload::Binary { bytes, extension }
                } else {
                    match String::from_utf8(bytes) {
                        Ok(text) => PhotoPayload::EncodedText(text),
                        Err(e) => PhotoPayload::Binary {
                            bytes: e.into_bytes(),
                            extension: None,
                        },
                    }
                });
            }
            _ => {}
        }
    }

    raw
}

async fn read_field(
    mut field: Field,
    limit: usize,
    total: &mut usize,
) -> Result<Vec<u8>, AttendanceError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| {
            debug!(error = %e, "Failed reading multipart field");
            body_error("The multipart body is malformed.")
        })?;
        *total += chunk.len();
        if *total > limit {
            return Err(too_large(limit));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

impl RawSubmission {
    fn failed(err: AttendanceError) -> Self {
        let errors = match err {
            AttendanceError::Validation(errors) => errors,
            other => {
                let mut errors = ValidationErrors::new();
                errors.add("body", other.to_string());
                errors
            }
        };
        Self {
            errors,
            ..Self::default()
        }
    }

    fn validate(self) -> Result<Submission, AttendanceError> {
        let RawSubmission {
            location,
            photo,
            mut errors,
        } = self;

        let location = location.map(|l| l.trim().to_owned()).unwrap_or_default();
        if errors.field("location").is_none() {
            if location.is_empty() {
                errors.add("location", "The location field is required.");
            } else if location.chars().count() > LOCATION_MAX_CHARS {
                errors.add(
                    "location",
                    format!(
                        "The location field must not be greater than {LOCATION_MAX_CHARS} characters."
                    ),
                );
            }
        }

        let photo = photo.filter(|p| !p.is_empty());
        if photo.is_none() && errors.field("photo").is_none() {
            errors.add("photo", "The photo field is required.");
        }

        errors.into_result()?;
        match photo {
            Some(photo) => Ok(Submission { location, photo }),
            None => {
                let mut errors = ValidationErrors::new();
                errors.add("photo", "The photo field is required.");
                Err(AttendanceError::Validation(errors))
            }
        }
    }
}
