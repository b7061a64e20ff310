//! # Body Decoder Module
//!
//! Incremental decoders for inbound request bodies. Every decoder accepts
//! chunks of arbitrary size through [`BodyDecoder::feed`] and produces its
//! result from [`BodyDecoder::finish`] once the transport has reported the end
//! of input; splitting the same body differently never changes the result.
//!
//! ## Overview
//!
//! | Content type                          | Decoder                                 | Produces            |
//! |---------------------------------------|-----------------------------------------|---------------------|
//! | `application/json`                    | [`json::JsonDecoder`]                   | `json`              |
//! | `application/x-www-form-urlencoded`   | [`urlencoded::UrlencodedDecoder`]       | `fields`            |
//! | `multipart/form-data; boundary=…`     | [`multipart::MultipartDecoder`]         | `fields`, `files`   |
//! | anything else, or a disabled decoder  | discard                                 | nothing             |
//!
//! ## Array Convention
//!
//! A field whose decoded name ends in `[]` appends to a list stored under the
//! name without the suffix (`x[]=1&x[]=2` → `x = ["1", "2"]`). Any other
//! repeated name overwrites the earlier value. The convention applies to
//! urlencoded fields and to multipart text and file parts alike.
//!
//! ## Example
//!
//! ```rust
//! use anteroom::decoder::{BodyConfig, BodyDecoder};
//!
//! let mut decoder = BodyDecoder::select(
//!     Some("application/x-www-form-urlencoded"),
//!     &BodyConfig::default(),
//! ).unwrap();
//! decoder.feed(b"x%5B%5D=1&x%5B").unwrap();
//! decoder.feed(b"%5D=2").unwrap();
//! let body = decoder.finish().unwrap();
//! assert_eq!(body.fields["x"].as_list().unwrap(), ["1", "2"]);
//! ```

pub mod json;
pub mod multipart;
pub mod urlencoded;

use crate::context::{FieldValue, Fields, Files};
use crate::scanner::Overflow;
use serde_json::Value;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Decoder selection toggles and the upload directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyConfig {
    pub use_json_parser: bool,
    pub use_urlencoded_parser: bool,
    pub use_multipart_parser: bool,
    /// Directory receiving multipart file parts
    pub upload_dir: PathBuf,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            use_json_parser: true,
            use_urlencoded_parser: true,
            use_multipart_parser: true,
            upload_dir: std::env::temp_dir(),
        }
    }
}

/// Structural failure while decoding a body.
#[derive(Debug)]
pub enum DecodeError {
    /// The body violates the expected format
    Malformed(String),
    /// A delimiter never showed up within the deferral limit
    Overflow(Overflow),
    /// `multipart/form-data` without a usable `boundary` parameter
    MissingBoundary,
    /// Input ended while the multipart decoder was in the named state
    UnexpectedEnd(&'static str),
    Json(serde_json::Error),
    /// Writing an upload to its temporary file failed
    Io(io::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(detail) => write!(f, "malformed body: {detail}"),
            DecodeError::Overflow(overflow) => write!(f, "malformed body: {overflow}"),
            DecodeError::MissingBoundary => write!(f, "multipart body without boundary"),
            DecodeError::UnexpectedEnd(state) => {
                write!(f, "body ended unexpectedly in state {state}")
            }
            DecodeError::Json(e) => write!(f, "invalid JSON body: {e}"),
            DecodeError::Io(e) => write!(f, "upload sink failed: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Overflow(e) => Some(e),
            DecodeError::Json(e) => Some(e),
            DecodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Overflow> for DecodeError {
    fn from(e: Overflow) -> Self {
        DecodeError::Overflow(e)
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        DecodeError::Io(e)
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Json(e)
    }
}

/// What a finished decoder hands back to the context.
#[derive(Debug, Default)]
pub struct DecodedBody {
    pub fields: Fields,
    pub files: Files,
    pub json: Option<Value>,
}

/// Decoder chosen for one body.
#[derive(Debug)]
pub enum BodyDecoder {
    Json(json::JsonDecoder),
    Urlencoded(urlencoded::UrlencodedDecoder),
    Multipart(multipart::MultipartDecoder),
    /// Unsupported or disabled content type: chunks are read and dropped
    Discard,
}

impl BodyDecoder {
    /// Pick the decoder for a `Content-Type` header value.
    ///
    /// Matching is on the media type only (parameters ignored, case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingBoundary`] for multipart without a boundary
    /// when the multipart decoder is enabled.
    pub fn select(content_type: Option<&str>, config: &BodyConfig) -> Result<Self, DecodeError> {
        let Some(content_type) = content_type else {
            return Ok(BodyDecoder::Discard);
        };
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let decoder = match media_type.as_str() {
            "application/json" if config.use_json_parser => {
                BodyDecoder::Json(json::JsonDecoder::new())
            }
            "application/x-www-form-urlencoded" if config.use_urlencoded_parser => {
                BodyDecoder::Urlencoded(urlencoded::UrlencodedDecoder::new())
            }
            "multipart/form-data" if config.use_multipart_parser => {
                let boundary = boundary_param(content_type).ok_or(DecodeError::MissingBoundary)?;
                BodyDecoder::Multipart(multipart::MultipartDecoder::new(
                    boundary,
                    config.upload_dir.clone(),
                ))
            }
            _ => BodyDecoder::Discard,
        };
        Ok(decoder)
    }

    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            BodyDecoder::Json(_) => "json",
            BodyDecoder::Urlencoded(_) => "urlencoded",
            BodyDecoder::Multipart(_) => "multipart",
            BodyDecoder::Discard => "discard",
        }
    }

    /// Apply the next chunk.
    ///
    /// # Errors
    ///
    /// Multipart structural violations and upload sink failures.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        match self {
            BodyDecoder::Json(decoder) => {
                decoder.feed(chunk);
                Ok(())
            }
            BodyDecoder::Urlencoded(decoder) => {
                decoder.feed(chunk);
                Ok(())
            }
            BodyDecoder::Multipart(decoder) => decoder.feed(chunk),
            BodyDecoder::Discard => Ok(()),
        }
    }

    /// Complete decoding after end of input.
    ///
    /// # Errors
    ///
    /// Invalid JSON, or a multipart body that ended before its closing delimiter.
    pub fn finish(self) -> Result<DecodedBody, DecodeError> {
        match self {
            BodyDecoder::Json(decoder) => Ok(DecodedBody {
                json: decoder.finish()?,
                ..DecodedBody::default()
            }),
            BodyDecoder::Urlencoded(decoder) => Ok(DecodedBody {
                fields: decoder.finish(),
                ..DecodedBody::default()
            }),
            BodyDecoder::Multipart(decoder) => {
                let (fields, files) = decoder.finish()?;
                Ok(DecodedBody {
                    fields,
                    files,
                    json: None,
                })
            }
            BodyDecoder::Discard => Ok(DecodedBody::default()),
        }
    }
}

/// `boundary` parameter of a multipart content type, unquoted.
#[must_use]
pub fn boundary_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_owned())
    })
}

/// Strip the `[]` array marker from a field name.
pub(crate) fn array_name(name: &str) -> Option<&str> {
    name.strip_suffix("[]")
}

/// Store a decoded field following the array convention.
pub(crate) fn store_field(fields: &mut Fields, name: String, value: String) {
    let Some(base) = array_name(&name) else {
        fields.insert(name, FieldValue::Text(value));
        return;
    };
    match fields.get_mut(base) {
        Some(FieldValue::List(items)) => items.push(value),
        _ => {
            fields.insert(base.to_owned(), FieldValue::List(vec![value]));
        }
    }
}
