//! `application/json` body assembly.

use super::DecodeError;
use bytes::BytesMut;
use serde_json::Value;

/// Buffers the whole body and parses it once input has ended.
#[derive(Debug, Default)]
pub struct JsonDecoder {
    buf: BytesMut,
}

impl JsonDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Parse the assembled body; a blank body yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] when the body is not valid JSON.
    pub fn finish(self) -> Result<Option<Value>, DecodeError> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&self.buf)?))
    }
}
