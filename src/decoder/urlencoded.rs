//! `application/x-www-form-urlencoded` decoder.
//!
//! Two states: collecting a name until `=` (or a bare `&`), then collecting a
//! value until `&`. Raw bytes are kept until the pair is complete so that a
//! percent-escape split across chunks decodes correctly.

use super::store_field;
use crate::context::Fields;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ParsingName,
    ParsingValue,
}

#[derive(Debug)]
pub struct UrlencodedDecoder {
    state: State,
    name: Vec<u8>,
    value: Vec<u8>,
    fields: Fields,
}

impl Default for UrlencodedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlencodedDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::ParsingName,
            name: Vec::new(),
            value: Vec::new(),
            fields: Fields::new(),
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while !rest.is_empty() {
            match self.state {
                State::ParsingName => {
                    match rest.iter().position(|&b| b == b'=' || b == b'&') {
                        Some(pos) => {
                            self.name.extend_from_slice(&rest[..pos]);
                            if rest[pos] == b'=' {
                                self.state = State::ParsingValue;
                            } else {
                                self.commit();
                            }
                            rest = &rest[pos + 1..];
                        }
                        None => {
                            self.name.extend_from_slice(rest);
                            rest = &[];
                        }
                    }
                }
                State::ParsingValue => match rest.iter().position(|&b| b == b'&') {
                    Some(pos) => {
                        self.value.extend_from_slice(&rest[..pos]);
                        self.commit();
                        rest = &rest[pos + 1..];
                    }
                    None => {
                        self.value.extend_from_slice(rest);
                        rest = &[];
                    }
                },
            }
        }
    }

    /// Materialize the trailing pair and return every field.
    #[must_use]
    pub fn finish(mut self) -> Fields {
        self.commit();
        self.fields
    }

    fn commit(&mut self) {
        let name = decode_component(&self.name);
        let value = decode_component(&self.value);
        self.name.clear();
        self.value.clear();
        self.state = State::ParsingName;
        if !name.is_empty() {
            store_field(&mut self.fields, name, value);
        }
    }
}

/// Decode `+` as space and percent-escapes as bytes; invalid UTF-8 is replaced.
#[must_use]
pub fn decode_component(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    String::from_utf8_lossy(&urlencoding::decode_binary(&spaced)).into_owned()
}
