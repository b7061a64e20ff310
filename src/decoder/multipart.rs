//! Streaming `multipart/form-data` decoder.
//!
//! The decoder is a byte-level state machine driven by whatever chunk sizes the
//! transport delivers:
//!
//! ```text
//! AwaitBoundary ─▶ AwaitDisposition ─┬─▶ AwaitContentType ─┬─▶ AwaitEmptyLine ─▶ ConsumeData
//!                        ▲           │   (file parts)      │                        │
//!                        │           └─────────────────────┴──────▶ (text parts) ───┤
//!                        └───────────────── CRLF after boundary ◀───────────────────┤
//!                                                  End ◀── "--" after boundary ─────┘
//! ```
//!
//! Text parts accumulate in memory. File parts are streamed to a temporary file
//! that is opened lazily on the first data byte; everything before the last
//! `delimiter.len() - 1` buffered bytes is flushed on every chunk, so a file of
//! any size is decoded with a bounded buffer.
//!
//! Temporary files are owned by a [`FileSink`] guard until the part completes.
//! If decoding fails, or the decoder is dropped before [`MultipartDecoder::finish`]
//! succeeds, every file it created is removed.

use super::{array_name, store_field, DecodeError};
use crate::context::{Fields, Files, UploadedFile};
use crate::scanner::{ByteScanner, CRLF};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const DISPOSITION: &[u8] = b"Content-Disposition: form-data; ";
const NAME: &[u8] = b"name=\"";
const FILENAME: &[u8] = b"; filename=\"";
const CONTENT_TYPE: &[u8] = b"Content-Type: ";
const CLOSE: &[u8] = b"--";

/// MIME type recorded for file parts that omit `Content-Type`.
pub const DEFAULT_FILE_MIME: &str = "application/octet-stream";

static UPLOAD_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartState {
    AwaitBoundary,
    AwaitDisposition,
    AwaitContentType,
    AwaitEmptyLine,
    ConsumeData,
    End,
}

impl MultipartState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MultipartState::AwaitBoundary => "await_boundary",
            MultipartState::AwaitDisposition => "await_disposition",
            MultipartState::AwaitContentType => "await_content_type",
            MultipartState::AwaitEmptyLine => "await_empty_line",
            MultipartState::ConsumeData => "consume_data",
            MultipartState::End => "end",
        }
    }
}

/// Write guard for one upload.
///
/// The file is created with `create_new`. Dropping an uncommitted sink closes
/// and deletes the partial file.
#[derive(Debug)]
pub struct FileSink {
    file: Option<File>,
    path: PathBuf,
    written: u64,
    committed: bool,
}

impl FileSink {
    /// # Errors
    ///
    /// Fails if the file already exists or cannot be created.
    pub fn create(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self {
            file: Some(file),
            path,
            written: 0,
            committed: false,
        })
    }

    /// # Errors
    ///
    /// Propagates write failures.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file sink already closed"))?;
        file.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Close the file and keep it on disk.
    ///
    /// # Errors
    ///
    /// Propagates the final flush failure; the file is removed in that case.
    pub fn commit(mut self) -> io::Result<(PathBuf, u64)> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        self.committed = true;
        Ok((std::mem::take(&mut self.path), self.written))
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        self.file.take();
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to remove partial upload");
            }
        }
    }
}

#[derive(Debug)]
struct FileMeta {
    file_name: String,
    extension: String,
    mime_type: String,
}

#[derive(Debug)]
struct Part {
    name: String,
    file: Option<FileMeta>,
    text: Vec<u8>,
    sink: Option<FileSink>,
}

/// Incremental multipart decoder bound to one boundary token.
#[derive(Debug)]
pub struct MultipartDecoder {
    boundary: String,
    /// `--boundary`
    delimiter: Vec<u8>,
    /// `\r\n--boundary`, the token that ends part data
    terminator: Vec<u8>,
    state: MultipartState,
    scanner: ByteScanner,
    part: Option<Part>,
    fields: Fields,
    files: Files,
    received: u64,
    upload_dir: PathBuf,
    completed: bool,
}

impl MultipartDecoder {
    #[must_use]
    pub fn new(boundary: impl Into<String>, upload_dir: PathBuf) -> Self {
        let boundary = boundary.into();
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(CLOSE);
        delimiter.extend_from_slice(boundary.as_bytes());
        let mut terminator = Vec::with_capacity(delimiter.len() + 2);
        terminator.extend_from_slice(CRLF);
        terminator.extend_from_slice(&delimiter);
        Self {
            boundary,
            delimiter,
            terminator,
            state: MultipartState::AwaitBoundary,
            scanner: ByteScanner::new(),
            part: None,
            fields: Fields::new(),
            files: Files::new(),
            received: 0,
            upload_dir,
            completed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> MultipartState {
        self.state
    }

    /// Apply the next chunk.
    ///
    /// # Errors
    ///
    /// Any structural violation, deferral overflow or sink failure. The decoder
    /// is unusable afterwards and every upload it created has been removed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        if self.state == MultipartState::End {
            return Ok(());
        }
        self.received += chunk.len() as u64;
        self.scanner.push(chunk);
        let result = self.drain();
        if result.is_err() {
            self.abort();
        }
        result
    }

    /// Finish after end of input and hand back the fields and files.
    ///
    /// An empty body and a body holding only the closing delimiter both yield
    /// an empty form.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnexpectedEnd`] when input stopped before the closing delimiter.
    pub fn finish(mut self) -> Result<(Fields, Files), DecodeError> {
        let empty_form = self.state == MultipartState::AwaitBoundary
            && (self.received == 0 || self.is_bare_close());
        if self.state != MultipartState::End && !empty_form {
            let state = self.state.as_str();
            self.abort();
            return Err(DecodeError::UnexpectedEnd(state));
        }
        self.completed = true;
        debug!(
            boundary = %self.boundary,
            fields = self.fields.len(),
            files = self.files.values().map(Vec::len).sum::<usize>(),
            bytes = self.received,
            "Multipart body decoded"
        );
        Ok((
            std::mem::take(&mut self.fields),
            std::mem::take(&mut self.files),
        ))
    }

    fn is_bare_close(&self) -> bool {
        let rest = self.scanner.as_slice();
        rest.strip_prefix(self.delimiter.as_slice())
            .and_then(|r| r.strip_prefix(CLOSE))
            .is_some_and(|r| r.is_empty() || r == CRLF)
    }

    fn drain(&mut self) -> Result<(), DecodeError> {
        loop {
            let advanced = match self.state {
                MultipartState::AwaitBoundary => self.await_boundary()?,
                MultipartState::AwaitDisposition => self.await_disposition()?,
                MultipartState::AwaitContentType => self.await_content_type()?,
                MultipartState::AwaitEmptyLine => self.await_empty_line()?,
                MultipartState::ConsumeData => self.consume_data()?,
                MultipartState::End => {
                    self.scanner.clear();
                    false
                }
            };
            if !advanced {
                return Ok(());
            }
        }
    }

    fn await_boundary(&mut self) -> Result<bool, DecodeError> {
        let held = self.scanner.as_slice();
        let probe = held.len().min(self.delimiter.len());
        if held[..probe] != self.delimiter[..probe] {
            return Err(DecodeError::Malformed(
                "body does not start with the boundary delimiter".into(),
            ));
        }
        let Some(line) = self.scanner.take_line()? else {
            return Ok(false);
        };
        let rest = line.get(self.delimiter.len()..).ok_or_else(|| {
            DecodeError::Malformed("body does not start with the boundary delimiter".into())
        })?;
        if rest.is_empty() {
            self.state = MultipartState::AwaitDisposition;
        } else if rest == CLOSE {
            self.state = MultipartState::End;
        } else {
            return Err(DecodeError::Malformed(
                "unexpected bytes after the opening delimiter".into(),
            ));
        }
        Ok(true)
    }

    fn await_disposition(&mut self) -> Result<bool, DecodeError> {
        let Some(line) = self.scanner.take_line()? else {
            return Ok(false);
        };
        let (name, file_name) = parse_disposition(&line)?;
        let file = file_name.map(|file_name| FileMeta {
            extension: extension_of(&file_name),
            file_name,
            mime_type: DEFAULT_FILE_MIME.to_owned(),
        });
        self.state = if file.is_some() {
            MultipartState::AwaitContentType
        } else {
            MultipartState::AwaitEmptyLine
        };
        self.part = Some(Part {
            name,
            file,
            text: Vec::new(),
            sink: None,
        });
        Ok(true)
    }

    fn await_content_type(&mut self) -> Result<bool, DecodeError> {
        let Some(line) = self.scanner.take_line()? else {
            return Ok(false);
        };
        if line.is_empty() {
            self.state = MultipartState::ConsumeData;
            return Ok(true);
        }
        let mime = strip_prefix_ignore_case(&line, CONTENT_TYPE)
            .ok_or_else(|| DecodeError::Malformed("expected Content-Type for file part".into()))?;
        if let Some(meta) = self.part.as_mut().and_then(|p| p.file.as_mut()) {
            meta.mime_type = String::from_utf8_lossy(mime).trim().to_owned();
        }
        self.state = MultipartState::AwaitEmptyLine;
        Ok(true)
    }

    fn await_empty_line(&mut self) -> Result<bool, DecodeError> {
        let Some(line) = self.scanner.take_line()? else {
            return Ok(false);
        };
        if !line.is_empty() {
            return Err(DecodeError::Malformed(
                "expected blank line after part headers".into(),
            ));
        }
        self.state = MultipartState::ConsumeData;
        Ok(true)
    }

    fn consume_data(&mut self) -> Result<bool, DecodeError> {
        let Some(pos) = self.scanner.find(&self.terminator) else {
            // The tail may hold the start of a delimiter.
            let keep = self.terminator.len() - 1;
            if self.scanner.len() > keep {
                let data = self.scanner.take(self.scanner.len() - keep);
                self.write_part(&data)?;
            }
            return Ok(false);
        };
        let data = self.scanner.take(pos);
        self.write_part(&data)?;
        let after = self.terminator.len();
        if self.scanner.len() < after + 2 {
            return Ok(false);
        }
        let marker = &self.scanner.as_slice()[after..after + 2];
        let next = if marker == CLOSE {
            MultipartState::End
        } else if marker == CRLF {
            MultipartState::AwaitDisposition
        } else {
            return Err(DecodeError::Malformed(
                "unexpected bytes after part delimiter".into(),
            ));
        };
        self.scanner.skip(after + 2);
        self.finalize_part()?;
        self.state = next;
        Ok(true)
    }

    fn write_part(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        if data.is_empty() {
            return Ok(());
        }
        let Self {
            part,
            upload_dir,
            boundary,
            ..
        } = self;
        let part = part
            .as_mut()
            .ok_or_else(|| DecodeError::Malformed("part data without headers".into()))?;
        let Some(meta) = &part.file else {
            part.text.extend_from_slice(data);
            return Ok(());
        };
        if part.sink.is_none() {
            let path = upload_path(upload_dir, boundary, &meta.extension);
            debug!(field = %part.name, path = %path.display(), "Opening upload sink");
            part.sink = Some(FileSink::create(path)?);
        }
        if let Some(sink) = part.sink.as_mut() {
            sink.write(data)?;
        }
        Ok(())
    }

    fn finalize_part(&mut self) -> Result<(), DecodeError> {
        let part = self
            .part
            .take()
            .ok_or_else(|| DecodeError::Malformed("delimiter without part".into()))?;
        let Some(meta) = part.file else {
            let value = String::from_utf8_lossy(&part.text).into_owned();
            store_field(&mut self.fields, part.name, value);
            return Ok(());
        };
        let sink = match part.sink {
            Some(sink) => sink,
            // An unnamed empty file part is an unselected file input.
            None if meta.file_name.is_empty() => return Ok(()),
            None => FileSink::create(upload_path(
                &self.upload_dir,
                &self.boundary,
                &meta.extension,
            ))?,
        };
        let (temp_path, size) = sink.commit()?;
        let key = array_name(&part.name).unwrap_or(&part.name).to_owned();
        debug!(
            field = %part.name,
            file_name = %meta.file_name,
            size,
            "Upload stored"
        );
        self.files.entry(key).or_default().push(UploadedFile {
            field_name: part.name,
            file_name: meta.file_name,
            mime_type: meta.mime_type,
            extension: meta.extension,
            size,
            temp_path,
        });
        Ok(())
    }

    /// Drop the open part (deleting its partial file) and every committed upload.
    fn abort(&mut self) {
        self.part = None;
        for file in self.files.drain().flat_map(|(_, files)| files) {
            if let Err(e) = fs::remove_file(&file.temp_path) {
                warn!(path = %file.temp_path.display(), error = %e, "Failed to remove upload");
            }
        }
        self.scanner.clear();
    }
}

impl Drop for MultipartDecoder {
    fn drop(&mut self) {
        if !self.completed {
            self.abort();
        }
    }
}

fn parse_disposition(line: &[u8]) -> Result<(String, Option<String>), DecodeError> {
    let malformed = || DecodeError::Malformed("invalid Content-Disposition header".into());
    let rest = strip_prefix_ignore_case(line, DISPOSITION).ok_or_else(malformed)?;
    let rest = rest.strip_prefix(NAME).ok_or_else(malformed)?;
    let end = rest.iter().position(|&b| b == b'"').ok_or_else(malformed)?;
    let name = String::from_utf8_lossy(&rest[..end]).into_owned();
    let rest = &rest[end + 1..];
    let file_name = match rest.strip_prefix(FILENAME) {
        Some(value) => {
            let end = value.iter().position(|&b| b == b'"').ok_or_else(malformed)?;
            Some(String::from_utf8_lossy(&value[..end]).into_owned())
        }
        None => None,
    };
    Ok((name, file_name))
}

fn strip_prefix_ignore_case<'a>(line: &'a [u8], prefix: &[u8]) -> Option<&'a [u8]> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Lowercase `.ext` of a client file name, or empty.
fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// `<counter>-<boundary word chars>-<unix millis><ext>` under `dir`.
fn upload_path(dir: &Path, boundary: &str, extension: &str) -> PathBuf {
    let index = UPLOAD_COUNTER.fetch_add(1, Ordering::Relaxed);
    let token: String = boundary
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    dir.join(format!("{index}-{token}-{millis}{extension}"))
}
