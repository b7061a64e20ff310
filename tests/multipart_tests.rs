//! Integration tests for the streaming multipart decoder
//!
//! # Test Coverage
//!
//! - Identical results regardless of how the body is fragmented
//! - Field/file scenario with exact byte contents on disk
//! - `name[]` arrays for text and file parts
//! - 64 KiB deferral threshold on unresolved header data
//! - Cleanup of every upload when decoding fails part-way

use anteroom::context::{FieldValue, Fields, Files};
use anteroom::decoder::multipart::MultipartDecoder;
use anteroom::decoder::{BodyConfig, BodyDecoder, DecodeError};
use std::fs;
use std::path::Path;

mod common;
use common::multipart::FormBuilder;

fn decode_in_chunks(body: &[u8], boundary: &str, dir: &Path, chunk: usize) -> (Fields, Files) {
    let mut decoder = MultipartDecoder::new(boundary, dir.to_path_buf());
    for piece in body.chunks(chunk.max(1)) {
        decoder.feed(piece).unwrap();
    }
    decoder.finish().unwrap()
}

fn file_contents(files: &Files, name: &str) -> Vec<Vec<u8>> {
    files[name]
        .iter()
        .map(|f| fs::read(&f.temp_path).unwrap())
        .collect()
}

fn uploads_in(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

fn sample_form() -> FormBuilder {
    let binary: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
    FormBuilder::new("----anteroomXyZ")
        .text("title", "Quarterly report")
        .text("notes", "line one\r\nline two\r\n--not-a-boundary")
        .file("doc", "Report.PDF", "application/pdf", &binary)
        .file("empty", "blank.txt", "text/plain", b"")
        .text("tags[]", "a")
        .text("tags[]", "b")
}

#[test]
fn test_scenario_field_and_file() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("X")
        .text("a", "1")
        .file("f", "t.txt", "text/plain", b"abc")
        .build();

    let (fields, files) = decode_in_chunks(&body, "X", dir.path(), body.len());

    assert_eq!(fields.len(), 1);
    assert_eq!(fields["a"], FieldValue::Text("1".into()));
    let f = &files["f"];
    assert_eq!(f.len(), 1);
    assert_eq!(f[0].file_name, "t.txt");
    assert_eq!(f[0].size, 3);
    assert_eq!(f[0].mime_type, "text/plain");
    assert_eq!(f[0].extension, ".txt");
    assert_eq!(fs::read(&f[0].temp_path).unwrap(), b"abc");
    assert!(f[0].temp_path.starts_with(dir.path()));
}

#[test]
fn test_fragmentation_does_not_change_result() {
    let dir = tempfile::tempdir().unwrap();
    let form = sample_form();
    let boundary = "----anteroomXyZ";
    let body = form.build();

    let (whole_fields, whole_files) = decode_in_chunks(&body, boundary, dir.path(), body.len());
    let expected_doc = file_contents(&whole_files, "doc");

    for chunk in [1, 2, 3, 7, 64, 1000, 8192] {
        let (fields, files) = decode_in_chunks(&body, boundary, dir.path(), chunk);
        assert_eq!(fields, whole_fields, "chunk size {chunk}");
        assert_eq!(file_contents(&files, "doc"), expected_doc, "chunk size {chunk}");
        assert_eq!(files["empty"][0].size, 0, "chunk size {chunk}");
        assert_eq!(files["doc"][0].extension, ".pdf");
    }

    assert_eq!(
        whole_fields["notes"],
        FieldValue::Text("line one\r\nline two\r\n--not-a-boundary".into())
    );
    assert_eq!(
        whole_fields["tags"],
        FieldValue::List(vec!["a".into(), "b".into()])
    );
    assert_eq!(expected_doc[0].len(), 20_000);
}

#[test]
fn test_uneven_splits_match_single_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let boundary = "----anteroomXyZ";
    let body = sample_form().build();
    let (expected_fields, expected_files) =
        decode_in_chunks(&body, boundary, dir.path(), body.len());

    // Deterministic pseudo-random split points.
    let mut seed = 0x2545_f491_u32;
    let mut decoder = MultipartDecoder::new(boundary, dir.path().to_path_buf());
    let mut offset = 0;
    while offset < body.len() {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let len = 1 + (seed as usize % 97);
        let end = (offset + len).min(body.len());
        decoder.feed(&body[offset..end]).unwrap();
        offset = end;
    }
    let (fields, files) = decoder.finish().unwrap();
    assert_eq!(fields, expected_fields);
    assert_eq!(
        file_contents(&files, "doc"),
        file_contents(&expected_files, "doc")
    );
}

#[test]
fn test_file_arrays_keep_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("b")
        .file("pics[]", "one.png", "image/png", b"1")
        .file("pics[]", "two.JPG", "image/jpeg", b"22")
        .build();
    let (_, files) = decode_in_chunks(&body, "b", dir.path(), 5);
    let pics = &files["pics"];
    assert_eq!(pics.len(), 2);
    assert_eq!(pics[0].file_name, "one.png");
    assert_eq!(pics[1].file_name, "two.JPG");
    assert_eq!(pics[1].extension, ".jpg");
    assert_eq!(pics[1].field_name, "pics[]");
    assert_eq!(file_contents(&files, "pics"), vec![b"1".to_vec(), b"22".to_vec()]);
}

#[test]
fn test_file_part_without_content_type_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"raw\"\r\n\r\nxyz\r\n--b--";
    let (_, files) = decode_in_chunks(body, "b", dir.path(), 4);
    assert_eq!(files["f"][0].mime_type, "application/octet-stream");
    assert_eq!(files["f"][0].extension, "");
    assert_eq!(files["f"][0].size, 3);
}

#[test]
fn test_unselected_file_input_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("b")
        .text("a", "1")
        .file("upload", "", "application/octet-stream", b"")
        .build();
    let (fields, files) = decode_in_chunks(&body, "b", dir.path(), 3);
    assert_eq!(fields.len(), 1);
    assert!(files.is_empty());
    assert_eq!(uploads_in(dir.path()), 0);
}

#[test]
fn test_empty_forms() {
    let dir = tempfile::tempdir().unwrap();
    let (fields, files) = decode_in_chunks(b"", "b", dir.path(), 1);
    assert!(fields.is_empty() && files.is_empty());
    let (fields, files) = decode_in_chunks(b"--b--\r\n", "b", dir.path(), 2);
    assert!(fields.is_empty() && files.is_empty());
}

#[test]
fn test_missing_close_is_malformed_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("b")
        .file("f", "t.bin", "application/octet-stream", &[9u8; 4096])
        .text("a", "1")
        .build_unterminated();

    let mut decoder = MultipartDecoder::new("b", dir.path().to_path_buf());
    for piece in body.chunks(100) {
        decoder.feed(piece).unwrap();
    }
    assert!(uploads_in(dir.path()) > 0);
    let err = decoder.finish().unwrap_err();
    assert!(matches!(err, DecodeError::UnexpectedEnd(_)), "{err}");
    assert_eq!(uploads_in(dir.path()), 0);
}

#[test]
fn test_wrong_boundary_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let body = FormBuilder::new("other").text("a", "1").build();
    let mut decoder = MultipartDecoder::new("b", dir.path().to_path_buf());
    assert!(matches!(decoder.feed(&body), Err(DecodeError::Malformed(_))));
}

#[test]
fn test_unresolved_header_over_threshold_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let mut decoder = MultipartDecoder::new("b", dir.path().to_path_buf());
    decoder
        .feed(b"--b\r\nContent-Disposition: form-data; name=\"")
        .unwrap();
    let filler = vec![b'a'; 40 * 1024];
    decoder.feed(&filler).unwrap();
    let err = decoder.feed(&filler).unwrap_err();
    assert!(matches!(err, DecodeError::Overflow(_)), "{err}");
}

#[test]
fn test_large_file_data_is_not_bounded_by_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let payload = vec![b'z'; 300 * 1024];
    let body = FormBuilder::new("b")
        .file("big", "big.bin", "application/octet-stream", &payload)
        .build();
    let (_, files) = decode_in_chunks(&body, "b", dir.path(), 8 * 1024);
    assert_eq!(files["big"][0].size, payload.len() as u64);
}

#[test]
fn test_abort_midway_removes_partial_and_committed_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = FormBuilder::new("b")
        .file("first", "1.txt", "text/plain", b"complete")
        .build_unterminated();
    body.extend_from_slice(b"--b\r\nContent-Disposition: form-data; name=\"second\"; filename=\"2.txt\"\r\nContent-Type: text/plain\r\n\r\npartial data that keeps going");

    let mut decoder = MultipartDecoder::new("b", dir.path().to_path_buf());
    decoder.feed(&body).unwrap();
    assert_eq!(uploads_in(dir.path()), 2);
    drop(decoder);
    assert_eq!(uploads_in(dir.path()), 0);
}

#[test]
fn test_toggle_disables_multipart_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let config = BodyConfig {
        use_multipart_parser: false,
        upload_dir: dir.path().to_path_buf(),
        ..BodyConfig::default()
    };
    let form = FormBuilder::new("b").file("f", "t.txt", "text/plain", b"abc");
    let content_type = form.content_type();
    let mut decoder = BodyDecoder::select(Some(&content_type), &config).unwrap();
    assert_eq!(decoder.kind(), "discard");
    decoder.feed(&form.build()).unwrap();
    let decoded = decoder.finish().unwrap();
    assert!(decoded.files.is_empty());
    assert_eq!(uploads_in(dir.path()), 0);
}
