//! Integration tests for urlencoded and JSON body decoding through [`BodyDecoder`]

use anteroom::context::FieldValue;
use anteroom::decoder::{BodyConfig, BodyDecoder, DecodeError, DecodedBody};
use serde_json::json;

const FORM: &str = "application/x-www-form-urlencoded";

fn decode(content_type: &str, body: &[u8], chunk: usize) -> Result<DecodedBody, DecodeError> {
    let mut decoder = BodyDecoder::select(Some(content_type), &BodyConfig::default())?;
    for piece in body.chunks(chunk.max(1)) {
        decoder.feed(piece)?;
    }
    decoder.finish()
}

fn list(items: &[&str]) -> FieldValue {
    FieldValue::List(items.iter().map(|s| s.to_string()).collect())
}

#[test]
fn test_array_convention() {
    let decoded = decode(FORM, b"x[]=1&x[]=2", 64).unwrap();
    assert_eq!(decoded.fields.len(), 1);
    assert_eq!(decoded.fields["x"], list(&["1", "2"]));
}

#[test]
fn test_encoded_array_marker() {
    let decoded = decode(FORM, b"x%5B%5D=1&x%5b%5d=2&y=3", 64).unwrap();
    assert_eq!(decoded.fields["x"], list(&["1", "2"]));
    assert_eq!(decoded.fields["y"], FieldValue::Text("3".into()));
}

#[test]
fn test_every_split_gives_same_fields() {
    let body = b"first=J%C3%BCrgen+Smith&tags[]=a%26b&tags[]=c%3Dd&flag&&last=%E2%9C%93";
    let expected = decode(FORM, body, body.len()).unwrap().fields;
    for chunk in 1..body.len() {
        assert_eq!(decode(FORM, body, chunk).unwrap().fields, expected, "chunk {chunk}");
    }
    assert_eq!(expected["first"], FieldValue::Text("Jürgen Smith".into()));
    assert_eq!(expected["tags"], list(&["a&b", "c=d"]));
    assert_eq!(expected["flag"], FieldValue::Text(String::new()));
    assert_eq!(expected["last"], FieldValue::Text("✓".into()));
    assert_eq!(expected.len(), 4);
}

#[test]
fn test_later_scalar_overwrites() {
    let decoded = decode(FORM, b"a=1&a=2", 3).unwrap();
    assert_eq!(decoded.fields["a"], FieldValue::Text("2".into()));
}

#[test]
fn test_json_body_split_anywhere() {
    let body = br#"{"user":{"name":"ada","langs":["rust","c"]},"n":42}"#;
    for chunk in [1, 5, body.len()] {
        let decoded = decode("application/json; charset=utf-8", body, chunk).unwrap();
        assert_eq!(
            decoded.json,
            Some(json!({"user": {"name": "ada", "langs": ["rust", "c"]}, "n": 42}))
        );
        assert!(decoded.fields.is_empty());
    }
}

#[test]
fn test_blank_json_body_is_none() {
    assert_eq!(decode("application/json", b"  \n", 1).unwrap().json, None);
}

#[test]
fn test_invalid_json_is_an_error() {
    let err = decode("application/json", b"{\"open\":", 4).unwrap_err();
    assert!(matches!(err, DecodeError::Json(_)), "{err}");
}

#[test]
fn test_unknown_content_type_yields_nothing() {
    let decoded = decode("text/plain", b"a=1", 1).unwrap();
    assert!(decoded.fields.is_empty());
    assert!(decoded.json.is_none());
}
