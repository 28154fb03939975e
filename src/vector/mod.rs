//! Embedding vector decoding, normalization and dimension checks.
//!
//! Callers hand embeddings over in whatever shape their host produced: a JSON
//! array of numbers, an array of numeric strings, a JSON array serialized into
//! a string, a comma-separated string, or base64-encoded little-endian float32
//! values. [`parse`] accepts all of them and always yields finite values.

mod error;

use std::sync::LazyLock;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use serde_json::Value;

pub use error::{INPUT_EXCERPT_LEN, VectorError, VectorResult};

static BASE64_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").unwrap());

/// Parse an embedding from a JSON value.
///
/// Returns `Ok(None)` for `null`. Strings are tried as a JSON array first,
/// then as comma-separated values, then as base64 float32 data. The order
/// matters: a JSON array string also contains commas.
pub fn parse(input: &Value) -> VectorResult<Option<Vec<f64>>> {
    match input {
        Value::Null => Ok(None),
        Value::Array(items) => parse_elements(items).map(Some),
        Value::String(s) => parse_str(s).map(Some),
        other => Err(VectorError::unsupported(&other.to_string())),
    }
}

/// Parse an embedding from its string encoding.
pub fn parse_str(input: &str) -> VectorResult<Vec<f64>> {
    let trimmed = input.trim();

    if trimmed.starts_with('[')
        && let Ok(items) = serde_json::from_str::<Vec<Value>>(trimmed)
    {
        return parse_elements(&items);
    }

    if trimmed.contains(',') {
        return Ok(parse_csv(trimmed));
    }

    if trimmed.len() % 4 == 0 && BASE64_REGEX.is_match(trimmed) {
        return decode_base64_f32(trimmed).ok_or_else(|| VectorError::unsupported(input))?;
    }

    Err(VectorError::unsupported(input))
}

fn parse_elements(items: &[Value]) -> VectorResult<Vec<f64>> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let value = match item {
                Value::Number(n) => n.as_f64().ok_or_else(|| {
                    VectorError::NotAVector(format!("element {index} is out of range: {n}"))
                })?,
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                    VectorError::NotAVector(format!("element {index} is not numeric: {s:?}"))
                })?,
                other => {
                    return Err(VectorError::NotAVector(format!(
                        "element {index} is not numeric: {other}"
                    )));
                }
            };
            if value.is_finite() {
                Ok(value)
            } else {
                Err(VectorError::NonFiniteElement { index })
            }
        })
        .collect()
}

/// Comma-separated values. Tokens that are not finite numbers are dropped.
fn parse_csv(input: &str) -> Vec<f64> {
    input
        .split(',')
        .filter_map(|token| token.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

/// Decode base64 into packed little-endian float32 values.
///
/// Returns `None` when the payload is not valid base64 or its byte length is
/// not a positive multiple of 4.
fn decode_base64_f32(input: &str) -> Option<VectorResult<Vec<f64>>> {
    let bytes = STANDARD.decode(input).ok()?;
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    let values = bytes
        .chunks_exact(4)
        .enumerate()
        .map(|(index, chunk)| {
            let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            if value.is_finite() {
                Ok(f64::from(value))
            } else {
                Err(VectorError::NonFiniteElement { index })
            }
        })
        .collect();
    Some(values)
}

/// Scale a vector to unit L2 length.
///
/// Empty vectors and vectors whose norm is zero or not finite come back unchanged.
pub fn normalize(vector: &[f64]) -> Vec<f64> {
    if vector.is_empty() {
        return Vec::new();
    }
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Check a vector against an expected dimension.
///
/// `None` or `Some(0)` disables the check.
pub fn validate_dimension(vector: Vec<f64>, expected: Option<usize>) -> VectorResult<Vec<f64>> {
    match expected {
        Some(expected) if expected > 0 && vector.len() != expected => {
            Err(VectorError::DimensionMismatch {
                actual: vector.len(),
                expected,
            })
        }
        _ => Ok(vector),
    }
}

/// Format a vector as a pgvector text literal, e.g. `[0.1,0.2,0.3]`.
pub fn to_pgvector_literal(vector: &[f64]) -> String {
    let values: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Decode pgvector's binary wire format.
///
/// Layout: big-endian `u16` dimension, `u16` reserved, then `dim` big-endian float32 values.
pub fn from_pgvector_binary(bytes: &[u8]) -> Option<Vec<f64>> {
    if bytes.len() < 4 {
        return None;
    }
    let dim = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let body = &bytes[4..];
    if body.len() != dim * 4 {
        return None;
    }
    Some(
        body.chunks_exact(4)
            .map(|c| f64::from(f32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_parse_null_is_none() {
        assert_eq!(parse(&Value::Null).unwrap(), None);
    }

    #[rstest]
    #[case::numbers(json!([1, 2, 3]))]
    #[case::floats(json!([1.0, 2.0, 3.0]))]
    #[case::numeric_strings(json!(["1", " 2 ", "3.0"]))]
    #[case::json_string(json!("[1,2,3]"))]
    #[case::json_string_with_spaces(json!("  [1, 2, 3] "))]
    #[case::csv(json!("1,2,3"))]
    #[case::csv_with_spaces(json!(" 1 , 2 ,3 "))]
    #[case::base64(json!("AACAPwAAAEAAAEBA"))]
    fn test_parse_encodings_agree(#[case] input: Value) {
        let parsed = parse(&input).unwrap().unwrap();
        assert_close(&parsed, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_parse_csv_drops_garbage_tokens() {
        let parsed = parse(&json!("1, abc, 3")).unwrap().unwrap();
        assert_close(&parsed, &[1.0, 3.0]);
    }

    #[test]
    fn test_parse_csv_drops_non_finite_tokens() {
        let parsed = parse(&json!("1,NaN,inf,-infinity,,4")).unwrap().unwrap();
        assert_close(&parsed, &[1.0, 4.0]);
    }

    #[test]
    fn test_parse_malformed_json_falls_through_to_csv() {
        // "[1" is not a number, so the leading token is dropped
        let parsed = parse(&json!("[1, 2, 3")).unwrap().unwrap();
        assert_close(&parsed, &[2.0, 3.0]);
    }

    #[test]
    fn test_parse_base64_with_padding() {
        let parsed = parse(&json!("AAAAPwAAoL8=")).unwrap().unwrap();
        assert_close(&parsed, &[0.5, -1.25]);
    }

    #[test]
    fn test_parse_base64_non_finite_rejected() {
        let err = parse(&json!("AADAfw==")).unwrap_err();
        assert_eq!(err, VectorError::NonFiniteElement { index: 0 });
    }

    #[test]
    fn test_parse_base64_wrong_byte_length_unsupported() {
        // "abcd" decodes to 3 bytes, which is not a whole float32
        let err = parse(&json!("abcd")).unwrap_err();
        assert!(matches!(err, VectorError::UnsupportedFormat { .. }));
    }

    #[rstest]
    #[case::word(json!("not-a-vector"))]
    #[case::number(json!(42))]
    #[case::boolean(json!(true))]
    #[case::object(json!({"vector": [1, 2]}))]
    #[case::empty_string(json!(""))]
    fn test_parse_unsupported(#[case] input: Value) {
        let err = parse(&input).unwrap_err();
        assert!(
            matches!(err, VectorError::UnsupportedFormat { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_unsupported_input_is_truncated() {
        let long = "x".repeat(500);
        match parse_str(&long).unwrap_err() {
            VectorError::UnsupportedFormat { input } => {
                assert_eq!(input.len(), INPUT_EXCERPT_LEN + 3);
                assert!(input.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_array_with_non_numeric_element() {
        let err = parse(&json!([1, "abc", 3])).unwrap_err();
        assert!(matches!(err, VectorError::NotAVector(msg) if msg.contains("element 1")));
    }

    #[test]
    fn test_parse_array_with_nested_array() {
        let err = parse(&json!([[1, 2], 3])).unwrap_err();
        assert!(matches!(err, VectorError::NotAVector(_)));
    }

    #[test]
    fn test_parse_array_non_finite_string_rejected() {
        let err = parse(&json!(["1", "Infinity"])).unwrap_err();
        assert_eq!(err, VectorError::NonFiniteElement { index: 1 });
    }

    #[test]
    fn test_parse_empty_array() {
        assert_eq!(parse(&json!([])).unwrap(), Some(vec![]));
    }

    #[test]
    fn test_normalize() {
        assert_close(&normalize(&[3.0, 4.0]), &[0.6, 0.8]);
        assert_close(&normalize(&[0.0, 0.0, 0.0]), &[0.0, 0.0, 0.0]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_normalize_overflowing_norm_unchanged() {
        let input = [f64::MAX, f64::MAX];
        assert_eq!(normalize(&input), input.to_vec());
    }

    #[test]
    fn test_validate_dimension() {
        assert_eq!(
            validate_dimension(vec![1.0, 2.0, 3.0], Some(3)).unwrap(),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(
            validate_dimension(vec![1.0, 2.0, 3.0], None).unwrap(),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(
            validate_dimension(vec![1.0, 2.0, 3.0], Some(0)).unwrap(),
            vec![1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_validate_dimension_mismatch_names_both_lengths() {
        let err = validate_dimension(vec![1.0, 2.0, 3.0], Some(5)).unwrap_err();
        assert_eq!(
            err,
            VectorError::DimensionMismatch {
                actual: 3,
                expected: 5
            }
        );
        let msg = err.to_string();
        assert!(msg.contains('3') && msg.contains('5'));
    }

    #[test]
    fn test_to_pgvector_literal() {
        assert_eq!(to_pgvector_literal(&[0.1, 0.2, 0.3]), "[0.1,0.2,0.3]");
        assert_eq!(to_pgvector_literal(&[]), "[]");
        assert_eq!(to_pgvector_literal(&[-1.5, 0.0]), "[-1.5,0]");
    }

    #[test]
    fn test_from_pgvector_binary() {
        let bytes = [
            0x00, 0x03, 0x00, 0x00, 0x3f, 0x80, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x40, 0x40,
            0x00, 0x00,
        ];
        assert_eq!(from_pgvector_binary(&bytes), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(from_pgvector_binary(&bytes[..10]), None);
        assert_eq!(from_pgvector_binary(&[]), None);
    }
}
