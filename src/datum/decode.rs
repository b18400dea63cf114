//! Part to datum decoding.

use super::part::Part;
use super::types::{BlobDatum, Datum, ErrorKind, HttpHeader, HttpMethod};
use super::{
    DATUM_TYPE_BLOB, DATUM_TYPE_EMPTY, DATUM_TYPE_ERROR, DATUM_TYPE_HTTP_REQ,
    DATUM_TYPE_HTTP_RESP, DATUM_TYPE_STAGE_REF, ERROR_CONTENT_TYPE, HEADER_CONTENT_TYPE,
    HEADER_DATUM_TYPE, HEADER_ERROR_TYPE, HEADER_HEADER_PREFIX, HEADER_METHOD,
    HEADER_RESULT_CODE, HEADER_STAGE_REF,
};
use crate::error::DatumError;
use std::io::{self, Read};

/// Decode a single transport part into a datum.
///
/// The datum type header is mandatory and dispatch on it is strict: an
/// unknown type is an error. Nothing is returned unless the whole part is
/// valid.
pub fn decode_part<R: Read>(mut part: Part<R>) -> Result<Datum, DatumError> {
    let datum_type = part
        .headers()
        .get_non_empty(HEADER_DATUM_TYPE)
        .map(str::to_string)
        .ok_or_else(|| DatumError::MissingHeader {
            part: part.display_name(),
            header: HEADER_DATUM_TYPE,
        })?;

    match datum_type.as_str() {
        DATUM_TYPE_BLOB => Ok(Datum::Blob(read_blob(&mut part)?)),
        DATUM_TYPE_EMPTY => Ok(Datum::Empty),
        DATUM_TYPE_ERROR => read_error(&mut part),
        DATUM_TYPE_STAGE_REF => {
            let value = part.headers().get(HEADER_STAGE_REF).unwrap_or_default();
            let stage_id = parse_u32(value).ok_or_else(|| DatumError::InvalidStageId {
                part: part.display_name(),
                value: value.to_string(),
            })?;
            Ok(Datum::StageRef { stage_id })
        }
        DATUM_TYPE_HTTP_REQ => {
            let raw = part
                .headers()
                .get_non_empty(HEADER_METHOD)
                .ok_or_else(|| DatumError::MissingHeader {
                    part: part.display_name(),
                    header: HEADER_METHOD,
                })?;
            let method = HttpMethod::parse(raw).ok_or_else(|| DatumError::InvalidMethod {
                part: part.display_name(),
                method: raw.to_string(),
            })?;
            let headers = collect_http_headers(&part);
            let body = read_blob(&mut part)?;
            Ok(Datum::HttpReq {
                body,
                headers,
                method,
            })
        }
        DATUM_TYPE_HTTP_RESP => {
            let raw = part
                .headers()
                .get_non_empty(HEADER_RESULT_CODE)
                .ok_or_else(|| DatumError::MissingHeader {
                    part: part.display_name(),
                    header: HEADER_RESULT_CODE,
                })?;
            let status_code = parse_u32(raw).ok_or_else(|| DatumError::InvalidResultCode {
                part: part.display_name(),
                value: raw.to_string(),
            })?;
            let headers = collect_http_headers(&part);
            let body = read_blob(&mut part)?;
            Ok(Datum::HttpResp {
                body,
                headers,
                status_code,
            })
        }
        other => Err(DatumError::UnrecognizedType {
            part: part.display_name(),
            datum_type: other.to_string(),
        }),
    }
}

/// Decode a sequence of parts, stopping at the first invalid one.
pub fn decode_parts<R, I>(parts: I) -> Result<Vec<Datum>, DatumError>
where
    R: Read,
    I: IntoIterator<Item = Part<R>>,
{
    parts.into_iter().map(decode_part).collect()
}

fn read_error<R: Read>(part: &mut Part<R>) -> Result<Datum, DatumError> {
    let content_type = part.headers().get(HEADER_CONTENT_TYPE).unwrap_or_default();
    if content_type != ERROR_CONTENT_TYPE {
        return Err(DatumError::InvalidContentType {
            part: part.display_name(),
            content_type: content_type.to_string(),
        });
    }

    let kind = part
        .headers()
        .get_non_empty(HEADER_ERROR_TYPE)
        .map(ErrorKind::from_header)
        .ok_or_else(|| DatumError::MissingHeader {
            part: part.display_name(),
            header: HEADER_ERROR_TYPE,
        })?;

    let message = String::from_utf8(read_body(part)?).map_err(|e| DatumError::UnreadableBody {
        part: part.display_name(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;
    Ok(Datum::Error { kind, message })
}

fn read_blob<R: Read>(part: &mut Part<R>) -> Result<BlobDatum, DatumError> {
    let content_type = part
        .headers()
        .get_non_empty(HEADER_CONTENT_TYPE)
        .map(str::to_string)
        .ok_or_else(|| DatumError::MissingHeader {
            part: part.display_name(),
            header: HEADER_CONTENT_TYPE,
        })?;

    let data = read_body(part)?;
    Ok(BlobDatum { content_type, data })
}

fn read_body<R: Read>(part: &mut Part<R>) -> Result<Vec<u8>, DatumError> {
    part.read_body().map_err(|source| DatumError::UnreadableBody {
        part: part.display_name(),
        source,
    })
}

/// Collect `Fnproject-Header-*` entries with the prefix stripped.
fn collect_http_headers<R: Read>(part: &Part<R>) -> Vec<HttpHeader> {
    let prefix_len = HEADER_HEADER_PREFIX.len();
    part.headers()
        .iter()
        .filter_map(|(name, value)| {
            let prefix = name.get(..prefix_len)?;
            if !prefix.eq_ignore_ascii_case(HEADER_HEADER_PREFIX) {
                return None;
            }
            Some(HttpHeader::new(&name[prefix_len..], value))
        })
        .collect()
}

/// Unsigned decimal, no sign allowed.
fn parse_u32(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn part(body: &'static [u8]) -> Part<&'static [u8]> {
        Part::new(body).file_name("test-part")
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn test_blob() {
        let datum = decode_part(
            part(b"hi")
                .header(HEADER_DATUM_TYPE, "blob")
                .header(HEADER_CONTENT_TYPE, "text/plain"),
        )
        .unwrap();
        assert_eq!(datum, Datum::blob("text/plain", "hi"));
    }

    #[test]
    fn test_blob_missing_content_type() {
        let result = decode_part(part(b"hi").header(HEADER_DATUM_TYPE, "blob"));
        assert!(matches!(
            result,
            Err(DatumError::MissingHeader { header: HEADER_CONTENT_TYPE, .. })
        ));
    }

    #[test]
    fn test_blob_unreadable_body() {
        let result = decode_part(
            Part::new(FailingReader)
                .header(HEADER_DATUM_TYPE, "blob")
                .header(HEADER_CONTENT_TYPE, "application/octet-stream"),
        );
        assert!(matches!(result, Err(DatumError::UnreadableBody { .. })));
    }

    #[test]
    fn test_missing_datum_type() {
        let result = decode_part(part(b"").header(HEADER_CONTENT_TYPE, "text/plain"));
        match result {
            Err(DatumError::MissingHeader { part, header }) => {
                assert_eq!(part, "test-part");
                assert_eq!(header, HEADER_DATUM_TYPE);
            }
            other => panic!("Expected MissingHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_datum_type() {
        let result = decode_part(part(b"").header(HEADER_DATUM_TYPE, "state"));
        assert!(matches!(result, Err(DatumError::UnrecognizedType { .. })));
    }

    #[test]
    fn test_empty_ignores_body() {
        let datum = decode_part(
            Part::new(FailingReader).header(HEADER_DATUM_TYPE, "empty"),
        )
        .unwrap();
        assert_eq!(datum, Datum::Empty);
    }

    #[test]
    fn test_error_requires_text_plain() {
        let result = decode_part(
            part(b"boom")
                .header(HEADER_DATUM_TYPE, "error")
                .header(HEADER_CONTENT_TYPE, "application/json")
                .header(HEADER_ERROR_TYPE, "stage_failed"),
        );
        assert!(matches!(result, Err(DatumError::InvalidContentType { .. })));
    }

    #[test]
    fn test_error_requires_error_type() {
        let result = decode_part(
            part(b"boom")
                .header(HEADER_DATUM_TYPE, "error")
                .header(HEADER_CONTENT_TYPE, "text/plain"),
        );
        assert!(matches!(
            result,
            Err(DatumError::MissingHeader { header: HEADER_ERROR_TYPE, .. })
        ));
    }

    #[test]
    fn test_error_unknown_kind_is_coerced() {
        let datum = decode_part(
            part(b"it broke")
                .header(HEADER_DATUM_TYPE, "error")
                .header(HEADER_CONTENT_TYPE, "text/plain")
                .header(HEADER_ERROR_TYPE, "totally-unknown"),
        )
        .unwrap();
        assert_eq!(
            datum,
            Datum::Error {
                kind: ErrorKind::UnknownError,
                message: "it broke".to_string(),
            }
        );
    }

    #[test]
    fn test_error_rejects_non_utf8_message() {
        let result = decode_part(
            part(b"bad \xff\xfe bytes")
                .header(HEADER_DATUM_TYPE, "error")
                .header(HEADER_CONTENT_TYPE, "text/plain")
                .header(HEADER_ERROR_TYPE, "stage_failed"),
        );
        match result {
            Err(DatumError::UnreadableBody { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::InvalidData)
            }
            other => panic!("expected UnreadableBody, got {:?}", other),
        }
    }

    #[test]
    fn test_error_known_kind() {
        let datum = decode_part(
            part(b"too slow")
                .header(HEADER_DATUM_TYPE, "error")
                .header(HEADER_CONTENT_TYPE, "text/plain")
                .header(HEADER_ERROR_TYPE, "stage-timeout"),
        )
        .unwrap();
        assert!(matches!(
            datum,
            Datum::Error { kind: ErrorKind::StageTimeout, .. }
        ));
    }

    #[test]
    fn test_stage_ref() {
        let datum = decode_part(
            part(b"")
                .header(HEADER_DATUM_TYPE, "stageref")
                .header(HEADER_STAGE_REF, "42"),
        )
        .unwrap();
        assert_eq!(datum, Datum::StageRef { stage_id: 42 });
    }

    #[test]
    fn test_stage_ref_invalid() {
        for value in ["-1", "abc", "", "+5", "4294967296"] {
            let result = decode_part(
                part(b"")
                    .header(HEADER_DATUM_TYPE, "stageref")
                    .header(HEADER_STAGE_REF, value),
            );
            assert!(
                matches!(result, Err(DatumError::InvalidStageId { .. })),
                "value {:?} should be rejected",
                value
            );
        }

        let result = decode_part(part(b"").header(HEADER_DATUM_TYPE, "stageref"));
        assert!(matches!(result, Err(DatumError::InvalidStageId { .. })));
    }

    #[test]
    fn test_http_req() {
        let datum = decode_part(
            part(b"")
                .header(HEADER_DATUM_TYPE, "httpreq")
                .header(HEADER_METHOD, "get")
                .header("Fnproject-Header-X-Trace", "abc")
                .header(HEADER_CONTENT_TYPE, "text/plain"),
        )
        .unwrap();
        assert_eq!(
            datum,
            Datum::HttpReq {
                body: BlobDatum {
                    content_type: "text/plain".to_string(),
                    data: Vec::new(),
                },
                headers: vec![HttpHeader::new("X-Trace", "abc")],
                method: HttpMethod::Get,
            }
        );
    }

    #[test]
    fn test_http_req_multi_value_and_case_insensitive_prefix() {
        let datum = decode_part(
            part(b"payload")
                .header(HEADER_DATUM_TYPE, "httpreq")
                .header(HEADER_METHOD, "POST")
                .header("fnproject-header-Accept", "text/html")
                .header("Fnproject-Header-Accept", "application/json")
                .header("X-Unrelated", "ignored")
                .header(HEADER_CONTENT_TYPE, "application/octet-stream"),
        )
        .unwrap();
        match datum {
            Datum::HttpReq {
                headers,
                method,
                body,
            } => {
                assert_eq!(method, HttpMethod::Post);
                assert_eq!(
                    headers,
                    vec![
                        HttpHeader::new("Accept", "text/html"),
                        HttpHeader::new("Accept", "application/json"),
                    ]
                );
                assert_eq!(body.data, b"payload");
            }
            other => panic!("Expected HttpReq, got {:?}", other),
        }
    }

    #[test]
    fn test_http_req_bad_method() {
        let result = decode_part(
            part(b"")
                .header(HEADER_DATUM_TYPE, "httpreq")
                .header(HEADER_METHOD, "fetch")
                .header(HEADER_CONTENT_TYPE, "text/plain"),
        );
        assert!(matches!(result, Err(DatumError::InvalidMethod { .. })));

        let result = decode_part(
            part(b"")
                .header(HEADER_DATUM_TYPE, "httpreq")
                .header(HEADER_CONTENT_TYPE, "text/plain"),
        );
        assert!(matches!(
            result,
            Err(DatumError::MissingHeader { header: HEADER_METHOD, .. })
        ));
    }

    #[test]
    fn test_http_req_requires_body_content_type() {
        let result = decode_part(
            part(b"")
                .header(HEADER_DATUM_TYPE, "httpreq")
                .header(HEADER_METHOD, "get"),
        );
        assert!(matches!(
            result,
            Err(DatumError::MissingHeader { header: HEADER_CONTENT_TYPE, .. })
        ));
    }

    #[test]
    fn test_http_resp() {
        let datum = decode_part(
            part(b"{}")
                .header(HEADER_DATUM_TYPE, "httpresp")
                .header(HEADER_RESULT_CODE, "201")
                .header("Fnproject-Header-Location", "/things/1")
                .header(HEADER_CONTENT_TYPE, "application/json"),
        )
        .unwrap();
        assert_eq!(
            datum,
            Datum::HttpResp {
                body: BlobDatum {
                    content_type: "application/json".to_string(),
                    data: b"{}".to_vec(),
                },
                headers: vec![HttpHeader::new("Location", "/things/1")],
                status_code: 201,
            }
        );
    }

    #[test]
    fn test_http_resp_bad_result_code() {
        let result = decode_part(
            part(b"")
                .header(HEADER_DATUM_TYPE, "httpresp")
                .header(HEADER_RESULT_CODE, "ok")
                .header(HEADER_CONTENT_TYPE, "text/plain"),
        );
        assert!(matches!(result, Err(DatumError::InvalidResultCode { .. })));

        let result = decode_part(
            part(b"")
                .header(HEADER_DATUM_TYPE, "httpresp")
                .header(HEADER_CONTENT_TYPE, "text/plain"),
        );
        assert!(matches!(
            result,
            Err(DatumError::MissingHeader { header: HEADER_RESULT_CODE, .. })
        ));
    }

    #[test]
    fn test_decode_parts_stops_on_first_error() {
        let parts = vec![
            part(b"").header(HEADER_DATUM_TYPE, "empty"),
            part(b"").header(HEADER_DATUM_TYPE, "bogus"),
            part(b"").header(HEADER_DATUM_TYPE, "empty"),
        ];
        assert!(decode_parts(parts).is_err());

        let parts = vec![
            part(b"").header(HEADER_DATUM_TYPE, "empty"),
            part(b"")
                .header(HEADER_DATUM_TYPE, "stageref")
                .header(HEADER_STAGE_REF, "3"),
        ];
        assert_eq!(
            decode_parts(parts).unwrap(),
            vec![Datum::Empty, Datum::StageRef { stage_id: 3 }]
        );
    }
}
