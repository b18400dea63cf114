//! Decoded datum values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed value exchanged between stages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datum {
    Blob(BlobDatum),
    Empty,
    Error {
        kind: ErrorKind,
        message: String,
    },
    StageRef {
        stage_id: u32,
    },
    HttpReq {
        body: BlobDatum,
        headers: Vec<HttpHeader>,
        method: HttpMethod,
    },
    HttpResp {
        body: BlobDatum,
        headers: Vec<HttpHeader>,
        status_code: u32,
    },
}

impl Datum {
    /// Build a blob datum.
    pub fn blob(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Datum::Blob(BlobDatum {
            content_type: content_type.into(),
            data: data.into(),
        })
    }

    /// Short name of the datum kind, as used on the wire.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Datum::Blob(_) => super::DATUM_TYPE_BLOB,
            Datum::Empty => super::DATUM_TYPE_EMPTY,
            Datum::Error { .. } => super::DATUM_TYPE_ERROR,
            Datum::StageRef { .. } => super::DATUM_TYPE_STAGE_REF,
            Datum::HttpReq { .. } => super::DATUM_TYPE_HTTP_REQ,
            Datum::HttpResp { .. } => super::DATUM_TYPE_HTTP_RESP,
        }
    }
}

/// Opaque bytes with a content type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDatum {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// One HTTP header of a wrapped request or response.
///
/// Multi-valued headers appear as repeated entries with the same key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub key: String,
    pub value: String,
}

impl HttpHeader {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Category of a stage failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownError,
    StageTimeout,
    StageFailed,
    FunctionTimeout,
    FunctionInvokeFailed,
    StageLost,
    InvalidStageResponse,
}

impl ErrorKind {
    const ALL: [ErrorKind; 7] = [
        ErrorKind::UnknownError,
        ErrorKind::StageTimeout,
        ErrorKind::StageFailed,
        ErrorKind::FunctionTimeout,
        ErrorKind::FunctionInvokeFailed,
        ErrorKind::StageLost,
        ErrorKind::InvalidStageResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnknownError => "unknown_error",
            ErrorKind::StageTimeout => "stage_timeout",
            ErrorKind::StageFailed => "stage_failed",
            ErrorKind::FunctionTimeout => "function_timeout",
            ErrorKind::FunctionInvokeFailed => "function_invoke_failed",
            ErrorKind::StageLost => "stage_lost",
            ErrorKind::InvalidStageResponse => "invalid_stage_response",
        }
    }

    /// Parse an `Fnproject-Errortype` header value.
    ///
    /// Dashes are accepted in place of underscores. Values that match no
    /// known kind become `UnknownError` so that newer peers can introduce
    /// kinds without breaking older decoders.
    pub fn from_header(value: &str) -> Self {
        let normalized = value.replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .unwrap_or(ErrorKind::UnknownError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method of a wrapped request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// Case-insensitive lookup; `None` for anything unrecognised.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "head" => Some(HttpMethod::Head),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "options" => Some(HttpMethod::Options),
            "patch" => Some(HttpMethod::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_from_header() {
        assert_eq!(ErrorKind::from_header("stage_timeout"), ErrorKind::StageTimeout);
        assert_eq!(ErrorKind::from_header("stage-timeout"), ErrorKind::StageTimeout);
        assert_eq!(
            ErrorKind::from_header("function-invoke-failed"),
            ErrorKind::FunctionInvokeFailed
        );
        assert_eq!(ErrorKind::from_header("totally-unknown"), ErrorKind::UnknownError);
        assert_eq!(ErrorKind::from_header(""), ErrorKind::UnknownError);
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!(HttpMethod::parse("get"), Some(HttpMethod::Get));
        assert_eq!(HttpMethod::parse("PoSt"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("connect"), None);
        assert_eq!(HttpMethod::parse(""), None);
    }

    #[test]
    fn test_datum_json_shape() {
        let datum = Datum::StageRef { stage_id: 7 };
        let json = serde_json::to_value(&datum).unwrap();
        assert_eq!(json, serde_json::json!({"stage_ref": {"stage_id": 7}}));

        let json = serde_json::to_value(&Datum::Empty).unwrap();
        assert_eq!(json, serde_json::json!("empty"));
    }
}
