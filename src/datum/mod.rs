//! Datum wire codec.
//!
//! Stage results and arguments travel between the engine and functions as
//! parts of a multipart body. Each part carries a `Fnproject-Datumtype`
//! header naming the kind of value, plus kind-specific headers:
//!
//! | Datum type | Required headers | Body |
//! |------------|------------------|------|
//! | `blob`     | `Content-Type` | raw bytes |
//! | `empty`    | - | ignored |
//! | `error`    | `Content-Type: text/plain`, `Fnproject-Errortype` | message text |
//! | `stageref` | `Fnproject-Stageid` | ignored |
//! | `httpreq`  | `Fnproject-Method`, `Content-Type` | request body |
//! | `httpresp` | `Fnproject-Resultcode`, `Content-Type` | response body |
//!
//! HTTP headers of wrapped requests and responses are carried as repeated
//! `Fnproject-Header-<name>` headers on the part.
//!
//! # Example
//!
//! ```ignore
//! let part = Part::new(body)
//!     .header(HEADER_DATUM_TYPE, DATUM_TYPE_BLOB)
//!     .header(HEADER_CONTENT_TYPE, "text/plain");
//! let datum = decode_part(part)?;
//! ```

mod decode;
mod part;
mod types;

pub use decode::{decode_part, decode_parts};
pub use part::{Part, PartHeaders};
pub use types::{BlobDatum, Datum, ErrorKind, HttpHeader, HttpMethod};

pub const HEADER_DATUM_TYPE: &str = "Fnproject-Datumtype";
pub const HEADER_RESULT_STATUS: &str = "Fnproject-Resultstatus";
pub const HEADER_RESULT_CODE: &str = "Fnproject-Resultcode";
pub const HEADER_STAGE_REF: &str = "Fnproject-Stageid";
pub const HEADER_CALLER_REF: &str = "Fnproject-Callerid";
pub const HEADER_METHOD: &str = "Fnproject-Method";
pub const HEADER_HEADER_PREFIX: &str = "Fnproject-Header-";
pub const HEADER_ERROR_TYPE: &str = "Fnproject-Errortype";
pub const HEADER_FLOW_ID: &str = "Fnproject-FlowId";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

pub const RESULT_STATUS_SUCCESS: &str = "success";
pub const RESULT_STATUS_FAILURE: &str = "failure";

pub const DATUM_TYPE_BLOB: &str = "blob";
pub const DATUM_TYPE_EMPTY: &str = "empty";
pub const DATUM_TYPE_ERROR: &str = "error";
pub const DATUM_TYPE_STAGE_REF: &str = "stageref";
pub const DATUM_TYPE_HTTP_REQ: &str = "httpreq";
pub const DATUM_TYPE_HTTP_RESP: &str = "httpresp";

/// Content type required on error datums.
pub const ERROR_CONTENT_TYPE: &str = "text/plain";
