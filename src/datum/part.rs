//! Transport parts and their headers.

use std::io::Read;

/// Ordered multimap of part headers.
///
/// Names are matched case-insensitively, as MIME headers are; insertion
/// order and the original spelling of each name are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartHeaders {
    entries: Vec<(String, String)>,
}

impl PartHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// First value for `name`, treating an empty value as absent.
    pub(crate) fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One part of a multipart transport body.
pub struct Part<R> {
    file_name: Option<String>,
    headers: PartHeaders,
    body: R,
}

impl<R: Read> Part<R> {
    pub fn new(body: R) -> Self {
        Self {
            file_name: None,
            headers: PartHeaders::new(),
            body,
        }
    }

    pub fn with_headers(headers: PartHeaders, body: R) -> Self {
        Self {
            file_name: None,
            headers,
            body,
        }
    }

    /// Builder-style header append.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn headers(&self) -> &PartHeaders {
        &self.headers
    }

    /// Name used to identify this part in errors.
    pub fn display_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| "<unnamed>".to_string())
    }

    pub(crate) fn read_body(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf)?;
        Ok(buf)
    }
}
