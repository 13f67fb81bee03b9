use crate::filter::Filter;
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

static CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"content-type:[ ]?([a-z0-9-]*/[a-z0-9-]*)")
        .case_insensitive(true)
        .build()
        .expect("content-type pattern is valid")
});

/// Output of one CGI run, split into its header and body.
#[derive(Debug, Clone, PartialEq)]
pub struct CgiResult {
    pub content_type: String,
    pub header: String,
    pub body: String,
    /// Body bytes as the script wrote them, before decoding and filtering.
    pub raw_body: Vec<u8>,
}

impl Default for CgiResult {
    fn default() -> Self {
        CgiResult {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            header: String::new(),
            body: String::new(),
            raw_body: Vec::new(),
        }
    }
}

impl CgiResult {
    pub fn is_html(&self) -> bool {
        self.content_type == "text/html"
    }
}

/// Splits raw CGI output on the first blank line.
///
/// Output without a blank line is all header. The filter, if any, runs
/// over the body only.
pub fn parse_response(raw: &[u8], filter: Option<&Filter>) -> Result<CgiResult, regex::Error> {
    let mut result = CgiResult::default();
    if raw.is_empty() {
        return Ok(result);
    }

    let (header, body) = split_at_blank_line(raw);
    result.header = String::from_utf8_lossy(header).into_owned();

    if let Some(caps) = CONTENT_TYPE.captures(&result.header) {
        result.content_type = caps[1].to_string();
    }

    let text = String::from_utf8_lossy(body);
    result.body = match filter {
        Some(filter) => filter.apply(&text)?,
        None => text.into_owned(),
    };
    result.raw_body = body.to_vec();
    Ok(result)
}

fn split_at_blank_line(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut offset: usize = 0;
    for line in raw.split(|&b| b == b'\n') {
        if line.trim_ascii().is_empty() {
            let header = &raw[..offset.saturating_sub(1)];
            let body = &raw[(offset + line.len() + 1).min(raw.len())..];
            return (header, body);
        }
        offset += line.len() + 1;
    }
    (raw, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output() {
        let result = parse_response(b"", None).unwrap();
        assert_eq!(result, CgiResult::default());
        assert!(result.is_html());
    }

    #[test]
    fn splits_on_first_blank_line() {
        let raw = "Content-type: text/plain\nX-Foo: 1\n\nline1\n\nline2";
        let result = parse_response(raw.as_bytes(), None).unwrap();
        assert_eq!(result.header, "Content-type: text/plain\nX-Foo: 1");
        assert_eq!(result.body, "line1\n\nline2");
        assert_eq!(result.content_type, "text/plain");
    }

    #[test]
    fn crlf_blank_line_separates() {
        let raw = "Content-Type:image/png\r\n\r\nPNG";
        let result = parse_response(raw.as_bytes(), None).unwrap();
        assert_eq!(result.header, "Content-Type:image/png\r");
        assert_eq!(result.body, "PNG");
        assert_eq!(result.content_type, "image/png");
    }

    #[test]
    fn binary_body_survives() {
        let mut raw = b"Content-Type: image/gif\n\n".to_vec();
        raw.extend_from_slice(&[0x47, 0x49, 0x46, 0xff, 0x00, 0x0a]);
        let result = parse_response(&raw, None).unwrap();
        assert_eq!(result.raw_body, [0x47, 0x49, 0x46, 0xff, 0x00, 0x0a]);
        assert_eq!(result.content_type, "image/gif");
    }

    #[test]
    fn blank_first_line() {
        let result = parse_response(b"\n<p>x</p>", None).unwrap();
        assert_eq!(result.header, "");
        assert_eq!(result.body, "<p>x</p>");
    }

    #[test]
    fn no_separator_means_no_body() {
        let raw = "Content-Type: text/plain\nStatus: 200 OK";
        let result = parse_response(raw.as_bytes(), None).unwrap();
        assert_eq!(result.body, "");
        assert_eq!(result.header, raw);
    }

    #[test]
    fn unknown_header_keeps_default_type() {
        let result = parse_response(b"Status: 200\n\n<p>hi</p>", None).unwrap();
        assert_eq!(result.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn charset_is_ignored() {
        let raw = "CONTENT-TYPE: text/html; charset=utf-8\n\n<p>x</p>";
        assert_eq!(parse_response(raw.as_bytes(), None).unwrap().content_type, "text/html");
    }

    #[test]
    fn filter_applies_to_body_only() {
        let filter = Filter::new("/foo/", "bar");
        let raw = "X-Foo: foo\n\nfoo and foo";
        let result = parse_response(raw.as_bytes(), Some(&filter)).unwrap();
        assert_eq!(result.header, "X-Foo: foo");
        assert_eq!(result.body, "bar and bar");
    }
}
