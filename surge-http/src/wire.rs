//! HTTP/1.1 byte accounting for `data_sent` and `data_received`.
//!
//! Sizes are computed from the request as the client will frame it, not read back from the
//! socket. Reason phrases are not counted.

use super::{Error, HttpRequest, Result};

const CRLF: u64 = 2;

/// A request URL checked for a supported scheme, in both forms the client needs.
pub(super) struct Target {
    pub url: url::Url,
    pub uri: hyper::Uri,
}

impl Target {
    pub(super) fn parse(raw: &str) -> Result<Self> {
        let url = url::Url::parse(raw).map_err(|_| Error::InvalidUrl(raw.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::UnsupportedScheme(raw.to_string()));
        }
        let uri = raw
            .parse()
            .map_err(|_| Error::InvalidUrl(raw.to_string()))?;
        Ok(Self { url, uri })
    }

    /// Value of the `host` header the client adds when the caller did not set one.
    pub(super) fn host_header(&self) -> Option<String> {
        let host = self.url.host_str()?;
        match self.url.port() {
            Some(port) if port != 80 => Some(format!("{host}:{port}")),
            _ => Some(host.to_string()),
        }
    }
}

pub(super) fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Estimated bytes a request puts on the wire: request line, headers, blank line and body.
///
/// `host` and `content-length` are counted even when the caller omits them, since the
/// client adds both.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    let target = Target::parse(&req.url)?;
    Ok(request_bytes(req, &target))
}

pub(super) fn request_bytes(req: &HttpRequest, target: &Target) -> u64 {
    let path = target.uri.path_and_query().map_or("/", |p| p.as_str());
    let mut total = line_len(&[req.method.as_str(), path, "HTTP/1.1"]);

    total += req
        .headers
        .iter()
        .map(|(k, v)| header_len(k.len(), v.len()))
        .sum::<u64>();

    if !has_header(&req.headers, "host")
        && let Some(host) = target.host_header()
    {
        total += header_len("host".len(), host.len());
    }
    if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
        total += header_len("content-length".len(), req.body.len().to_string().len());
    }

    total + CRLF + req.body.len() as u64
}

/// Status line, headers and the blank line of a response. The body is added by the caller
/// once it has been read.
pub(super) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version = match version {
        http::Version::HTTP_10 => "HTTP/1.0",
        http::Version::HTTP_2 => "HTTP/2",
        http::Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    };

    let head: u64 = headers
        .iter()
        .map(|(name, value)| header_len(name.as_str().len(), value.len()))
        .sum();

    line_len(&[version, status.as_str()]) + head + CRLF
}

/// Space-separated `parts` followed by CRLF.
fn line_len(parts: &[&str]) -> u64 {
    let text: usize = parts.iter().map(|p| p.len()).sum();
    (text + parts.len().saturating_sub(1)) as u64 + CRLF
}

/// `name: value\r\n`
fn header_len(name: usize, value: usize) -> u64 {
    (name + 2 + value) as u64 + CRLF
}
