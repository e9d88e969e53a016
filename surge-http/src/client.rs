use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;

use super::wire::{Target, has_header, request_bytes, response_head_bytes};
use super::{Error, HttpRequest, HttpResponse, Result};

/// Connect timeout applied by [`HttpClient::default`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Pooled HTTP/1.1 client shared by every virtual user of a run. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: Option<Duration>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds, which would make an
        // unreachable target look like a hung run.
        Self::new(Some(DEFAULT_CONNECT_TIMEOUT))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut tcp = HttpConnector::new();
        tcp.enforce_http(false);
        tcp.set_connect_timeout(connect_timeout);

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(tcp);

        Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
            request_timeout: None,
        }
    }

    /// Timeout for requests that do not carry their own. Covers the whole exchange,
    /// including reading the response body.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let Some(limit) = req.timeout.or(self.request_timeout) else {
            return self.send(req).await;
        };
        tokio::time::timeout(limit, self.send(req))
            .await
            .unwrap_or(Err(Error::Timeout(limit)))
    }

    async fn send(&self, req: HttpRequest) -> Result<HttpResponse> {
        let target = Target::parse(&req.url)?;
        let bytes_sent = request_bytes(&req, &target);
        let request = build_request(req, target)?;

        let (parts, body) = self.inner.request(request).await?.into_parts();
        let head_bytes = response_head_bytes(parts.version, parts.status, &parts.headers);
        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status: parts.status.as_u16(),
            headers: merge_headers(&parts.headers),
            bytes_received: head_bytes.saturating_add(body.len() as u64),
            body,
            bytes_sent,
        })
    }
}

fn build_request(req: HttpRequest, target: Target) -> Result<Request<Full<Bytes>>> {
    let mut builder = Request::builder().method(req.method).uri(target.uri.clone());

    // Implicit headers are set explicitly so the wire matches `request_bytes`.
    if !has_header(&req.headers, "host")
        && let Some(host) = target.host_header()
    {
        builder = builder.header(http::header::HOST, host);
    }
    if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
        builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
    }

    for (name, value) in req.headers {
        builder = builder.header(
            http::header::HeaderName::from_bytes(name.as_bytes())?,
            http::header::HeaderValue::from_str(&value)?,
        );
    }

    Ok(builder.body(Full::new(req.body))?)
}

/// Lowercases names and joins repeated headers with ", ".
fn merge_headers(headers: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                cur.push_str(", ");
                cur.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    merged.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = http::HeaderMap::new();
        headers.append("set-cookie", http::HeaderValue::from_static("a=1"));
        headers.append("set-cookie", http::HeaderValue::from_static("b=2"));
        headers.insert("content-type", http::HeaderValue::from_static("application/json"));

        assert_eq!(
            merge_headers(&headers),
            vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("set-cookie".to_string(), "a=1, b=2".to_string()),
            ]
        );
    }

    #[test]
    fn build_request_adds_implicit_headers() {
        let req = HttpRequest::post("http://api.test:8080/api/readers", "{}");
        let target = Target::parse(&req.url).unwrap_or_else(|e| panic!("{e}"));
        let built = build_request(req, target).unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(built.headers()["host"], "api.test:8080");
        assert_eq!(built.headers()["content-length"], "2");
        assert_eq!(built.uri().path(), "/api/readers");
    }
}
