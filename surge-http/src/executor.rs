use async_trait::async_trait;
use tokio::time::Instant;

use crate::wire::estimate_http_request_bytes;
use crate::{HttpClient, HttpExchange, HttpRequest};

/// Capability used by scenarios to issue HTTP calls.
///
/// Implementations must never fail: transport errors are reported inside the returned
/// [`HttpExchange`].
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, req: HttpRequest) -> HttpExchange;
}

#[async_trait]
impl HttpExecutor for HttpClient {
    async fn execute(&self, req: HttpRequest) -> HttpExchange {
        let bytes_sent = estimate_http_request_bytes(&req).unwrap_or(0);
        let started = Instant::now();

        match self.request(req).await {
            Ok(res) => HttpExchange::from_response(res, started.elapsed()),
            Err(err) => {
                let kind = err.transport_error_kind();
                tracing::debug!(error = %err, %kind, "http transport error");
                HttpExchange::transport_error(kind, started.elapsed(), bytes_sent)
            }
        }
    }
}
