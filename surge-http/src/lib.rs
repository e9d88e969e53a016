#![forbid(unsafe_code)]

mod client;
mod error;
mod exchange;
mod executor;
mod types;
mod wire;

pub use client::HttpClient;
pub use error::{Error, HttpTransportErrorKind, Result};
pub use exchange::HttpExchange;
pub use executor::HttpExecutor;
pub use types::{HttpRequest, HttpResponse};
pub use wire::estimate_http_request_bytes;
