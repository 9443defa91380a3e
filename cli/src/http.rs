use anyhow::{Context, Result};
use std::time::Duration;

use larder_core::oauth::percent_encode;
use larder_core::transport::{HttpResponse, HttpTransport, TransportError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking [`HttpTransport`] over reqwest, driven by the CLI's runtime.
///
/// Must not be called from inside that runtime.
pub struct ReqwestTransport {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
}

impl ReqwestTransport {
    pub fn new(rt: tokio::runtime::Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("larder/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, rt })
    }
}

/// The query is encoded the same way it was signed.
fn request_url(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let encoded = query
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{url}?{encoded}")
}

fn classify(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, TransportError> {
        let full = request_url(url, query);
        self.rt.block_on(async {
            let resp = self
                .client
                .get(&full)
                .send()
                .await
                .map_err(|e| classify(&e))?;
            let status = resp.status().as_u16();
            let body = resp.text().await.map_err(|e| classify(&e))?;
            Ok(HttpResponse::new(status, body))
        })
    }
}
