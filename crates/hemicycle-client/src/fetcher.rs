use std::time::Duration;

use hemicycle_core::error::AppError;
use hemicycle_core::models::{EncodingMode, FetchRequest};
use hemicycle_core::traits::Fetcher;
use reqwest::Client;

/// HTTP fetcher using reqwest.
///
/// One GET per call, with a fixed User-Agent and timeout. HTTP redirects are
/// followed by reqwest; retries and soft redirects are left to
/// [`hemicycle_core::resilient::ResilientFetcher`].
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(60))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("hemicycle/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<String, AppError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                url: request.url.clone(),
            });
        }

        match request.encoding {
            EncodingMode::Text => response.text().await.map_err(|e| self.transport_error(e)),
            EncodingMode::Binary => {
                let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
                Ok(decode_latin1(&bytes))
            }
        }
    }
}

/// ISO-8859-1: every byte is the code point of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
