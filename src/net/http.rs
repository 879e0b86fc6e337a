use super::{FetchError, Fetcher};
use crate::config::FetchConfig;
use bytes::Bytes;
use reqwest::blocking::Client;
use std::io::Read;
use std::time::Duration;

/// reqwest-backed [`Fetcher`] with a response size cap.
pub struct HttpFetcher {
    client: Client,
    max_response_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client from config: {}", e);
                Client::new()
            });

        Self {
            client,
            max_response_bytes: config.max_response_bytes,
        }
    }

    pub fn max_response_bytes(&self) -> u64 {
        self.max_response_bytes
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::request(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let declared = response.content_length();
        if let Some(size) = declared {
            if size > self.max_response_bytes {
                return Err(FetchError::TooLarge {
                    url: url.to_string(),
                    size,
                    max: self.max_response_bytes,
                });
            }
        }

        // One byte past the cap tells an oversized chunked body apart.
        let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
        response
            .take(self.max_response_bytes + 1)
            .read_to_end(&mut body)
            .map_err(|e| FetchError::request(url, e))?;

        let received = body.len() as u64;
        if received > self.max_response_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size: received,
                max: self.max_response_bytes,
            });
        }
        if let Some(expected) = declared {
            if received < expected {
                return Err(FetchError::Truncated {
                    url: url.to_string(),
                    expected,
                    received,
                });
            }
        }

        tracing::trace!(url, bytes = received, "Fetched");
        Ok(Bytes::from(body))
    }
}
