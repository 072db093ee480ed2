//! Query transport.

use std::future::Future;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

/// Sends one query, optionally with a data payload, and returns the raw response body.
pub trait Transport {
    fn execute(
        &self,
        query: &str,
        payload: Option<Vec<u8>>,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Transport over the database's HTTP interface.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint()?,
        })
    }

    /// Reuse an existing client, e.g. one with custom timeouts.
    pub fn with_client(client: reqwest::Client, config: &ConnectionConfig) -> Result<Self> {
        Ok(Self {
            client,
            endpoint: config.endpoint()?,
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn execute(&self, query: &str, payload: Option<Vec<u8>>) -> Result<Vec<u8>> {
        tracing::debug!("POST {} query={}", self.endpoint, query);

        // With a payload the query travels in the URL, otherwise it is the body
        let request = match payload {
            Some(body) => {
                let mut url = self.endpoint.clone();
                url.query_pairs_mut().append_pair("query", query);
                self.client.post(url).body(body)
            }
            None => self.client.post(self.endpoint.clone()).body(query.to_string()),
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            let message = String::from_utf8_lossy(&body).trim().to_string();
            tracing::warn!("Query failed with HTTP {}: {}", status.as_u16(), message);
            return Err(Error::Transport {
                status: status.as_u16(),
                body: message,
            });
        }
        Ok(body.to_vec())
    }
}
