// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::redirect::Policy;
use std::pin::Pin;

use crate::config::Config;

/// Enclosure CDNs chain a few tracking redirects; anything beyond this is a loop
const MAX_REDIRECTS: usize = 10;

/// A streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// HTTP response with status, selected headers, and body stream
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Length header value, if present
    pub content_length: Option<u64>,
    /// Raw Content-Disposition header value, if present
    pub content_disposition: Option<String>,
    /// Response body as a stream of bytes
    pub body: ByteStream,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the entire response body as bytes, failing on HTTP error statuses
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error>;

    /// Get a streaming response for large downloads
    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client that follows redirects and applies the configured timeouts
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
    }

    async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        let body: ByteStream = Box::pin(response.bytes_stream());

        Ok(HttpResponse {
            status,
            content_length,
            content_disposition,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn configured_client_can_be_cloned() {
        let client = ReqwestClient::from_config(&Config::default()).unwrap();
        let _cloned = client.clone();
    }

    #[tokio::test]
    async fn get_stream_follows_redirects_and_exposes_disposition() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/cdn/redirect"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/media/ep1.mp3", server.uri())),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media/ep1.mp3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Disposition", r#"attachment; filename="ep1.mp3""#)
                    .set_body_bytes(b"audio bytes".to_vec()),
            )
            .mount(&server)
            .await;

        let client = ReqwestClient::from_config(&Config::default()).unwrap();
        let response = client
            .get_stream(&format!("{}/cdn/redirect", server.uri()))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(
            response.content_disposition.as_deref(),
            Some(r#"attachment; filename="ep1.mp3""#)
        );

        let chunks: Vec<_> = response.body.collect().await;
        let body: Vec<u8> = chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(body, b"audio bytes");
    }

    #[tokio::test]
    async fn get_bytes_fails_on_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ReqwestClient::from_config(&Config::default()).unwrap();
        let result = client.get_bytes(&format!("{}/feed.xml", server.uri())).await;

        assert!(result.is_err());
    }
}
