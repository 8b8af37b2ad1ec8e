// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::Bytes;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{UpstreamFeed, parse_document};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<Bytes, FeedError> {
    let bytes = client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;
    Ok(bytes)
}

/// Read raw feed bytes from a local file (without parsing)
pub fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Fetch and parse an upstream document from a URL or a local file path
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    source: &str,
) -> Result<UpstreamFeed, FeedError> {
    let bytes = if is_url(source) {
        fetch_feed_bytes(client, source).await?.to_vec()
    } else {
        read_feed_file(Path::new(source))?
    };
    let feed = parse_document(&bytes)?;
    tracing::debug!(source, entries = feed.entries.len(), "parsed upstream feed");
    Ok(feed)
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct StaticClient(&'static str);

    #[async_trait]
    impl HttpClient for StaticClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::from_static(self.0.as_bytes()))
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            unreachable!("feeds are fetched in one piece")
        }
    }

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Local</title><description>d</description>
<item><title>One</title><pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
<enclosure url="https://example.com/one.mp3" type="audio/mpeg"/></item>
</channel></rss>"#;

    #[test]
    fn is_url_detects_http() {
        assert!(is_url("http://example.com/feed.xml"));
        assert!(is_url("https://example.com/feed.xml"));
    }

    #[test]
    fn is_url_rejects_file_paths() {
        assert!(!is_url("/path/to/feed.xml"));
        assert!(!is_url("./feed.xml"));
        assert!(!is_url("feed.xml"));
    }

    #[tokio::test]
    async fn fetches_over_http() {
        let feed = fetch_feed(&StaticClient(FEED), "https://example.com/feed.xml")
            .await
            .unwrap();
        assert_eq!(feed.title.as_deref(), Some("Local"));
        assert_eq!(feed.entries.len(), 1);
    }

    #[tokio::test]
    async fn reads_local_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, FEED).unwrap();

        let feed = fetch_feed(&StaticClient(""), path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(feed.entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_local_file_is_fetch_error() {
        let result = fetch_feed(&StaticClient(""), "/nonexistent/feed.xml").await;
        assert!(matches!(result, Err(FeedError::FileReadFailed { .. })));
    }
}
