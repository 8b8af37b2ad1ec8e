// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::config::Config;
use crate::error::{PodfoxError, StoreError};
use crate::feed::{UpstreamFeed, fetch_feed};
use crate::http::HttpClient;
use crate::metadata::{Episode, Feed};
use crate::progress::{FeedResults, ProgressEvent, SharedProgressReporter};
use crate::store::FeedStore;

/// Result of synchronizing one feed
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// The persisted feed after the merge
    pub feed: Feed,
    /// Number of episodes that were not known before
    pub new_episodes: usize,
}

/// Turn upstream entries into episodes
///
/// Entries without a parsable publish date are dropped entirely. Every link
/// whose declared type is in `mimetypes` becomes its own episode, so one
/// entry may yield several episodes that differ only by URL.
pub fn extract_episodes(upstream: &UpstreamFeed, mimetypes: &[String]) -> Vec<Episode> {
    let mut episodes = Vec::new();

    for entry in &upstream.entries {
        let Some(published) = entry.published else {
            tracing::debug!(title = ?entry.title, "skipping entry without a valid publish date");
            continue;
        };

        let qualifying = entry.links.iter().filter(|link| {
            link.mime_type
                .as_deref()
                .is_some_and(|mime| mimetypes.iter().any(|allowed| allowed == mime))
        });

        for link in qualifying {
            let title = entry.title.clone().unwrap_or_else(|| link.href.clone());
            episodes.push(Episode::new(title, link.href.clone(), published));
        }
    }

    episodes
}

/// Derive a directory-safe shortname from a feed title, or the URL's last
/// path segment when the title is missing
pub fn derive_shortname(title: Option<&str>, url: &str) -> Option<String> {
    let source = title.unwrap_or_else(|| url.rsplit('/').next().unwrap_or(url));

    let kept: String = source
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ')
        .collect();
    let shortname = kept.replace(' ', "-").to_lowercase();

    Some(shortname).filter(|s| !s.is_empty())
}

/// Subscribe to a new feed
///
/// The upstream document is fetched before anything touches the disk, so a
/// fetch or parse failure leaves no directory behind.
pub async fn import_feed<C: HttpClient + ?Sized>(
    client: &C,
    store: &FeedStore,
    config: &Config,
    url: &str,
    shortname: Option<&str>,
    reporter: &SharedProgressReporter,
) -> Result<Feed, PodfoxError> {
    if let Some(shortname) = shortname {
        ensure_available(store, shortname)?;
    }

    reporter.report(ProgressEvent::FetchingFeed {
        shortname: shortname.unwrap_or_default().to_string(),
        url: url.to_string(),
    });
    let upstream = fetch_feed(client, url).await?;

    let shortname = match shortname {
        Some(shortname) => shortname.to_string(),
        None => {
            let derived = derive_shortname(upstream.title.as_deref(), url).ok_or_else(|| {
                StoreError::InvalidShortname {
                    shortname: String::new(),
                    reason: "could not derive one from the feed, please provide it explicitly"
                        .to_string(),
                }
            })?;
            ensure_available(store, &derived)?;
            derived
        }
    };

    let title = upstream.title.clone().unwrap_or_else(|| shortname.clone());
    let empty = Feed::new(shortname, title, url);
    let (feed, new_episodes) = empty.merged_with(extract_episodes(&upstream, &config.mimetypes));

    store.create(&feed)?;

    tracing::info!(shortname = %feed.shortname, episodes = new_episodes, "imported feed");
    reporter.report(ProgressEvent::FeedSynchronized {
        shortname: feed.shortname.clone(),
        title: feed.title.clone(),
        new_episodes,
        total_episodes: feed.episodes.len(),
    });

    Ok(feed)
}

fn ensure_available(store: &FeedStore, shortname: &str) -> Result<(), StoreError> {
    let dir = store.feed_dir(shortname)?;
    if dir.exists() {
        return Err(StoreError::Conflict { path: dir });
    }
    Ok(())
}

/// Fetch a feed's upstream document and persist any new episodes
///
/// Fetch or parse failures abort before anything is written.
pub async fn synchronize<C: HttpClient + ?Sized>(
    client: &C,
    store: &FeedStore,
    config: &Config,
    feed: &Feed,
    reporter: &SharedProgressReporter,
) -> Result<SyncResult, PodfoxError> {
    reporter.report(ProgressEvent::FetchingFeed {
        shortname: feed.shortname.clone(),
        url: feed.url.clone(),
    });

    let upstream = fetch_feed(client, &feed.url).await?;
    let (updated, new_episodes) = feed.merged_with(extract_episodes(&upstream, &config.mimetypes));

    store.write(&updated)?;

    tracing::info!(shortname = %updated.shortname, new_episodes, "synchronized feed");
    reporter.report(ProgressEvent::FeedSynchronized {
        shortname: updated.shortname.clone(),
        title: updated.title.clone(),
        new_episodes,
        total_episodes: updated.episodes.len(),
    });

    Ok(SyncResult {
        feed: updated,
        new_episodes,
    })
}

/// Synchronize every stored feed; one feed failing does not stop the others
pub async fn synchronize_all<C: HttpClient + ?Sized>(
    client: &C,
    store: &FeedStore,
    config: &Config,
    reporter: &SharedProgressReporter,
) -> Result<FeedResults<SyncResult>, PodfoxError> {
    let mut results = Vec::new();

    for feed in store.list()? {
        let result = synchronize(client, store, config, &feed, reporter).await;
        if let Err(e) = &result {
            tracing::warn!(shortname = %feed.shortname, error = %e, "synchronization failed");
        }
        results.push((feed.shortname, result));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{UpstreamEntry, UpstreamLink};
    use crate::http::HttpResponse;
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Serves a swappable feed document for every URL
    struct MockFeedClient {
        feed_xml: Mutex<Option<String>>,
    }

    impl MockFeedClient {
        fn serving(xml: &str) -> Self {
            Self {
                feed_xml: Mutex::new(Some(xml.to_string())),
            }
        }

        fn set(&self, xml: Option<&str>) {
            *self.feed_xml.lock().unwrap() = xml.map(String::from);
        }
    }

    #[async_trait]
    impl HttpClient for MockFeedClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            let xml = self.feed_xml.lock().unwrap().clone();
            match xml {
                Some(xml) => Ok(Bytes::from(xml)),
                // A relative URL fails inside reqwest without touching the network
                None => reqwest::get("not a url").await?.bytes().await,
            }
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            unreachable!("synchronization never streams")
        }
    }

    const FEED_V1: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast: The Show!</title>
    <description>A test podcast</description>
    <item>
      <title>Ep1</title>
      <pubDate>Thu, 01 Jan 1970 00:16:40 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Broken date</title>
      <pubDate>yesterday-ish</pubDate>
      <enclosure url="https://example.com/broken.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Video only</title>
      <pubDate>Thu, 01 Jan 1970 00:20:00 +0000</pubDate>
      <enclosure url="https://example.com/clip.webm" type="video/webm"/>
    </item>
  </channel>
</rss>"#;

    const FEED_V2: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test Podcast: The Show!</title>
    <description>A test podcast</description>
    <item>
      <title>Ep2</title>
      <pubDate>Thu, 01 Jan 1970 00:33:20 +0000</pubDate>
      <enclosure url="https://example.com/ep2.mp3" type="audio/mpeg"/>
    </item>
    <item>
      <title>Ep1</title>
      <pubDate>Thu, 01 Jan 1970 00:16:40 +0000</pubDate>
      <enclosure url="https://cdn.example.com/ep1-moved.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn mimetypes() -> Vec<String> {
        Config::default().mimetypes
    }

    fn entry(title: Option<&str>, published: Option<i64>, links: &[(&str, Option<&str>)]) -> UpstreamEntry {
        UpstreamEntry {
            title: title.map(String::from),
            published,
            links: links
                .iter()
                .map(|(href, mime)| UpstreamLink {
                    href: href.to_string(),
                    mime_type: mime.map(String::from),
                })
                .collect(),
        }
    }

    #[test]
    fn extract_drops_entries_without_date() {
        let upstream = UpstreamFeed {
            title: None,
            entries: vec![entry(None, None, &[("https://example.com/a.mp3", Some("audio/mpeg"))])],
        };

        assert!(extract_episodes(&upstream, &mimetypes()).is_empty());
    }

    #[test]
    fn extract_filters_by_mime_type_and_keeps_multiplicity() {
        let upstream = UpstreamFeed {
            title: None,
            entries: vec![entry(
                Some("Ep1"),
                Some(1000),
                &[
                    ("https://example.com/ep1.mp3", Some("audio/mpeg")),
                    ("https://example.com/ep1.html", Some("text/html")),
                    ("https://example.com/ep1.ogg", Some("audio/ogg")),
                    ("https://example.com/ep1.bin", None),
                ],
            )],
        };

        let episodes = extract_episodes(&upstream, &mimetypes());

        let urls: Vec<_> = episodes.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, ["https://example.com/ep1.mp3", "https://example.com/ep1.ogg"]);
        assert!(episodes.iter().all(|e| e.title == "Ep1" && e.published == 1000));
        assert!(episodes.iter().all(|e| !e.downloaded && !e.listened));
    }

    #[test]
    fn extract_falls_back_to_link_for_title() {
        let upstream = UpstreamFeed {
            title: None,
            entries: vec![entry(None, Some(1000), &[("https://example.com/x.mp3", Some("audio/mpeg"))])],
        };

        let episodes = extract_episodes(&upstream, &mimetypes());
        assert_eq!(episodes[0].title, "https://example.com/x.mp3");
    }

    #[test]
    fn derive_shortname_from_title_or_url() {
        assert_eq!(
            derive_shortname(Some("Test Podcast: The Show!"), "https://example.com/feed"),
            Some("test-podcast-the-show".to_string())
        );
        assert_eq!(
            derive_shortname(None, "https://example.com/MyFeed"),
            Some("myfeed".to_string())
        );
        assert_eq!(derive_shortname(Some("!!!"), "https://example.com/feed"), None);
    }

    #[tokio::test]
    async fn import_creates_populated_feed() {
        let dir = tempdir().unwrap();
        let store = FeedStore::new(dir.path());
        let client = MockFeedClient::serving(FEED_V1);

        let feed = import_feed(
            &client,
            &store,
            &Config::default(),
            "https://example.com/feed.xml",
            None,
            &NoopReporter::shared(),
        )
        .await
        .unwrap();

        assert_eq!(feed.shortname, "test-podcast-the-show");
        assert_eq!(feed.title, "Test Podcast: The Show!");
        assert_eq!(feed.url, "https://example.com/feed.xml");
        assert_eq!(feed.episodes.len(), 1);
        assert_eq!(store.read("test-podcast-the-show").unwrap(), feed);
    }

    #[tokio::test]
    async fn import_conflicts_with_existing_shortname() {
        let dir = tempdir().unwrap();
        let store = FeedStore::new(dir.path());
        std::fs::create_dir(dir.path().join("taken")).unwrap();
        let client = MockFeedClient::serving(FEED_V1);

        let result = import_feed(
            &client,
            &store,
            &Config::default(),
            "https://example.com/feed.xml",
            Some("taken"),
            &NoopReporter::shared(),
        )
        .await;

        assert!(matches!(result, Err(PodfoxError::Store(StoreError::Conflict { .. }))));
    }

    #[tokio::test]
    async fn import_fetch_failure_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let store = FeedStore::new(dir.path());
        let client = MockFeedClient::serving(FEED_V1);
        client.set(None);

        let result = import_feed(
            &client,
            &store,
            &Config::default(),
            "https://example.com/feed.xml",
            Some("foo"),
            &NoopReporter::shared(),
        )
        .await;

        assert!(matches!(result, Err(PodfoxError::Feed(_))));
        assert!(!dir.path().join("foo").exists());
    }

    #[tokio::test]
    async fn synchronize_merges_without_duplicates() {
        let dir = tempdir().unwrap();
        let store = FeedStore::new(dir.path());
        let config = Config::default();
        let reporter = NoopReporter::shared();
        let client = MockFeedClient::serving(FEED_V1);

        let feed = import_feed(&client, &store, &config, "https://example.com/feed.xml", Some("show"), &reporter)
            .await
            .unwrap();

        client.set(Some(FEED_V2));
        let result = synchronize(&client, &store, &config, &feed, &reporter)
            .await
            .unwrap();

        assert_eq!(result.new_episodes, 1);
        let titles: Vec<_> = result.feed.episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Ep2", "Ep1"]);
        // Same (title, published) with a new URL is still the old episode
        assert_eq!(result.feed.episodes[1].url, "https://example.com/ep1.mp3");
        assert!(result.feed.is_sorted());
        assert_eq!(store.read("show").unwrap(), result.feed);
    }

    #[tokio::test]
    async fn synchronize_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FeedStore::new(dir.path());
        let config = Config::default();
        let reporter = NoopReporter::shared();
        let client = MockFeedClient::serving(FEED_V1);

        let feed = import_feed(&client, &store, &config, "https://example.com/feed.xml", Some("show"), &reporter)
            .await
            .unwrap();
        client.set(Some(FEED_V2));

        let first = synchronize(&client, &store, &config, &feed, &reporter).await.unwrap();
        let second = synchronize(&client, &store, &config, &first.feed, &reporter)
            .await
            .unwrap();

        assert_eq!(second.new_episodes, 0);
        assert_eq!(second.feed, first.feed);
    }

    #[tokio::test]
    async fn synchronize_failure_preserves_stored_state() {
        let dir = tempdir().unwrap();
        let store = FeedStore::new(dir.path());
        let config = Config::default();
        let reporter = NoopReporter::shared();
        let client = MockFeedClient::serving(FEED_V1);

        let feed = import_feed(&client, &store, &config, "https://example.com/feed.xml", Some("show"), &reporter)
            .await
            .unwrap();

        client.set(Some("<html>maintenance</html>"));
        let result = synchronize(&client, &store, &config, &feed, &reporter).await;

        assert!(matches!(result, Err(PodfoxError::Feed(_))));
        assert_eq!(store.read("show").unwrap(), feed);
    }

    #[tokio::test]
    async fn synchronize_all_reports_each_feed() {
        let dir = tempdir().unwrap();
        let store = FeedStore::new(dir.path());
        let config = Config::default();
        let reporter = NoopReporter::shared();
        let client = MockFeedClient::serving(FEED_V1);

        for shortname in ["one", "two"] {
            import_feed(&client, &store, &config, "https://example.com/feed.xml", Some(shortname), &reporter)
                .await
                .unwrap();
        }

        client.set(Some(FEED_V2));
        let results = synchronize_all(&client, &store, &config, &reporter).await.unwrap();

        assert_eq!(results.len(), 2);
        for (_, result) in results {
            assert_eq!(result.unwrap().new_episodes, 1);
        }
    }
}
