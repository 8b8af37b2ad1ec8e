// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::DateTime;

use crate::error::FeedError;

/// An upstream feed document reduced to what synchronization needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpstreamFeed {
    pub title: Option<String>,
    pub entries: Vec<UpstreamEntry>,
}

/// One entry of an upstream document
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEntry {
    pub title: Option<String>,
    /// Publish time in unix seconds; `None` when missing or unparsable
    pub published: Option<i64>,
    pub links: Vec<UpstreamLink>,
}

/// A link attached to an entry, with its declared media type
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamLink {
    pub href: String,
    pub mime_type: Option<String>,
}

/// Parse an RSS document, falling back to Atom for documents RSS rejects
pub fn parse_document(bytes: &[u8]) -> Result<UpstreamFeed, FeedError> {
    match rss::Channel::read_from(bytes) {
        Ok(channel) => Ok(from_rss(&channel)),
        Err(rss_error) => match feed_rs::parser::parse(bytes) {
            Ok(feed) => Ok(from_atom(feed)),
            Err(atom_error) => {
                tracing::debug!(%atom_error, "document is neither RSS nor Atom");
                Err(FeedError::ParseFailed(rss_error))
            }
        },
    }
}

/// Parse an Internet-message (RFC 2822) date into unix seconds
pub fn parse_pub_date(date_str: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(date_str.trim())
        .ok()
        .map(|dt| dt.timestamp())
}

fn from_rss(channel: &rss::Channel) -> UpstreamFeed {
    let entries = channel
        .items()
        .iter()
        .map(|item| UpstreamEntry {
            title: non_empty(item.title()),
            published: item.pub_date().and_then(parse_pub_date),
            links: rss_links(item),
        })
        .collect();

    UpstreamFeed {
        title: non_empty(Some(channel.title())),
        entries,
    }
}

/// Extension elements that may carry additional media links: (prefix, element, url attribute)
const LINK_EXTENSIONS: &[(&str, &str, &str)] = &[("atom", "link", "href"), ("media", "content", "url")];

/// The enclosure plus any `atom:link` and `media:content` elements of an item
fn rss_links(item: &rss::Item) -> Vec<UpstreamLink> {
    let mut links = Vec::new();

    if let Some(enclosure) = item.enclosure() {
        links.push(UpstreamLink {
            href: enclosure.url().trim().to_string(),
            mime_type: non_empty(Some(enclosure.mime_type())),
        });
    }

    for (prefix, element, url_attr) in LINK_EXTENSIONS {
        let extensions = item
            .extensions()
            .get(*prefix)
            .and_then(|elements| elements.get(*element))
            .into_iter()
            .flatten();

        for extension in extensions {
            let attrs = extension.attrs();
            let Some(href) = attrs.get(*url_attr).map(|h| h.trim()) else {
                continue;
            };
            if href.is_empty() || links.iter().any(|known| known.href == href) {
                continue;
            }
            links.push(UpstreamLink {
                href: href.to_string(),
                mime_type: non_empty(attrs.get("type").map(String::as_str)),
            });
        }
    }

    links
}

fn from_atom(feed: feed_rs::model::Feed) -> UpstreamFeed {
    let entries = feed
        .entries
        .into_iter()
        .map(|entry| UpstreamEntry {
            title: entry.title.map(|t| t.content).filter(|t| !t.is_empty()),
            published: entry.published.map(|dt| dt.timestamp()),
            links: entry
                .links
                .into_iter()
                .map(|link| UpstreamLink {
                    href: link.href,
                    mime_type: link.media_type,
                })
                .collect(),
        })
        .collect();

    UpstreamFeed {
        title: feed.title.map(|t| t.content).filter(|t| !t.is_empty()),
        entries,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
