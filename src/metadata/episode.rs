// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Deserializer, Serialize};

/// A single episode as persisted in a feed's metadata file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    /// Enclosure location
    pub url: String,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default)]
    pub listened: bool,
    /// Publish time in unix seconds
    #[serde(deserialize_with = "deserialize_unix_seconds")]
    pub published: i64,
    /// Name of the downloaded file inside the feed directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Episode {
    /// Create a fresh, not yet downloaded episode
    pub fn new(title: impl Into<String>, url: impl Into<String>, published: i64) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            downloaded: false,
            listened: false,
            published,
            filename: None,
        }
    }

    /// Episodes are identified by `(title, published)`, not by their URL
    pub fn is_same_episode(&self, other: &Episode) -> bool {
        self.title == other.title && self.published == other.published
    }

    /// Seconds elapsed between publication and `now`
    pub fn age_secs(&self, now: i64) -> i64 {
        now - self.published
    }

    /// Whether the episode is older than `max_age_days` at `now`
    pub fn is_older_than(&self, max_age_days: u64, now: i64) -> bool {
        let max_age_secs = i64::try_from(max_age_days)
            .unwrap_or(i64::MAX)
            .saturating_mul(SECONDS_PER_DAY);
        self.age_secs(now) > max_age_secs
    }

    pub(crate) fn mark_downloaded(&mut self, filename: String) {
        self.downloaded = true;
        self.filename = Some(filename);
    }

    pub(crate) fn clear_download(&mut self) {
        self.downloaded = false;
        self.filename = None;
    }
}

pub(crate) const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Accept both integer and fractional timestamps; older metadata files stored floats
fn deserialize_unix_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Ok(secs as i64)
}
