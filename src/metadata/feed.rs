// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use super::episode::Episode;

/// A subscribed feed as persisted in `<podcast-directory>/<shortname>/feed.json`
///
/// Episodes are kept sorted by `published`, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub shortname: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Feed {
    pub fn new(
        shortname: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            shortname: shortname.into(),
            title: title.into(),
            url: url.into(),
            episodes: Vec::new(),
        }
    }

    /// Re-establish newest-first ordering
    pub fn sort_episodes(&mut self) {
        // Stable, so episodes sharing a timestamp keep their relative order
        self.episodes.sort_by(|a, b| b.published.cmp(&a.published));
    }

    pub fn is_sorted(&self) -> bool {
        self.episodes
            .windows(2)
            .all(|pair| pair[0].published >= pair[1].published)
    }

    /// Compute a new snapshot containing every episode of `self` plus each
    /// incoming episode not already known by `(title, published)`.
    ///
    /// Incoming episodes are only compared against the episodes `self` already
    /// holds, so several enclosures of one upstream entry are all kept.
    /// Returns the merged feed and the number of episodes added.
    pub fn merged_with(&self, incoming: Vec<Episode>) -> (Feed, usize) {
        let mut merged = self.clone();
        let mut added = 0;

        for episode in incoming {
            if self.episodes.iter().any(|known| known.is_same_episode(&episode)) {
                continue;
            }
            merged.episodes.push(episode);
            added += 1;
        }

        merged.sort_episodes();
        (merged, added)
    }

    /// Copy of this feed with every download flag and filename cleared
    pub fn reset(&self) -> Feed {
        let mut reset = self.clone();
        reset.episodes.iter_mut().for_each(Episode::clear_download);
        reset
    }

    pub fn downloaded_count(&self) -> usize {
        self.episodes.iter().filter(|e| e.downloaded).count()
    }

    /// Whether the most recent episode has not been downloaded yet
    pub fn has_new_episode(&self) -> bool {
        self.episodes.first().is_some_and(|e| !e.downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_with(episodes: Vec<Episode>) -> Feed {
        let mut feed = Feed::new("test", "Test Feed", "https://example.com/feed.xml");
        feed.episodes = episodes;
        feed.sort_episodes();
        feed
    }

    #[test]
    fn merge_skips_episodes_with_known_title_and_date() {
        let feed = feed_with(vec![Episode::new("Ep1", "https://example.com/ep1.mp3", 1000)]);

        let (merged, added) = feed.merged_with(vec![Episode::new(
            "Ep1",
            "https://mirror.example.com/ep1.mp3",
            1000,
        )]);

        assert_eq!(added, 0);
        assert_eq!(merged.episodes.len(), 1);
        assert_eq!(merged.episodes[0].url, "https://example.com/ep1.mp3");
    }

    #[test]
    fn merge_adds_new_episodes_and_sorts_newest_first() {
        let feed = feed_with(vec![Episode::new("Ep2", "https://example.com/ep2.mp3", 2000)]);

        let (merged, added) = feed.merged_with(vec![
            Episode::new("Ep1", "https://example.com/ep1.mp3", 1000),
            Episode::new("Ep3", "https://example.com/ep3.mp3", 3000),
        ]);

        assert_eq!(added, 2);
        let titles: Vec<_> = merged.episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Ep3", "Ep2", "Ep1"]);
        assert!(merged.is_sorted());
    }

    #[test]
    fn merge_leaves_original_snapshot_untouched() {
        let feed = feed_with(vec![Episode::new("Ep1", "https://example.com/ep1.mp3", 1000)]);
        let before = feed.clone();

        let _ = feed.merged_with(vec![Episode::new("Ep2", "https://example.com/ep2.mp3", 2000)]);

        assert_eq!(feed, before);
    }

    #[test]
    fn merge_keeps_every_enclosure_of_a_new_entry() {
        let feed = feed_with(vec![]);
        let incoming = vec![
            Episode::new("Ep1", "https://example.com/a.mp3", 1000),
            Episode::new("Ep1", "https://example.com/a.ogg", 1000),
        ];

        let (merged, added) = feed.merged_with(incoming.clone());
        assert_eq!(added, 2);
        assert_eq!(merged.episodes.len(), 2);

        let (again, added_again) = merged.merged_with(incoming);
        assert_eq!(added_again, 0);
        assert_eq!(again, merged);
    }

    #[test]
    fn reset_clears_download_state() {
        let mut episode = Episode::new("Ep1", "https://example.com/ep1.mp3", 1000);
        episode.mark_downloaded("ep1.mp3".to_string());
        let feed = feed_with(vec![episode]);

        let reset = feed.reset();

        assert_eq!(reset.downloaded_count(), 0);
        assert!(reset.episodes[0].filename.is_none());
        assert!(reset.has_new_episode());
    }
}
