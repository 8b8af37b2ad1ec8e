pub mod config;
pub mod download;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod metadata;
pub mod progress;
pub mod prune;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use config::Config;
pub use download::{DownloadOptions, download_all, download_feed, select_for_download};
pub use episode::{DownloadResult, resolve_filename};
pub use error::{
    ConfigError, DownloadError, ErrorKind, FeedError, PodfoxError, PruneError, StoreError,
};
pub use feed::{UpstreamEntry, UpstreamFeed, UpstreamLink, fetch_feed, is_url, parse_document};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use metadata::{Episode, Feed};
pub use progress::{
    BatchKind, BatchReport, FeedOutcome, FeedResults, NoopReporter, ProgressEvent,
    ProgressReporter, SharedProgressReporter,
};
pub use prune::{prune_all, prune_feed};
pub use store::FeedStore;
pub use sync::{SyncResult, import_feed, synchronize, synchronize_all};
