mod fetch;
mod parse;

pub use fetch::{fetch_feed, is_url};
pub use parse::{UpstreamEntry, UpstreamFeed, UpstreamLink, parse_document, parse_pub_date};
