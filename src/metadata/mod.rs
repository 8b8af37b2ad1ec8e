mod episode;
mod feed;

pub use episode::Episode;
pub use feed::Feed;

#[cfg(test)]
pub(crate) use episode::SECONDS_PER_DAY;
