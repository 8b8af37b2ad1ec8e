mod download;
mod filename;

pub use download::{DownloadContext, DownloadResult, download_episode};
pub use filename::{filename_from_url, parse_content_disposition, resolve_filename};
