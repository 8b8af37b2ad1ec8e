// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

use crate::store::is_reserved_filename;

/// Pick the on-disk name for a downloaded enclosure
///
/// The `filename` parameter of a Content-Disposition header wins; otherwise
/// the last path segment of the URL is used with query and fragment removed.
/// The result is sanitized so it always names a file directly inside the
/// feed directory, and names the store reserves for itself are refused.
/// Returns `None` when nothing usable remains.
pub fn resolve_filename(content_disposition: Option<&str>, url: &str) -> Option<String> {
    content_disposition
        .and_then(parse_content_disposition)
        .and_then(|name| sanitize(&name))
        .or_else(|| filename_from_url(url).and_then(|name| sanitize(&name)))
}

/// Extract the `filename` parameter from a Content-Disposition header
///
/// Handles both `attachment; filename="ep1.mp3"` and `attachment; filename=ep1.mp3`.
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let params = header.split(';').skip(1);

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("filename") {
            continue;
        }

        let value = value.trim();
        let value = match value.strip_prefix('"') {
            Some(quoted) => quoted.split('"').next().unwrap_or_default(),
            None => value,
        };
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    None
}

/// Last path segment of a URL, without query string or fragment
pub fn filename_from_url(url: &str) -> Option<String> {
    let segment = match Url::parse(url.trim()) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(String::from),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .map(String::from),
    };

    segment.filter(|s| !s.is_empty())
}

fn sanitize(name: &str) -> Option<String> {
    let sanitized = sanitize_filename::sanitize(name);
    Some(sanitized).filter(|s| !s.is_empty() && !s.starts_with('.') && !is_reserved_filename(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_header_wins() {
        assert_eq!(
            resolve_filename(
                Some(r#"attachment; filename="ep1.mp3""#),
                "https://cdn.example.com/track/123?token=x"
            ),
            Some("ep1.mp3".to_string())
        );
    }

    #[test]
    fn url_segment_without_query_is_the_fallback() {
        assert_eq!(
            resolve_filename(None, "https://example.com/media/ep5.mp3?token=x"),
            Some("ep5.mp3".to_string())
        );
    }

    #[test]
    fn disposition_without_filename_falls_back_to_url() {
        assert_eq!(
            resolve_filename(Some("inline"), "https://example.com/ep6.ogg"),
            Some("ep6.ogg".to_string())
        );
    }

    #[test]
    fn parses_unquoted_and_case_insensitive_parameters() {
        assert_eq!(
            parse_content_disposition("attachment; FileName=show.m4a; size=10"),
            Some("show.m4a".to_string())
        );
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="with space.mp3"; x=y"#),
            Some("with space.mp3".to_string())
        );
        assert_eq!(parse_content_disposition("attachment"), None);
    }

    #[test]
    fn hostile_names_stay_inside_the_feed_directory() {
        let name = resolve_filename(
            Some(r#"attachment; filename="../../etc/passwd""#),
            "https://example.com/ep.mp3",
        )
        .unwrap();
        assert!(!name.contains('/'));
        assert!(!name.starts_with('.'));
    }

    #[test]
    fn metadata_filename_is_never_used_for_media() {
        assert_eq!(
            resolve_filename(Some(r#"attachment; filename="feed.json""#), "https://example.com/ep3.mp3"),
            Some("ep3.mp3".to_string())
        );
        assert_eq!(
            resolve_filename(Some(r#"attachment; filename="FEED.JSON""#), "https://example.com/ep3.mp3"),
            Some("ep3.mp3".to_string())
        );
        assert_eq!(resolve_filename(None, "https://example.com/feed.json"), None);
    }

    #[test]
    fn partial_suffix_is_never_used_for_media() {
        assert_eq!(
            resolve_filename(
                Some(r#"attachment; filename="ep.mp3.partial""#),
                "https://example.com/ep4.mp3"
            ),
            Some("ep4.mp3".to_string())
        );
        assert_eq!(resolve_filename(None, "https://example.com/media/ep4.mp3.partial?x=1"), None);
    }

    #[test]
    fn url_without_path_segment_yields_none() {
        assert_eq!(resolve_filename(None, "https://example.com/"), None);
    }

    #[test]
    fn unparsable_urls_use_plain_splitting() {
        assert_eq!(
            filename_from_url("media/ep7.mp3?x=1#t=10"),
            Some("ep7.mp3".to_string())
        );
    }
}
