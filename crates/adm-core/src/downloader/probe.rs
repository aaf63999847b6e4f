//! HTTP HEAD probing (spec.md §4.3 "Probe").
//!
//! Adapted near-verbatim from `ddm_core::fetch_head`: issues a HEAD with
//! redirect following and reports whether the origin advertises range
//! support and a `Content-Length`. A probe error is never fatal on its own
//! — the caller falls back to single-stream (spec.md §4.3).

use std::str;
use std::time::Duration;

/// Key headers needed to decide between chunked and single-stream download.
#[derive(Debug, Clone, Default)]
pub struct HeadResult {
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
}

impl HeadResult {
    /// True when the origin supports range requests with a known, positive
    /// length (spec.md §4.3: "Success requires a 2xx response carrying
    /// `Accept-Ranges: bytes` and a positive `Content-Length`").
    pub fn supports_chunked(&self) -> bool {
        self.accept_ranges && self.content_length.is_some_and(|n| n > 0)
    }
}

/// Performs a blocking HEAD request. Intended to be called from
/// `spawn_blocking`.
pub fn probe(url: &str) -> anyhow::Result<HeadResult> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.nobody(true)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }

    Ok(parse_headers(&headers))
}

fn parse_headers(lines: &[String]) -> HeadResult {
    let mut result = HeadResult::default();
    for line in lines {
        let line = line.trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(n) = value.parse::<u64>() {
                result.content_length = Some(n);
            }
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            result.accept_ranges = value.eq_ignore_ascii_case("bytes");
        }
    }
    result
}

/// Determines the total size of `url` for the `create` size pre-flight
/// (spec.md §6 "Size pre-flight"). Tries the HEAD `Content-Length` first;
/// if it is absent or zero, issues a `Range: bytes=0-0` GET and parses the
/// total out of `Content-Range: bytes 0-0/<N>`. Returns `None` if neither
/// reveals a size. Intended to be called from `spawn_blocking`.
pub fn probe_total_size(url: &str) -> anyhow::Result<Option<u64>> {
    let head = probe(url)?;
    if let Some(n) = head.content_length.filter(|n| *n > 0) {
        return Ok(Some(n));
    }
    probe_range_total(url)
}

fn probe_range_total(url: &str) -> anyhow::Result<Option<u64>> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.range("0-0")?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                headers.push(s.trim_end().to_string());
            }
            true
        })?;
        // A 0-0 ranged GET still transfers up to one byte of body; discard it.
        transfer.write_function(|data| Ok(data.len()))?;
        transfer.perform()?;
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        anyhow::bail!("ranged GET {} returned HTTP {}", url, code);
    }

    Ok(parse_content_range_total(&headers))
}

fn parse_content_range_total(lines: &[String]) -> Option<u64> {
    for line in lines {
        let line = line.trim();
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("content-range") {
            continue;
        }
        // `bytes 0-0/12345`
        let value = value.trim();
        let total = value.rsplit_once('/')?.1.trim();
        if total == "*" {
            return None;
        }
        return total.parse::<u64>().ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_length_and_accept_ranges() {
        let lines = vec![
            "HTTP/1.1 200 OK".to_string(),
            "Content-Length: 12345".to_string(),
            "Accept-Ranges: bytes".to_string(),
        ];
        let r = parse_headers(&lines);
        assert_eq!(r.content_length, Some(12345));
        assert!(r.accept_ranges);
        assert!(r.supports_chunked());
    }

    #[test]
    fn missing_accept_ranges_does_not_support_chunked() {
        let lines = vec!["Content-Length: 999".to_string()];
        let r = parse_headers(&lines);
        assert!(!r.supports_chunked());
    }

    #[test]
    fn zero_content_length_does_not_support_chunked() {
        let lines = vec![
            "Content-Length: 0".to_string(),
            "Accept-Ranges: bytes".to_string(),
        ];
        let r = parse_headers(&lines);
        assert!(!r.supports_chunked());
    }

    #[test]
    fn accept_ranges_none_is_not_bytes() {
        let lines = vec!["Accept-Ranges: none".to_string()];
        let r = parse_headers(&lines);
        assert!(!r.accept_ranges);
    }

    #[test]
    fn parses_content_range_total() {
        let lines = vec!["Content-Range: bytes 0-0/987654".to_string()];
        assert_eq!(parse_content_range_total(&lines), Some(987654));
    }

    #[test]
    fn unknown_content_range_total_is_none() {
        let lines = vec!["Content-Range: bytes 0-0/*".to_string()];
        assert_eq!(parse_content_range_total(&lines), None);
    }

    #[test]
    fn missing_content_range_is_none() {
        let lines = vec!["Content-Length: 10".to_string()];
        assert_eq!(parse_content_range_total(&lines), None);
    }
}
