//! Read-only HTTP(S) source: HEAD for metadata, Range GET for chunks.
//!
//! Keys are absolute URLs. Uses libcurl on the blocking pool.

use async_trait::async_trait;
use std::path::Path;
use std::str;
use std::time::Duration;

use super::{clean_etag, ObjectMeta, ObjectStore, StoreError, StoreErrorKind, UploadedPart};
use crate::retry::{classify_curl_error, classify_http_status, ErrorKind};

/// Parsed response headers relevant to resumable downloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadInfo {
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
    pub etag: Option<String>,
}

/// Parse raw header lines. Later values win, so the final response after redirects counts.
pub fn parse_head_headers(lines: &[String]) -> HeadInfo {
    let mut info = HeadInfo::default();
    for line in lines {
        let line = line.trim();
        if line.starts_with("HTTP/") {
            // New response in a redirect chain.
            info = HeadInfo::default();
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("content-length") {
            info.content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            info.accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("etag") {
            info.etag = Some(clean_etag(value));
        }
    }
    info
}

#[derive(Debug, Clone)]
pub struct HttpSource {
    connect_timeout: Duration,
    /// Abort a chunk when throughput stays under 1 KiB/s for this long.
    low_speed_time: Duration,
}

impl Default for HttpSource {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            low_speed_time: Duration::from_secs(60),
        }
    }
}

impl HttpSource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn curl_err(e: curl::Error) -> StoreError {
    let kind = match classify_curl_error(&e) {
        ErrorKind::Timeout => StoreErrorKind::Timeout,
        ErrorKind::Connection => StoreErrorKind::Connection,
        _ => StoreErrorKind::Other,
    };
    StoreError::new(kind, e.to_string())
}

fn status_err(url: &str, code: u32) -> StoreError {
    let kind = match (code, classify_http_status(code)) {
        (404 | 410, _) => StoreErrorKind::NotFound,
        (_, ErrorKind::Throttled) => StoreErrorKind::Throttled,
        (_, ErrorKind::Http5xx(_)) => StoreErrorKind::Server,
        _ => StoreErrorKind::Other,
    };
    StoreError::new(kind, format!("{} returned HTTP {}", url, code))
}

/// Keys must be absolute `http` or `https` URLs.
fn checked_url(key: &str) -> Result<String, StoreError> {
    let url = url::Url::parse(key)
        .map_err(|e| StoreError::new(StoreErrorKind::Other, format!("bad url {}: {}", key, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url.into()),
        other => Err(StoreError::unsupported(&format!(
            "scheme {} is not http(s): {}",
            other, key
        ))),
    }
}

fn head_blocking(url: &str, connect_timeout: Duration) -> Result<ObjectMeta, StoreError> {
    let mut lines: Vec<String> = Vec::new();
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(curl_err)?;
    easy.nobody(true).map_err(curl_err)?;
    easy.follow_location(true).map_err(curl_err)?;
    easy.connect_timeout(connect_timeout).map_err(curl_err)?;
    easy.timeout(Duration::from_secs(30)).map_err(curl_err)?;
    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(curl_err)?;
        transfer.perform().map_err(curl_err)?;
    }
    let code = easy.response_code().map_err(curl_err)?;
    if !(200..300).contains(&code) {
        return Err(status_err(url, code));
    }
    let info = parse_head_headers(&lines);
    let size = info.content_length.ok_or_else(|| {
        StoreError::new(StoreErrorKind::Other, format!("{} sent no Content-Length", url))
    })?;
    if !info.accept_ranges && size > 0 {
        tracing::debug!(url, "server does not advertise byte ranges");
    }
    Ok(ObjectMeta {
        size,
        etag: info.etag,
        sha256: None,
    })
}

fn range_blocking(
    url: &str,
    start: u64,
    end: u64,
    src: &HttpSource,
) -> Result<Vec<u8>, StoreError> {
    let expected = end.saturating_sub(start);
    let mut body: Vec<u8> = Vec::with_capacity(expected as usize);
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(curl_err)?;
    easy.follow_location(true).map_err(curl_err)?;
    easy.connect_timeout(src.connect_timeout).map_err(curl_err)?;
    easy.low_speed_limit(1024).map_err(curl_err)?;
    easy.low_speed_time(src.low_speed_time).map_err(curl_err)?;
    easy.range(&format!("{}-{}", start, end.saturating_sub(1)))
        .map_err(curl_err)?;
    let mut overflowed = false;
    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                // Returning less than `data.len()` makes curl abort the transfer.
                if body.len() + data.len() > expected as usize {
                    overflowed = true;
                    return Ok(0);
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(curl_err)?;
        transfer.perform()
    };
    if overflowed {
        return Err(StoreError::new(
            StoreErrorKind::Other,
            format!("{} sent more than the {} bytes requested; Range ignored", url, expected),
        ));
    }
    performed.map_err(curl_err)?;
    let code = easy.response_code().map_err(curl_err)?;
    match code {
        206 => {}
        // A 200 is only acceptable when the "range" is the whole object.
        200 if start == 0 && body.len() as u64 == expected => {}
        200 => {
            return Err(StoreError::new(
                StoreErrorKind::Other,
                format!("{} ignored the Range header", url),
            ))
        }
        _ => return Err(status_err(url, code)),
    }
    if body.len() as u64 != expected {
        return Err(StoreError::new(
            StoreErrorKind::ShortRead,
            format!("expected {} bytes, got {}", expected, body.len()),
        ));
    }
    Ok(body)
}

async fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T, StoreError> + Send + 'static,
) -> Result<T, StoreError> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::new(StoreErrorKind::Other, format!("http task join: {}", e)))?
}

#[async_trait]
impl ObjectStore for HttpSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let url = checked_url(key)?;
        let timeout = self.connect_timeout;
        blocking(move || head_blocking(&url, timeout)).await
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Vec<u8>, StoreError> {
        let url = checked_url(key)?;
        let src = self.clone();
        blocking(move || range_blocking(&url, start, end, &src)).await
    }

    async fn put(&self, _key: &str, _file: &Path) -> Result<ObjectMeta, StoreError> {
        Err(StoreError::unsupported("http sources are read-only"))
    }

    async fn create_multipart(&self, _key: &str) -> Result<String, StoreError> {
        Err(StoreError::unsupported("http sources are read-only"))
    }

    async fn upload_part(
        &self,
        _key: &str,
        _upload_id: &str,
        _part_number: u32,
        _data: Vec<u8>,
    ) -> Result<String, StoreError> {
        Err(StoreError::unsupported("http sources are read-only"))
    }

    async fn list_parts(&self, _key: &str, _upload_id: &str) -> Result<Vec<UploadedPart>, StoreError> {
        Err(StoreError::unsupported("http sources are read-only"))
    }

    async fn complete_multipart(
        &self,
        _key: &str,
        _upload_id: &str,
        _parts: &[UploadedPart],
    ) -> Result<ObjectMeta, StoreError> {
        Err(StoreError::unsupported("http sources are read-only"))
    }

    async fn abort_multipart(&self, _key: &str, _upload_id: &str) -> Result<(), StoreError> {
        Err(StoreError::unsupported("http sources are read-only"))
    }
}
