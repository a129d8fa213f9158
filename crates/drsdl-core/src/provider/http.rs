//! Shared HTTP helpers for the two cloud-dialect provider clients (§9: plain
//! functions, not a base class, so the dialects share behavior without
//! inheritance).

use super::{ProviderError, ProviderErrorKind};
use crate::openfd::OpenFdWatermark;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

pub fn classify_curl_error(e: &curl::Error) -> ProviderErrorKind {
    if e.is_operation_timedout()
        || e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return ProviderErrorKind::Transport;
    }
    ProviderErrorKind::Other
}

pub fn classify_http_status(code: u32, body: &str) -> ProviderErrorKind {
    if body.to_ascii_lowercase().contains("token has expired") {
        return ProviderErrorKind::SignatureExpired;
    }
    match code {
        401 => ProviderErrorKind::TokenExpired,
        403 => ProviderErrorKind::Forbidden,
        404 => ProviderErrorKind::NotFound,
        429 | 503 => ProviderErrorKind::Throttled,
        500..=599 => ProviderErrorKind::Http5xx(code as u16),
        _ => ProviderErrorKind::Other,
    }
}

/// Issues a GET with an optional bearer token, returning the parsed JSON body.
pub fn get_json(
    url: &str,
    bearer_token: Option<&str>,
    fd_watermark: &OpenFdWatermark,
) -> Result<serde_json::Value, ProviderError> {
    let _guard = fd_watermark.track_open();
    let mut easy = curl::easy::Easy::new();
    easy.url(url)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    easy.follow_location(true)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    easy.connect_timeout(Duration::from_secs(30))
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;

    if let Some(token) = bearer_token {
        let mut list = curl::easy::List::new();
        list.append(&format!("Authorization: Bearer {}", token))
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
        easy.http_headers(list)
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    }

    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
        transfer
            .perform()
            .map_err(|e| ProviderError::new(classify_curl_error(&e), e.to_string()))?;
    }

    let code = easy
        .response_code()
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    let body_str = String::from_utf8_lossy(&body);
    if !(200..300).contains(&code) {
        return Err(ProviderError::new(
            classify_http_status(code, &body_str),
            format!("HTTP {} from {}: {}", code, url, body_str),
        ));
    }

    serde_json::from_slice(&body)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, format!("invalid JSON from {}: {}", url, e)))
}

/// Streams a `Range: bytes=start-end` GET of `url` into
/// `<dest_dir>/<part_filename>`, returning the full path on success.
pub fn fetch_range_to_file(
    url: &str,
    start: u64,
    end: u64,
    dest_dir: &Path,
    part_filename: &str,
    fd_watermark: &OpenFdWatermark,
) -> Result<std::path::PathBuf, ProviderError> {
    let dest_path = dest_dir.join(part_filename);
    let file = std::fs::File::create(&dest_path)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, format!("create {}: {}", dest_path.display(), e)))?;
    let _guard = fd_watermark.track_open();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    easy.follow_location(true)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    easy.range(&format!("{}-{}", start, end))
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    easy.connect_timeout(Duration::from_secs(30))
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    easy.low_speed_limit(1024)
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    easy.low_speed_time(Duration::from_secs(60))
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;

    let mut writer = std::io::BufWriter::new(file);
    let mut body_for_error = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                if writer.write_all(data).is_err() {
                    return Ok(0);
                }
                if body_for_error.len() < 4096 {
                    body_for_error.extend_from_slice(data);
                }
                Ok(data.len())
            })
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
        transfer
            .perform()
            .map_err(|e| ProviderError::new(classify_curl_error(&e), e.to_string()))?;
    }

    let code = easy
        .response_code()
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, e.to_string()))?;
    if !(200..300).contains(&code) {
        let body_str = String::from_utf8_lossy(&body_for_error);
        let _ = std::fs::remove_file(&dest_path);
        return Err(ProviderError::new(
            classify_http_status(code, &body_str),
            format!("HTTP {} fetching range {}-{}: {}", code, start, end, body_str),
        ));
    }

    Ok(dest_path)
}
