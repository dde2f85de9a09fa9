use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use axum::http::response::Builder;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use httpdate::{fmt_http_date, parse_http_date};

use crate::constants::MEME_CACHE_CONTROL;

/// Cache headers derived from a generated meme's file metadata.
#[derive(Clone, Debug)]
pub(crate) struct MemeCacheHeaders {
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
    modified_at: Option<SystemTime>,
}

impl MemeCacheHeaders {
    /// Builds cache headers from filesystem metadata.
    pub(crate) fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified_at = metadata.modified().ok();
        let etag = weak_etag(metadata.len(), modified_at);
        let last_modified =
            modified_at.and_then(|modified| HeaderValue::from_str(&fmt_http_date(modified)).ok());
        Self {
            etag,
            last_modified,
            modified_at,
        }
    }

    /// Applies cache headers to a response builder.
    pub(crate) fn apply(&self, mut builder: Builder) -> Builder {
        builder = builder.header(CACHE_CONTROL, MEME_CACHE_CONTROL);
        if let Some(etag) = &self.etag {
            builder = builder.header(ETAG, etag.clone());
        }
        if let Some(last_modified) = &self.last_modified {
            builder = builder.header(LAST_MODIFIED, last_modified.clone());
        }
        builder
    }

    /// Returns true when the request's conditional headers match the file.
    pub(crate) fn not_modified(&self, headers: &HeaderMap) -> bool {
        if let Some(if_none_match) = headers.get(IF_NONE_MATCH) {
            let Ok(candidates) = if_none_match.to_str() else {
                return false;
            };
            if candidates.trim() == "*" {
                return true;
            }
            let Some(etag) = self.etag.as_ref().and_then(|value| value.to_str().ok()) else {
                return false;
            };
            return candidates
                .split(',')
                .any(|candidate| candidate.trim() == etag);
        }

        if let (Some(if_modified_since), Some(modified_at)) =
            (headers.get(IF_MODIFIED_SINCE), self.modified_at)
            && let Ok(value) = if_modified_since.to_str()
            && let Ok(since) = parse_http_date(value)
            && modified_at <= since
        {
            return true;
        }

        false
    }

    /// Builds a 304 response that preserves the cache headers.
    pub(crate) fn not_modified_response(&self) -> Result<Response, StatusCode> {
        let builder = self.apply(Response::builder().status(StatusCode::NOT_MODIFIED));
        builder
            .body(Body::empty())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn weak_etag(size: u64, modified_at: Option<SystemTime>) -> Option<HeaderValue> {
    let suffix = modified_at
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs().to_string())
        .unwrap_or_else(|| "0".to_string());
    HeaderValue::from_str(&format!("W/\"{}-{}\"", size, suffix)).ok()
}
