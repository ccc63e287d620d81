//! Cached value for the `Date` response header.
//!
//! Formatting an HTTP date on every response is wasteful under load, so the formatted
//! value is kept in an [`ArcSwap`] and refreshed at most once per [`REFRESH_INTERVAL`].
//! The refresh happens lazily on read; no background task is needed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bytes::Bytes;
use http::HeaderValue;
use once_cell::sync::Lazy;

const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

static DATE_CACHE: Lazy<DateCache> = Lazy::new(DateCache::new);

struct Snapshot {
    taken_at: Instant,
    value: HeaderValue,
}

pub(crate) struct DateCache {
    current: ArcSwap<Snapshot>,
}

impl DateCache {
    fn new() -> Self {
        Self { current: ArcSwap::from_pointee(Snapshot::now()) }
    }

    /// Returns the value for the `Date` header, refreshing the cached one when it is stale.
    pub(crate) fn http_date() -> HeaderValue {
        let cache = &*DATE_CACHE;
        let snapshot = cache.current.load();
        if snapshot.taken_at.elapsed() < REFRESH_INTERVAL {
            return snapshot.value.clone();
        }

        let fresh = Arc::new(Snapshot::now());
        let value = fresh.value.clone();
        cache.current.store(fresh);
        value
    }
}

impl Snapshot {
    fn now() -> Self {
        let mut buf = faf_http_date::get_date_buff_no_key();
        faf_http_date::get_date_no_key(&mut buf);
        let value = HeaderValue::from_maybe_shared(Bytes::from_owner(buf))
            .unwrap_or_else(|_| HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"));
        Self { taken_at: Instant::now(), value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_imf_fixdate() {
        let value = DateCache::http_date();
        let text = value.to_str().unwrap();
        assert_eq!(text.len(), 29);
        assert!(text.ends_with(" GMT"));
    }
}
