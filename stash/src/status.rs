use http::HeaderValue;

/// Outcome of a cache lookup for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// A live entry was found and served without calling the handler.
    Hit,
    /// No entry (or the store could not be used); the handler produced the response.
    #[default]
    Miss,
}

impl CacheStatus {
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }

    /// Value written to the cache status header.
    pub const fn header_value(&self) -> HeaderValue {
        match self {
            CacheStatus::Hit => HeaderValue::from_static("HIT"),
            CacheStatus::Miss => HeaderValue::from_static("MISS"),
        }
    }
}
