//! `Cache-Control` header construction.

use std::time::Duration;

/// Builds a deterministic `Cache-Control` value for a response class.
///
/// Every cacheable response is public, carries a stale window for
/// CDN-side revalidation, and forbids transformations so binary tiles
/// survive intermediaries untouched.
#[must_use]
pub fn cache_control(max_age: Duration, stale: Duration) -> String {
    format!(
        "public, max-age={}, stale-while-revalidate={}, no-transform",
        max_age.as_secs(),
        stale.as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_all_directives() {
        let header = cache_control(Duration::from_secs(60), Duration::from_secs(300));
        assert_eq!(
            header,
            "public, max-age=60, stale-while-revalidate=300, no-transform"
        );
    }

    #[test]
    fn zero_stale_is_explicit() {
        let header = cache_control(Duration::from_secs(3600), Duration::ZERO);
        assert!(header.contains("stale-while-revalidate=0"));
    }
}
