//! Cached per-country AED counts.
//!
//! Counting by country code walks the GIN index, which is too slow to
//! repeat for every tile at low zoom. Counts are cached per process for
//! up to an hour; the ingest tasks flush the cache after every
//! country-code reassignment, so staleness is bounded by the TTL on
//! replicas and by the flush on the primary.

use std::time::Duration;

use switchy_database::Database;

use crate::{DbError, aed};

/// Maximum cached country codes.
const MAX_ENTRIES: u64 = 1024;

/// Entry lifetime.
const TTL: Duration = Duration::from_secs(3600);

/// A process-local TTL cache over [`aed::count_by_country_code`].
pub struct CountCache {
    cache: moka::sync::Cache<String, u64>,
}

impl Default for CountCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CountCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: moka::sync::Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(TTL)
                .build(),
        }
    }

    /// Returns the AED count for a country code, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the underlying count query fails.
    pub async fn count_by_country_code(
        &self,
        db: &dyn Database,
        code: &str,
    ) -> Result<u64, DbError> {
        if let Some(count) = self.cache.get(code) {
            return Ok(count);
        }

        let count = aed::count_by_country_code(db, code).await?;
        self.cache.insert(code.to_string(), count);
        Ok(count)
    }

    /// Drops every cached count. Called after country-code
    /// reassignment so fresh counts become visible immediately.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
