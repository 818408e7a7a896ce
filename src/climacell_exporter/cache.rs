// climacell_exporter - Prometheus metrics exporter for the ClimaCell weather API
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::client::{ClientError, FieldSet, Location, RealtimeResponse, Upstream};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Kind of query a cached response was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    Realtime,
}

impl QueryShape {
    fn marker(self) -> &'static str {
        match self {
            Self::Realtime => "now",
        }
    }
}

/// Key for a cached response, derived from coordinates and the kind of query.
///
/// City and location labels are never part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(location: &Location, shape: QueryShape) -> Self {
        CacheKey(format!(
            "forecast-{}-{}-{}",
            location.latitude,
            location.longitude,
            shape.marker()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct CacheEntry {
    response: Arc<RealtimeResponse>,
    inserted: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted) < ttl
    }
}

/// Upstream client wrapper that reuses successful responses for a fixed TTL.
///
/// Expired entries are ignored on lookup and replaced on the next successful
/// fetch; `sweep` (or the janitor task) reclaims their memory. Failed fetches are
/// never cached.
///
/// Concurrent misses for the same key are not coalesced: each one makes its own
/// upstream call. Callers that need at most one request in flight for a key must
/// serialize their calls, as `ScrapeCoordinator` does.
#[derive(Debug)]
pub struct CachingClient<U> {
    upstream: U,
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl<U> CachingClient<U>
where
    U: Upstream,
{
    /// Create a new caching client.
    ///
    /// # Panics
    ///
    /// If `ttl` is zero.
    pub fn new(upstream: U, ttl: Duration) -> Self {
        assert!(!ttl.is_zero(), "cache TTL must be greater than zero");

        CachingClient {
            upstream,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Get realtime conditions for a location, from the cache if a fresh response exists.
    pub async fn fetch(&self, location: &Location, fields: &FieldSet) -> Result<Arc<RealtimeResponse>, ClientError> {
        let key = CacheKey::new(location, QueryShape::Realtime);
        if let Some(response) = self.lookup(&key).await {
            tracing::debug!(message = "using cached realtime weather", key = %key);
            return Ok(response);
        }

        tracing::info!(
            message = "fetching realtime weather",
            latitude = location.latitude,
            longitude = location.longitude,
        );

        let response = Arc::new(self.upstream.realtime(location, fields).await?);
        self.entries.write().await.insert(
            key,
            CacheEntry {
                response: response.clone(),
                inserted: Instant::now(),
            },
        );

        Ok(response)
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Arc<RealtimeResponse>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| e.is_fresh(now, self.ttl))
            .map(|e| e.response.clone())
    }

    /// Remove all expired entries, returning the number removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_fresh(now, self.ttl));
        before - entries.len()
    }

    /// Number of entries that have not yet expired.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_fresh(now, self.ttl)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<U> CachingClient<U>
where
    U: Upstream + 'static,
{
    /// Periodically remove expired entries in a background task.
    pub fn spawn_janitor(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut interval = tokio::time::interval(every);

        tokio::spawn(async move {
            loop {
                let _ = interval.tick().await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    tracing::debug!(message = "removed expired cache entries", removed = removed);
                }
            }
        })
    }
}
