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

use crate::cache::CachingClient;
use crate::client::{Location, Upstream};
use crate::metrics::{Exposition, Layers, LocationLabels, MetricRegistry};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorOptions {
    pub location: Location,
    pub layers: Layers,
}

/// Fetches conditions and turns them into metrics each time metrics are scraped.
///
/// Only one scrape runs at a time. Concurrent scrapes wait for the one in progress
/// to finish, at which point they will usually be answered from the cache.
#[derive(Debug)]
pub struct ScrapeCoordinator<U> {
    options: CollectorOptions,
    labels: LocationLabels,
    fetcher: Arc<CachingClient<U>>,
    metrics: MetricRegistry,
    scrape_lock: Mutex<()>,
}

impl<U> ScrapeCoordinator<U>
where
    U: Upstream,
{
    pub fn new(fetcher: Arc<CachingClient<U>>, options: CollectorOptions) -> Self {
        let labels = LocationLabels::from(&options.location);
        let metrics = MetricRegistry::new(options.layers);

        ScrapeCoordinator {
            options,
            labels,
            fetcher,
            metrics,
            scrape_lock: Mutex::new(()),
        }
    }

    pub fn metrics(&self) -> &MetricRegistry {
        &self.metrics
    }

    /// Descriptions of all enabled quantities without fetching anything.
    pub fn describe(&self) -> Exposition {
        let mut out = Exposition::new();
        self.metrics.describe(&mut out);
        out
    }

    /// Fetch current conditions (possibly cached) and emit a value for each enabled
    /// quantity present in the response.
    ///
    /// A failed fetch is logged and results in an exposition with descriptions but
    /// no values. Values set by earlier scrapes are left as they were.
    pub async fn scrape(&self) -> Exposition {
        let _guard = self.scrape_lock.lock().await;
        let mut out = self.describe();

        let fields = self.options.layers.field_set();
        if fields.is_empty() {
            tracing::debug!(message = "no layers enabled, skipping fetch");
            return out;
        }

        let response = match self
            .fetcher
            .fetch(&self.options.location, &fields)
            .instrument(tracing::debug_span!("climacell_realtime"))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    message = "failed to fetch realtime weather",
                    city = %self.options.location.city,
                    error = %e,
                );
                return out;
            }
        };

        for quantity in self.metrics.quantities() {
            let observation = response.observation(quantity.field);
            self.metrics.set_and_emit(quantity, &self.labels, observation, &mut out);
        }

        tracing::debug!(message = "collected realtime weather", samples = out.samples().len());
        out
    }
}
