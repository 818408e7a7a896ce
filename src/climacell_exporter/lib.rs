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

//! Prometheus metrics exporter for the ClimaCell weather API
//!
//! ## Features
//!
//! `climacell_exporter` fetches realtime weather and air quality conditions for a city using the
//! [ClimaCell API] and emits them as Prometheus metrics. Conditions are fetched when Prometheus
//! scrapes the exporter, and responses are cached for a configurable amount of time to stay
//! within the rate limits of the API. The following metrics are emitted when available (not all
//! fields are available for all locations). Each has `latitude`, `longitude`, `city`, and
//! `location_name` labels.
//!
//! Weather layer (enabled by default):
//!
//! * `climacell_weather_baro_pressure` - Barometric pressure (at surface).
//! * `climacell_weather_cloud_base` - Lowest level of perceptible cloud particles.
//! * `climacell_weather_cloud_ceiling` - Height of the lowest layer of clouds covering more than half the sky.
//! * `climacell_weather_cloud_cover` - Fraction of the sky obscured by clouds.
//! * `climacell_weather_dewpoint` - Temperature of the dew point.
//! * `climacell_weather_feels_like` - Wind chill and heat window based on season.
//! * `climacell_weather_humidity` - Relative humidity (0-100).
//! * `climacell_weather_precipitation` - Precipitation intensity.
//! * `climacell_weather_surface_shortwave_radiation` - Solar radiation reaching the surface.
//! * `climacell_weather_temp` - Temperature.
//! * `climacell_weather_visibility` - Visibility distance.
//! * `climacell_weather_wind_direction` - Wind direction in degrees, 0 is North.
//! * `climacell_weather_wind_gust` - Wind gust speed.
//! * `climacell_weather_wind_speed` - Wind speed.
//!
//! Air quality layer (disabled by default):
//!
//! * `climacell_aq_china_aqi` - Air quality index per China MEP standard.
//! * `climacell_aq_epa_aqi` - Air quality index per US EPA standard.
//! * `climacell_aq_co`, `climacell_aq_no2`, `climacell_aq_o3`, `climacell_aq_so2` - Gas concentrations.
//! * `climacell_aq_pm10`, `climacell_aq_pm25` - Particulate matter.
//!
//! A metric is omitted from a scrape entirely when the API doesn't return a value for it.
//!
//! [ClimaCell API]: https://www.climacell.co/weather-api
//!
//! ## Build
//!
//! `climacell_exporter` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! The exporter needs an API key, a city, and a name for the location. The city is resolved to
//! coordinates once at startup using OpenStreetMap. All options can also be set using
//! environment variables with a `CLIMACELL_` prefix.
//!
//! ```text
//! ./climacell_exporter --api-key $KEY --city 'New York, NY' --location-name home
//! CLIMACELL_API_KEY=$KEY CLIMACELL_CITY=Boston CLIMACELL_LOCATION_NAME=home ./climacell_exporter
//! ```
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `8080` at `/metrics`. Add the host running
//! `climacell_exporter` as a target under the Prometheus `scrape_configs` section as described
//! by the example below. Scrapes more frequent than the cache TTL (five minutes by default) are
//! answered from the cache.
//!
//! ```yaml
//! # Sample config for Prometheus.
//!
//! global:
//!   scrape_interval:     1m
//!   evaluation_interval: 1m
//!   external_labels:
//!     monitor: 'my_prom'
//!
//! scrape_configs:
//! - job_name: climacell_exporter
//!   static_configs:
//!   - targets: ['example:8080']
//! ```
//!

pub mod cache;
pub mod client;
pub mod collector;
pub mod config;
pub mod geo;
pub mod http;
pub mod metrics;
