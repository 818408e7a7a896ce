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

use crate::client::DEFAULT_API_URL;
use crate::geo::DEFAULT_GEOCODER_URL;
use crate::metrics::Layers;
use clap::{ArgAction, Parser, ValueEnum};
use reqwest::Url;
use std::error;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_LISTEN_PORT: u16 = 8080;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_SWEEP_SECS: u64 = 600;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    ApiKeyMissing,
    CityMissing,
    LocationNameMissing,
    InvalidCacheTtl,
    InvalidSweepInterval,
    InvalidTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKeyMissing => write!(f, "cannot start exporter, api key is missing"),
            Self::CityMissing => write!(f, "cannot start exporter, city not set"),
            Self::LocationNameMissing => write!(f, "cannot start exporter, location name not set"),
            Self::InvalidCacheTtl => write!(f, "cannot start exporter, cache TTL must be greater than zero"),
            Self::InvalidSweepInterval => write!(f, "cannot start exporter, cache sweep interval must be greater than zero"),
            Self::InvalidTimeout => write!(f, "cannot start exporter, request timeout must be greater than zero"),
        }
    }
}

impl error::Error for ConfigError {}

/// Units to request measurements in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UnitSystem {
    Us,
    Si,
}

impl UnitSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Si => "si",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Parser)]
#[clap(name = "climacell_exporter", version = clap::crate_version!(), args_override_self = true)]
pub struct ExporterConfig {
    /// ClimaCell API key
    #[clap(long, env = "CLIMACELL_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// City to export weather conditions for. Resolved to coordinates once at startup.
    #[clap(long, env = "CLIMACELL_CITY")]
    pub city: String,

    /// Name of the location, used as the `location_name` label on all metrics
    #[clap(long, env = "CLIMACELL_LOCATION_NAME")]
    pub location_name: String,

    /// Reuse API responses for this many seconds before fetching new conditions.
    #[clap(long, env = "CLIMACELL_CACHE_TTL_SECS", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,

    /// Remove expired API responses from the cache at this interval, in seconds.
    #[clap(long, env = "CLIMACELL_CACHE_SWEEP_SECS", default_value_t = DEFAULT_CACHE_SWEEP_SECS)]
    pub cache_sweep_secs: u64,

    /// Port to listen on. The exporter binds to all addresses since the purpose
    /// is to expose metrics to an external system (Prometheus or another agent
    /// for ingestion)
    #[clap(long, env = "CLIMACELL_LISTEN_PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub listen_port: u16,

    /// Export the weather data layer (temperature, pressure, wind, etc.)
    #[clap(long, env = "CLIMACELL_ENABLE_WEATHER", default_value_t = true, action = ArgAction::Set)]
    pub enable_weather: bool,

    /// Export the air quality data layer (AQI, ozone, particulate matter, etc.)
    #[clap(long, env = "CLIMACELL_ENABLE_AIR_QUALITY", default_value_t = false, action = ArgAction::Set)]
    pub enable_air_quality: bool,

    /// Unit system to request measurements in
    #[clap(long, env = "CLIMACELL_UNIT_SYSTEM", value_enum, default_value_t = UnitSystem::Us)]
    pub unit_system: UnitSystem,

    /// Base URL for the ClimaCell API
    #[clap(long, default_value = DEFAULT_API_URL)]
    pub api_url: Url,

    /// Base URL for the geocoding API used to resolve the city
    #[clap(long, default_value = DEFAULT_GEOCODER_URL)]
    pub geocoder_url: Url,

    /// Timeout for requests to the ClimaCell and geocoding APIs, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    pub timeout_millis: u64,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    pub log_level: Level,
}

impl ExporterConfig {
    /// Make sure all required settings are present and usable before starting.
    pub fn preflight(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::ApiKeyMissing);
        }

        if self.city.trim().is_empty() {
            return Err(ConfigError::CityMissing);
        }

        if self.location_name.trim().is_empty() {
            return Err(ConfigError::LocationNameMissing);
        }

        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidCacheTtl);
        }

        if self.cache_sweep_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval);
        }

        if self.timeout_millis == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(())
    }

    pub fn layers(&self) -> Layers {
        Layers {
            weather: self.enable_weather,
            air_quality: self.enable_air_quality,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    pub fn bind(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.listen_port))
    }

    /// Label to use for `location_name`, normalized to lower case.
    pub fn location_label(&self) -> String {
        self.location_name.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, ExporterConfig, UnitSystem};
    use clap::Parser;
    use std::time::Duration;
    use tracing::Level;

    fn parse(extra: &[&str]) -> ExporterConfig {
        let mut args = vec![
            "climacell_exporter",
            "--api-key",
            "abc123",
            "--city",
            "New York, NY",
            "--location-name",
            "Home",
        ];
        args.extend_from_slice(extra);
        ExporterConfig::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(&[]);

        assert_eq!(Ok(()), cfg.preflight());
        assert_eq!(Duration::from_secs(300), cfg.cache_ttl());
        assert_eq!(Duration::from_secs(600), cfg.cache_sweep());
        assert_eq!(Duration::from_millis(5000), cfg.timeout());
        assert_eq!(8080, cfg.bind().port());
        assert_eq!(UnitSystem::Us, cfg.unit_system);
        assert_eq!(Level::INFO, cfg.log_level);
        assert!(cfg.layers().weather);
        assert!(!cfg.layers().air_quality);
        assert_eq!("https://api.climacell.co/v3/", cfg.api_url.as_str());
    }

    #[test]
    fn test_layers_from_flags() {
        let cfg = parse(&["--enable-weather", "false", "--enable-air-quality", "true"]);

        assert!(!cfg.layers().weather);
        assert!(cfg.layers().air_quality);
    }

    #[test]
    fn test_location_label_lower_case() {
        let cfg = parse(&[]);
        assert_eq!("home", cfg.location_label());
    }

    #[test]
    fn test_preflight_blank_api_key() {
        let cfg = parse(&["--api-key", " "]);
        assert_eq!(Err(ConfigError::ApiKeyMissing), cfg.preflight());
    }

    #[test]
    fn test_preflight_blank_city() {
        let cfg = parse(&["--city", ""]);
        assert_eq!(Err(ConfigError::CityMissing), cfg.preflight());
    }

    #[test]
    fn test_preflight_blank_location_name() {
        let cfg = parse(&["--location-name", ""]);
        assert_eq!(Err(ConfigError::LocationNameMissing), cfg.preflight());
    }

    #[test]
    fn test_preflight_zero_ttl() {
        let cfg = parse(&["--cache-ttl-secs", "0"]);
        assert_eq!(Err(ConfigError::InvalidCacheTtl), cfg.preflight());
    }

    #[test]
    fn test_preflight_zero_sweep() {
        let cfg = parse(&["--cache-sweep-secs", "0"]);
        assert_eq!(Err(ConfigError::InvalidSweepInterval), cfg.preflight());
    }

    #[test]
    fn test_preflight_zero_timeout() {
        let cfg = parse(&["--timeout-millis", "0"]);
        assert_eq!(Err(ConfigError::InvalidTimeout), cfg.preflight());
    }

    #[test]
    fn test_invalid_unit_system() {
        let res = ExporterConfig::try_parse_from([
            "climacell_exporter",
            "--api-key",
            "abc123",
            "--city",
            "Boston",
            "--location-name",
            "home",
            "--unit-system",
            "imperial",
        ]);

        assert!(res.is_err());
    }
}
