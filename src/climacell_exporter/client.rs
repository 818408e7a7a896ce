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

use crate::config::UnitSystem;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::error;
use std::fmt;

pub const DEFAULT_API_URL: &str = "https://api.climacell.co/v3/";
pub const EXPORTER_USER_AGENT: &str = concat!("climacell_exporter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    Unauthorized(StatusCode),
    RateLimited,
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Unauthorized(status) => write!(f, "api key rejected with status {}", status),
            Self::RateLimited => write!(f, "api rate limit exceeded"),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Coordinates to fetch conditions for along with labels used only for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub city: String,
    pub name: String,
}

impl Location {
    pub fn new<C, N>(latitude: f64, longitude: f64, city: C, name: N) -> Self
    where
        C: Into<String>,
        N: Into<String>,
    {
        Location {
            latitude,
            longitude,
            city: city.into(),
            name: name.into(),
        }
    }
}

/// Data fields that can be requested from the realtime endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    BaroPressure,
    CloudBase,
    CloudCeiling,
    CloudCover,
    Dewpoint,
    FeelsLike,
    Humidity,
    Precipitation,
    SurfaceShortwaveRadiation,
    Temp,
    Visibility,
    WindDirection,
    WindGust,
    WindSpeed,
    ChinaAqi,
    EpaAqi,
    Co,
    No2,
    O3,
    Pm10,
    Pm25,
    So2,
}

impl Field {
    /// Identifier of the field as used by the API for both requests and responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BaroPressure => "baro_pressure",
            Self::CloudBase => "cloud_base",
            Self::CloudCeiling => "cloud_ceiling",
            Self::CloudCover => "cloud_cover",
            Self::Dewpoint => "dewpoint",
            Self::FeelsLike => "feels_like",
            Self::Humidity => "humidity",
            Self::Precipitation => "precipitation",
            Self::SurfaceShortwaveRadiation => "surface_shortwave_radiation",
            Self::Temp => "temp",
            Self::Visibility => "visibility",
            Self::WindDirection => "wind_direction",
            Self::WindGust => "wind_gust",
            Self::WindSpeed => "wind_speed",
            Self::ChinaAqi => "china_aqi",
            Self::EpaAqi => "epa_aqi",
            Self::Co => "co",
            Self::No2 => "no2",
            Self::O3 => "o3",
            Self::Pm10 => "pm10",
            Self::Pm25 => "pm25",
            Self::So2 => "so2",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of fields to request, iterated in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: BTreeSet<Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.fields.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied()
    }

    /// Comma separated list of field identifiers for the `fields` query parameter.
    pub fn to_query(&self) -> String {
        self.iter().map(Field::as_str).collect::<Vec<_>>().join(",")
    }
}

impl FromIterator<Field> for FieldSet {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        FieldSet {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A single value for a field, as returned by the API.
///
/// Anything other than a JSON number (a missing value, `null`, a string) is treated
/// as the field being absent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataPoint {
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub units: Option<String>,
}

impl DataPoint {
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_ref().and_then(serde_json::Value::as_f64)
    }
}

/// A value for a single quantity from a response, either present or not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Present(f64),
    Absent,
}

impl From<Option<f64>> for Observation {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(v) => Observation::Present(v),
            None => Observation::Absent,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RealtimeResponse {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(default)]
    pub observation_time: Option<DataPoint>,
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl RealtimeResponse {
    /// Get the data point for a field, if the response included one in the expected shape.
    pub fn data_point(&self, field: Field) -> Option<DataPoint> {
        self.fields
            .get(field.as_str())
            .and_then(|v| DataPoint::deserialize(v).ok())
    }

    /// Get the value of a field from this response, if it was included and numeric.
    pub fn observation(&self, field: Field) -> Observation {
        self.data_point(field).and_then(|p| p.as_f64()).into()
    }
}

/// Source of realtime conditions for a location.
///
/// Any failure (network, authentication, rate limiting, malformed response) is
/// reported as a `ClientError` and treated the same way by callers.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn realtime(&self, location: &Location, fields: &FieldSet) -> Result<RealtimeResponse, ClientError>;
}

#[derive(Debug)]
pub struct ClimaCellClient {
    client: Client,
    base_url: Url,
    api_key: String,
    unit_system: UnitSystem,
}

impl ClimaCellClient {
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new<S: Into<String>>(client: Client, base_url: Url, api_key: S, unit_system: UnitSystem) -> Self {
        ClimaCellClient {
            client,
            base_url,
            api_key: api_key.into(),
            unit_system,
        }
    }

    async fn make_request(&self, url: Url, query: &[(&str, String)]) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .query(query)
            .header(USER_AGENT, EXPORTER_USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            // The request URL includes the API key, keep it out of error messages
            .map_err(|e| ClientError::Internal(e.without_url()))?;

        let status = res.status();
        if status == StatusCode::OK {
            Ok(res)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ClientError::Unauthorized(status))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(ClientError::RateLimited)
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }

    fn realtime_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push("weather").push("realtime");
        }

        url
    }

    fn realtime_query(&self, location: &Location, fields: &FieldSet) -> Vec<(&'static str, String)> {
        vec![
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("unit_system", self.unit_system.as_str().to_owned()),
            ("fields", fields.to_query()),
            ("apikey", self.api_key.clone()),
        ]
    }
}

#[async_trait]
impl Upstream for ClimaCellClient {
    async fn realtime(&self, location: &Location, fields: &FieldSet) -> Result<RealtimeResponse, ClientError> {
        let request_url = self.realtime_url();
        tracing::debug!(message = "making realtime weather request", url = %request_url, fields = %fields.to_query());

        let res = self
            .make_request(request_url, &self.realtime_query(location, fields))
            .await?;
        res.json::<RealtimeResponse>()
            .await
            .map_err(|e| ClientError::Internal(e.without_url()))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ClientError, ClimaCellClient, DataPoint, Field, FieldSet, Location, Observation, RealtimeResponse, Upstream,
    };
    use crate::config::UnitSystem;
    use axum::http::StatusCode;
    use axum::Router;
    use reqwest::{Client, Url};
    use std::net::SocketAddr;

    const RESPONSE: &str = r#"{
        "lat": 40.7128,
        "lon": -74.0059,
        "temp": {"value": 72.5, "units": "F"},
        "humidity": {"value": 41, "units": "%"},
        "cloud_base": {"value": null, "units": "ft"},
        "precipitation_type": {"value": "none"},
        "weather_code": "clear",
        "observation_time": {"value": "2020-06-01T12:00:00.000Z"}
    }"#;

    fn client(base: &str) -> ClimaCellClient {
        ClimaCellClient::new(Client::new(), Url::parse(base).unwrap(), "abc123", UnitSystem::Us)
    }

    /// Start a server answering every request with the given status and body.
    async fn serve(status: StatusCode, body: &'static str) -> String {
        let app = Router::new().fallback(move || async move { (status, body) });
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);

        format!("http://{}/v3/", addr)
    }

    async fn fetch(base: &str) -> Result<RealtimeResponse, ClientError> {
        let location = Location::new(40.7128, -74.0059, "New York, NY", "test");
        let fields: FieldSet = vec![Field::Temp, Field::Humidity].into_iter().collect();
        client(base).realtime(&location, &fields).await
    }

    #[test]
    fn test_field_set_dedups_and_orders() {
        let fields: FieldSet = vec![Field::Temp, Field::Dewpoint, Field::Temp, Field::EpaAqi]
            .into_iter()
            .collect();

        assert_eq!(3, fields.len());
        assert_eq!("dewpoint,temp,epa_aqi", fields.to_query());
    }

    #[test]
    fn test_empty_field_set() {
        let fields = FieldSet::new();
        assert!(fields.is_empty());
        assert_eq!("", fields.to_query());
    }

    #[test]
    fn test_response_observations() {
        let res: RealtimeResponse = serde_json::from_str(RESPONSE).unwrap();

        assert_eq!(40.7128, res.latitude);
        assert_eq!(-74.0059, res.longitude);
        assert_eq!(Observation::Present(72.5), res.observation(Field::Temp));
        assert_eq!(Observation::Present(41.0), res.observation(Field::Humidity));
        assert_eq!(Observation::Absent, res.observation(Field::CloudBase));
        assert_eq!(Observation::Absent, res.observation(Field::WindGust));
        assert!(res.observation_time.is_some());
        assert_eq!(Some("F".to_owned()), res.data_point(Field::Temp).and_then(|p| p.units));
    }

    #[test]
    fn test_non_numeric_value_is_absent() {
        let point = DataPoint {
            value: Some(serde_json::Value::String("none".to_owned())),
            units: None,
        };

        assert_eq!(None, point.as_f64());
    }

    #[test]
    fn test_realtime_url_keeps_version_path() {
        let c = client("https://api.climacell.co/v3/");
        assert_eq!("https://api.climacell.co/v3/weather/realtime", c.realtime_url().as_str());

        let c = client("http://localhost:1234/v3");
        assert_eq!("http://localhost:1234/v3/weather/realtime", c.realtime_url().as_str());
    }

    #[test]
    fn test_realtime_query() {
        let c = client("https://api.climacell.co/v3/");
        let location = Location::new(40.7128, -74.0059, "New York, NY", "test");
        let fields: FieldSet = vec![Field::Temp, Field::CloudBase].into_iter().collect();
        let query = c.realtime_query(&location, &fields);

        assert!(query.contains(&("lat", "40.7128".to_owned())));
        assert!(query.contains(&("lon", "-74.0059".to_owned())));
        assert!(query.contains(&("unit_system", "us".to_owned())));
        assert!(query.contains(&("fields", "cloud_base,temp".to_owned())));
        assert!(query.contains(&("apikey", "abc123".to_owned())));
    }

    #[tokio::test]
    async fn test_realtime_success() {
        let base = serve(StatusCode::OK, RESPONSE).await;
        let res = fetch(&base).await.unwrap();

        assert_eq!(40.7128, res.latitude);
        assert_eq!(Observation::Present(72.5), res.observation(Field::Temp));
        assert_eq!(Observation::Absent, res.observation(Field::CloudBase));
    }

    #[tokio::test]
    async fn test_realtime_unauthorized() {
        let base = serve(StatusCode::UNAUTHORIZED, "").await;
        let res = fetch(&base).await;
        assert!(matches!(res, Err(ClientError::Unauthorized(s)) if s == StatusCode::UNAUTHORIZED));

        let base = serve(StatusCode::FORBIDDEN, "").await;
        let res = fetch(&base).await;
        assert!(matches!(res, Err(ClientError::Unauthorized(s)) if s == StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_realtime_rate_limited() {
        let base = serve(StatusCode::TOO_MANY_REQUESTS, "").await;
        let res = fetch(&base).await;
        assert!(matches!(res, Err(ClientError::RateLimited)));
    }

    #[tokio::test]
    async fn test_realtime_unexpected_status() {
        let base = serve(StatusCode::INTERNAL_SERVER_ERROR, "").await;

        match fetch(&base).await {
            Err(ClientError::Unexpected(status, url)) => {
                assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, status);
                assert_eq!(format!("{}weather/realtime", base), url.as_str());
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_realtime_malformed_body_hides_api_key() {
        let base = serve(StatusCode::OK, "{\"lat\": ").await;
        let err = fetch(&base).await.unwrap_err();

        assert!(matches!(err, ClientError::Internal(_)));
        assert!(!err.to_string().contains("abc123"));
    }

    #[tokio::test]
    async fn test_realtime_connection_error_hides_api_key() {
        let err = fetch("http://127.0.0.1:1/v3/").await.unwrap_err();

        assert!(matches!(err, ClientError::Internal(_)));
        assert!(!err.to_string().contains("abc123"));
        assert!(!format!("{:?}", err).contains("abc123"));
    }
}
