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

use crate::client::EXPORTER_USER_AGENT;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/";

#[derive(Debug)]
pub enum GeoError {
    Internal(reqwest::Error),
    Unexpected(StatusCode, Url),
    NotFound(String),
    InvalidCoordinates(String),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::NotFound(city) => write!(f, "no results for city {}", city),
            Self::InvalidCoordinates(s) => write!(f, "invalid coordinates {}", s),
        }
    }
}

impl error::Error for GeoError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Resolved position of a place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single search result from a Nominatim compatible API.
///
/// Coordinates are returned as strings.
#[derive(Serialize, Deserialize, Debug)]
pub struct Place {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Place {
    fn coordinates(&self) -> Result<Coordinates, GeoError> {
        let latitude = self
            .lat
            .trim()
            .parse::<f64>()
            .map_err(|_| GeoError::InvalidCoordinates(format!("{}, {}", self.lat, self.lon)))?;
        let longitude = self
            .lon
            .trim()
            .parse::<f64>()
            .map_err(|_| GeoError::InvalidCoordinates(format!("{}, {}", self.lat, self.lon)))?;

        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::InvalidCoordinates(format!("{}, {}", latitude, longitude)));
        }

        Ok(Coordinates { latitude, longitude })
    }
}

/// Client for looking up coordinates of a city by name, used once at startup.
#[derive(Debug)]
pub struct Geocoder {
    client: Client,
    base_url: Url,
}

impl Geocoder {
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: Url) -> Self {
        Geocoder { client, base_url }
    }

    pub async fn lookup(&self, city: &str) -> Result<Coordinates, GeoError> {
        let request_url = self.search_url();
        tracing::debug!(message = "making geocoding request", url = %request_url, city = %city);

        let res = self
            .client
            .get(request_url.clone())
            .query(&[("q", city), ("format", "json"), ("limit", "1")])
            .header(USER_AGENT, EXPORTER_USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await
            .map_err(GeoError::Internal)?;

        let status = res.status();
        if status != StatusCode::OK {
            return Err(GeoError::Unexpected(status, request_url));
        }

        let places = res.json::<Vec<Place>>().await.map_err(GeoError::Internal)?;
        first_coordinates(city, &places)
    }

    fn search_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push("search");
        }

        url
    }
}

fn first_coordinates(city: &str, places: &[Place]) -> Result<Coordinates, GeoError> {
    match places.first() {
        Some(p) => {
            let coords = p.coordinates()?;
            tracing::debug!(
                message = "resolved city coordinates",
                city = %city,
                place = ?p.display_name,
                latitude = coords.latitude,
                longitude = coords.longitude,
            );

            Ok(coords)
        }
        None => Err(GeoError::NotFound(city.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::{first_coordinates, Coordinates, GeoError, Geocoder, Place};
    use axum::http::StatusCode;
    use axum::Router;
    use reqwest::{Client, Url};
    use std::net::SocketAddr;

    /// Start a server answering every request with the given status and body.
    async fn serve(status: StatusCode, body: &'static str) -> Url {
        let app = Router::new().fallback(move || async move { (status, body) });
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);

        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    #[test]
    fn test_first_result_used() {
        let places: Vec<Place> = serde_json::from_str(
            r#"[
                {"lat": "40.7127281", "lon": "-74.0060152", "display_name": "City of New York"},
                {"lat": "43.1561681", "lon": "-75.8449946", "display_name": "New York State"}
            ]"#,
        )
        .unwrap();

        let coords = first_coordinates("New York, NY", &places).unwrap();
        assert_eq!(
            Coordinates {
                latitude: 40.7127281,
                longitude: -74.0060152,
            },
            coords
        );
    }

    #[test]
    fn test_no_results() {
        let res = first_coordinates("Nowhere", &[]);
        assert!(matches!(res, Err(GeoError::NotFound(c)) if c == "Nowhere"));
    }

    #[test]
    fn test_unparsable_coordinates() {
        let places = vec![Place {
            lat: "north".to_owned(),
            lon: "-74.0".to_owned(),
            display_name: None,
        }];

        assert!(matches!(
            first_coordinates("Somewhere", &places),
            Err(GeoError::InvalidCoordinates(_))
        ));
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let places = vec![Place {
            lat: "91.0".to_owned(),
            lon: "-74.0".to_owned(),
            display_name: None,
        }];

        assert!(matches!(
            first_coordinates("Somewhere", &places),
            Err(GeoError::InvalidCoordinates(_))
        ));
    }

    #[test]
    fn test_search_url() {
        let geo = Geocoder::new(Client::new(), Url::parse("https://nominatim.openstreetmap.org/").unwrap());
        assert_eq!("https://nominatim.openstreetmap.org/search", geo.search_url().as_str());
    }

    #[tokio::test]
    async fn test_lookup_success() {
        let base = serve(
            StatusCode::OK,
            r#"[{"lat": "42.3554334", "lon": "-71.060511", "display_name": "Boston, Massachusetts"}]"#,
        )
        .await;
        let coords = Geocoder::new(Client::new(), base).lookup("Boston").await.unwrap();

        assert_eq!(
            Coordinates {
                latitude: 42.3554334,
                longitude: -71.060511,
            },
            coords
        );
    }

    #[tokio::test]
    async fn test_lookup_no_results() {
        let base = serve(StatusCode::OK, "[]").await;
        let res = Geocoder::new(Client::new(), base).lookup("Nowhere").await;

        assert!(matches!(res, Err(GeoError::NotFound(c)) if c == "Nowhere"));
    }

    #[tokio::test]
    async fn test_lookup_unexpected_status() {
        let base = serve(StatusCode::SERVICE_UNAVAILABLE, "").await;
        let res = Geocoder::new(Client::new(), base.clone()).lookup("Boston").await;

        match res {
            Err(GeoError::Unexpected(status, url)) => {
                assert_eq!(StatusCode::SERVICE_UNAVAILABLE, status);
                assert_eq!(format!("{}search", base), url.as_str());
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_malformed_body() {
        let base = serve(StatusCode::OK, "<html></html>").await;
        let res = Geocoder::new(Client::new(), base).lookup("Boston").await;

        assert!(matches!(res, Err(GeoError::Internal(_))));
    }
}
